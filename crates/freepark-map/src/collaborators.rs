//! External services the map core calls out to.
//!
//! The facade only depends on these traits. In-memory implementations are
//! provided for the CLI and tests.

use crate::camera_store::{CameraStore, MemoryCameraStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use freepark_core::error::{CollaboratorError, Result};
use freepark_core::types::{Coordinate, ParkingPoint, PointId};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Supplies the parking points to render.
#[async_trait]
pub trait PointSource: Send + Sync {
    /// Fetches the current point list. `force_refresh` bypasses any cache.
    async fn get_points(&self, force_refresh: bool) -> Result<Vec<ParkingPoint>>;
}

/// Turns coordinates into human-readable addresses.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, location: Coordinate) -> Result<Option<String>>;
}

/// Persists new points and location changes.
#[async_trait]
pub trait PointRepository: Send + Sync {
    async fn create_point(&self, location: Coordinate) -> Result<ParkingPoint>;

    async fn update_point_location(&self, id: PointId, location: Coordinate) -> Result<()>;
}

/// The collaborators a facade is wired to.
pub struct Collaborators {
    pub points: Arc<dyn PointSource>,
    pub geocoder: Arc<dyn Geocoder>,
    pub repository: Arc<dyn PointRepository>,
    pub camera_store: Box<dyn CameraStore>,
}

impl Collaborators {
    /// In-memory collaborators sharing one repository for reads and writes.
    pub fn in_memory(points: Vec<ParkingPoint>) -> Self {
        let repository = Arc::new(InMemoryRepository::new(points));
        Self {
            points: repository.clone(),
            geocoder: Arc::new(NoopGeocoder),
            repository,
            camera_store: Box::new(MemoryCameraStore::new()),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn with_camera_store(mut self, camera_store: Box<dyn CameraStore>) -> Self {
        self.camera_store = camera_store;
        self
    }
}

/// A fixed point list.
#[derive(Debug, Default)]
pub struct StaticPointSource {
    points: Vec<ParkingPoint>,
    fetches: AtomicUsize,
}

impl StaticPointSource {
    pub fn new(points: Vec<ParkingPoint>) -> Self {
        Self {
            points,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Loads a JSON array of points.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let points: Vec<ParkingPoint> = serde_json::from_str(&contents)
            .map_err(|e| CollaboratorError::point_source(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), count = points.len(), "Loaded parking points");
        Ok(Self::new(points))
    }

    pub fn points(&self) -> &[ParkingPoint] {
        &self.points
    }

    /// Number of `get_points` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PointSource for StaticPointSource {
    async fn get_points(&self, force_refresh: bool) -> Result<Vec<ParkingPoint>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(force_refresh, count = self.points.len(), "Serving static points");
        Ok(self.points.clone())
    }
}

/// Geocoder that never finds an address.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn reverse_geocode(&self, _location: Coordinate) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Geocoder that answers every lookup with the same address.
#[derive(Debug, Clone)]
pub struct FixedGeocoder {
    address: String,
}

impl FixedGeocoder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn reverse_geocode(&self, _location: Coordinate) -> Result<Option<String>> {
        Ok(Some(self.address.clone()))
    }
}

/// A proposed new location for an existing point.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationProposal {
    pub point_id: PointId,
    pub location: Coordinate,
    pub proposed_at: DateTime<Utc>,
}

/// Point store kept in memory; serves as both source and repository.
///
/// Location updates are recorded as proposals and flag the point with
/// `has_edit_location_proposal`; the point itself does not move.
#[derive(Debug)]
pub struct InMemoryRepository {
    points: RwLock<Vec<ParkingPoint>>,
    proposals: RwLock<Vec<LocationProposal>>,
    next_id: AtomicI64,
}

impl InMemoryRepository {
    pub fn new(points: Vec<ParkingPoint>) -> Self {
        let next_id = points.iter().map(|p| p.id.get()).max().unwrap_or(0) + 1;
        Self {
            points: RwLock::new(points),
            proposals: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(next_id),
        }
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    pub fn proposals(&self) -> Vec<LocationProposal> {
        self.proposals.read().clone()
    }
}

#[async_trait]
impl PointSource for InMemoryRepository {
    async fn get_points(&self, _force_refresh: bool) -> Result<Vec<ParkingPoint>> {
        Ok(self.points.read().clone())
    }
}

#[async_trait]
impl PointRepository for InMemoryRepository {
    async fn create_point(&self, location: Coordinate) -> Result<ParkingPoint> {
        location
            .validate()
            .map_err(|e| CollaboratorError::persistence(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let point = ParkingPoint::new(id, location);
        self.points.write().push(point.clone());
        info!(point_id = %point.id, location = %location, "Parking point created");
        Ok(point)
    }

    async fn update_point_location(&self, id: PointId, location: Coordinate) -> Result<()> {
        let mut points = self.points.write();
        let point = points
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CollaboratorError::persistence(format!("point {} does not exist", id)))?;

        point.has_edit_location_proposal = true;
        point.updated_at = Utc::now();
        self.proposals.write().push(LocationProposal {
            point_id: id,
            location,
            proposed_at: point.updated_at,
        });
        info!(point_id = %id, location = %location, "Location change proposed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_repository_create() {
        let repo = InMemoryRepository::new(vec![ParkingPoint::new(41, Coordinate::new(18.6, 54.4))]);

        let created = repo.create_point(Coordinate::new(18.7, 54.4)).await.unwrap();
        assert_eq!(created.id, PointId(42));
        assert_eq!(repo.get_points(true).await.unwrap().len(), 2);

        assert!(repo.create_point(Coordinate::new(f64::NAN, 0.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_repository_update_records_proposal() {
        let repo = InMemoryRepository::new(vec![ParkingPoint::new(1, Coordinate::new(18.6, 54.4))]);
        let target = Coordinate::new(18.6005, 54.4);

        repo.update_point_location(PointId(1), target).await.unwrap();
        let points = repo.get_points(false).await.unwrap();
        assert!(points[0].has_edit_location_proposal);
        assert_eq!(points[0].location, Coordinate::new(18.6, 54.4));
        assert_eq!(repo.proposals()[0].location, target);

        assert!(repo.update_point_location(PointId(9), target).await.is_err());
    }

    #[tokio::test]
    async fn test_static_source_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("points.json");
        let points = vec![ParkingPoint::new(1, Coordinate::new(18.6, 54.4))];
        std::fs::write(&path, serde_json::to_string(&points).unwrap()).unwrap();

        let source = StaticPointSource::from_json_file(&path).unwrap();
        assert_eq!(source.get_points(false).await.unwrap(), points);
        assert_eq!(source.fetch_count(), 1);

        std::fs::write(&path, "{}").unwrap();
        assert!(StaticPointSource::from_json_file(&path).is_err());
    }

    #[tokio::test]
    async fn test_geocoders() {
        let at = Coordinate::new(18.6, 54.4);
        assert_eq!(NoopGeocoder.reverse_geocode(at).await.unwrap(), None);
        assert_eq!(
            FixedGeocoder::new("Długi Targ 1").reverse_geocode(at).await.unwrap(),
            Some("Długi Targ 1".to_string())
        );
    }
}
