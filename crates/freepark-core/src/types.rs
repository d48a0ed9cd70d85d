//! Core types for the FreePark map controller.
//!
//! This module defines the value types shared by every layer of the system:
//! geographic coordinates, parking point records, camera state, bounding boxes
//! and zoom presets.

use crate::error::GeometryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A geographic position in WGS84 degrees.
///
/// Coordinates are plain values: two coordinates are the same point when both
/// fields are equal. `new` never fails; use [`Coordinate::validated`] at trust
/// boundaries.
///
/// # Examples
///
/// ```
/// use freepark_core::types::Coordinate;
///
/// let a = Coordinate::new(18.64, 54.36);
/// let b = Coordinate::new(18.64, 54.36);
/// assert_eq!(a, b);
/// assert!(Coordinate::validated(f64::NAN, 54.36).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Longitude in degrees, -180..=180
    pub lng: f64,
    /// Latitude in degrees, -90..=90
    pub lat: f64,
}

impl Coordinate {
    /// Creates a coordinate without validation.
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Creates a coordinate, rejecting NaN, infinite and out-of-range values.
    pub fn validated(lng: f64, lat: f64) -> Result<Self, GeometryError> {
        let coord = Self { lng, lat };
        coord.validate()?;
        Ok(coord)
    }

    /// Returns true if both components are finite and within WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Validates this coordinate.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(GeometryError::invalid_coordinate(*self))
        }
    }

    /// Returns the `[lng, lat]` pair used by GeoJSON positions.
    pub fn to_position(&self) -> Vec<f64> {
        vec![self.lng, self.lat]
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lng, self.lat)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((lng, lat): (f64, f64)) -> Self {
        Self::new(lng, lat)
    }
}

/// Identifier of a parking point as assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(pub i64);

impl PointId {
    /// Returns the raw identifier.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PointId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A crowdsourced free-parking location.
///
/// Owned by the point data source; the map core treats the list as read-only
/// input and keeps only the projections it needs for rendering and proximity
/// checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkingPoint {
    pub id: PointId,
    pub location: Coordinate,
    #[serde(default, alias = "likesCount")]
    pub like_count: i64,
    #[serde(default, alias = "dislikesCount")]
    pub dislike_count: i64,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub has_edit_location_proposal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParkingPoint {
    /// Creates a point with zeroed votes and the current time as timestamps.
    pub fn new(id: i64, location: Coordinate) -> Self {
        let now = Utc::now();
        Self {
            id: PointId(id),
            location,
            like_count: 0,
            dislike_count: 0,
            is_verified: false,
            has_edit_location_proposal: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the vote counts.
    pub fn with_votes(mut self, likes: i64, dislikes: i64) -> Self {
        self.like_count = likes;
        self.dislike_count = dislikes;
        self
    }

    /// Sets the verified flag.
    pub fn with_verified(mut self, verified: bool) -> Self {
        self.is_verified = verified;
        self
    }

    /// Net vote score.
    pub fn score(&self) -> i64 {
        self.like_count - self.dislike_count
    }

    /// Score formatted with an explicit sign: `+3`, `0`, `-2`.
    pub fn score_label(&self) -> String {
        format_score(self.score())
    }
}

/// Formats a score with an explicit sign for positive values.
pub fn format_score(score: i64) -> String {
    if score > 0 {
        format!("+{}", score)
    } else {
        score.to_string()
    }
}

/// An axis-aligned geographic bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

impl Bounds {
    /// Creates bounds from explicit corners.
    pub const fn new(south_west: Coordinate, north_east: Coordinate) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates the smallest bounds containing both coordinates.
    pub fn from_corners(a: Coordinate, b: Coordinate) -> Self {
        Self {
            south_west: Coordinate::new(a.lng.min(b.lng), a.lat.min(b.lat)),
            north_east: Coordinate::new(a.lng.max(b.lng), a.lat.max(b.lat)),
        }
    }

    /// Returns true if the corners are valid and ordered.
    pub fn is_valid(&self) -> bool {
        self.south_west.is_valid()
            && self.north_east.is_valid()
            && self.south_west.lng < self.north_east.lng
            && self.south_west.lat < self.north_east.lat
    }

    /// Returns true if the coordinate lies inside or on the edge of the box.
    pub fn contains(&self, coord: Coordinate) -> bool {
        (self.south_west.lng..=self.north_east.lng).contains(&coord.lng)
            && (self.south_west.lat..=self.north_east.lat).contains(&coord.lat)
    }

    /// Returns true if `other` lies entirely inside this box.
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        self.contains(other.south_west) && self.contains(other.north_east)
    }

    /// Moves the coordinate onto the nearest position inside the box.
    pub fn clamp(&self, coord: Coordinate) -> Coordinate {
        Coordinate::new(
            coord.lng.clamp(self.south_west.lng, self.north_east.lng),
            coord.lat.clamp(self.south_west.lat, self.north_east.lat),
        )
    }

    /// Grows the box by `margin` degrees on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            south_west: Coordinate::new(
                (self.south_west.lng - margin).max(-180.0),
                (self.south_west.lat - margin).max(-90.0),
            ),
            north_east: Coordinate::new(
                (self.north_east.lng + margin).min(180.0),
                (self.north_east.lat + margin).min(90.0),
            ),
        }
    }

    /// Center of the box.
    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.south_west.lng + self.north_east.lng) / 2.0,
            (self.south_west.lat + self.north_east.lat) / 2.0,
        )
    }
}

/// Screen padding in pixels, used when framing coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Padding {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Padding {
    /// Same padding on every side.
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }
}

impl Default for Padding {
    fn default() -> Self {
        // Bottom padding clears the bottom sheet overlay.
        Self {
            top: 50.0,
            bottom: 250.0,
            left: 50.0,
            right: 50.0,
        }
    }
}

/// Camera position of the map viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center: Coordinate,
    pub zoom: f64,
}

impl Camera {
    pub const fn new(center: Coordinate, zoom: f64) -> Self {
        Self { center, zoom }
    }
}

/// A zoom target: a named preset resolved through configuration, or a raw
/// zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoomLevel {
    /// Street-level preset
    Close,
    /// Overview preset
    Far,
    /// Explicit zoom level
    Level(f64),
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoomLevel::Close => write!(f, "close"),
            ZoomLevel::Far => write!(f, "far"),
            ZoomLevel::Level(level) => write!(f, "{}", level),
        }
    }
}

impl FromStr for ZoomLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "close" => Ok(ZoomLevel::Close),
            "far" => Ok(ZoomLevel::Far),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|z| z.is_finite())
                .map(ZoomLevel::Level)
                .ok_or_else(|| format!("invalid zoom level: {}", s)),
        }
    }
}

impl From<f64> for ZoomLevel {
    fn from(level: f64) -> Self {
        ZoomLevel::Level(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_equality_by_value() {
        let a = Coordinate::new(18.64, 54.36);
        let b = Coordinate::from((18.64, 54.36));
        assert_eq!(a, b);
        assert_ne!(a, Coordinate::new(18.65, 54.36));
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::validated(18.64, 54.36).is_ok());
        assert!(Coordinate::validated(f64::NAN, 54.36).is_err());
        assert!(Coordinate::validated(18.64, f64::INFINITY).is_err());
        assert!(Coordinate::validated(181.0, 0.0).is_err());
        assert!(Coordinate::validated(0.0, -90.5).is_err());
    }

    #[test]
    fn test_score_label() {
        let location = Coordinate::new(18.64, 54.36);
        assert_eq!(ParkingPoint::new(1, location).with_votes(5, 2).score_label(), "+3");
        assert_eq!(ParkingPoint::new(2, location).with_votes(2, 2).score_label(), "0");
        assert_eq!(ParkingPoint::new(3, location).with_votes(1, 4).score_label(), "-3");
    }

    #[test]
    fn test_parking_point_json() {
        let json = r#"{
            "id": 7,
            "location": { "lng": 18.64, "lat": 54.36 },
            "likeCount": 3,
            "dislikeCount": 1,
            "isVerified": true,
            "hasEditLocationProposal": false,
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": "2024-05-02T10:00:00Z"
        }"#;

        let point: ParkingPoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.id, PointId(7));
        assert_eq!(point.score(), 2);
        assert!(point.is_verified);

        let legacy = r#"{
            "id": 8,
            "location": { "lng": 18.64, "lat": 54.36 },
            "likesCount": 5,
            "dislikesCount": 2,
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": "2024-05-01T10:00:00Z"
        }"#;
        let point: ParkingPoint = serde_json::from_str(legacy).unwrap();
        assert_eq!(point.score_label(), "+3");
    }

    #[test]
    fn test_bounds_clamp_and_contains() {
        let bounds = Bounds::new(Coordinate::new(18.0, 54.0), Coordinate::new(19.0, 55.0));
        assert!(bounds.is_valid());
        assert!(bounds.contains(Coordinate::new(18.5, 54.5)));
        assert!(!bounds.contains(Coordinate::new(17.5, 54.5)));
        assert_eq!(
            bounds.clamp(Coordinate::new(17.5, 56.0)),
            Coordinate::new(18.0, 55.0)
        );

        let expanded = bounds.expand(0.5);
        assert!(expanded.contains_bounds(&bounds));
        assert_eq!(expanded.south_west, Coordinate::new(17.5, 53.5));
    }

    #[test]
    fn test_bounds_from_corners_normalizes() {
        let bounds =
            Bounds::from_corners(Coordinate::new(19.0, 54.0), Coordinate::new(18.0, 55.0));
        assert_eq!(bounds.south_west, Coordinate::new(18.0, 54.0));
        assert_eq!(bounds.north_east, Coordinate::new(19.0, 55.0));
        assert_eq!(bounds.center(), Coordinate::new(18.5, 54.5));
    }

    #[test]
    fn test_zoom_level_parse() {
        assert_eq!("close".parse::<ZoomLevel>(), Ok(ZoomLevel::Close));
        assert_eq!("FAR".parse::<ZoomLevel>(), Ok(ZoomLevel::Far));
        assert_eq!("12.5".parse::<ZoomLevel>(), Ok(ZoomLevel::Level(12.5)));
        assert!("nearby".parse::<ZoomLevel>().is_err());
    }
}
