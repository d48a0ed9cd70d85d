//! Page-level map state.
//!
//! [`MapStateFacade`] is the single entry point for UI code. It owns the map
//! surface, the layer store and the marker controller, publishes
//! [`MapViewState`] through a watch channel and routes every engine event to
//! the component that listens for it.

use crate::backend::{IconImage, MapBackend, StyleDocument};
use crate::camera_store::CameraStore;
use crate::collaborators::Collaborators;
use crate::event::{EventKind, ListenerId, MapEvent};
use crate::layers::LayerStore;
use crate::marker::{CollisionState, InteractionSettings, MarkerInteractionController};
use crate::surface::{MapSurface, SurfaceOptions};
use freepark_core::config::AppConfig;
use freepark_core::error::{CollisionError, EditError, Result, StateError};
use freepark_core::types::{Camera, Coordinate, ParkingPoint, PointId, ZoomLevel};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Container id used when none is set.
pub const DEFAULT_CONTAINER_ID: &str = "map";

/// Zoom levels added when a cluster is clicked.
pub const CLUSTER_ZOOM_STEP: f64 = 3.0;

/// Upper bound on drain rounds in [`MapStateFacade::pump`].
const MAX_PUMP_ROUNDS: usize = 32;

/// Workflow the page is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "pointId", rename_all = "camelCase")]
pub enum InteractionMode {
    #[default]
    Browsing,
    /// Placing a new point
    Adding,
    /// Moving an existing point
    EditingPosition(PointId),
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionMode::Browsing => write!(f, "browsing"),
            InteractionMode::Adding => write!(f, "adding"),
            InteractionMode::EditingPosition(id) => write!(f, "editing point {}", id),
        }
    }
}

/// Observable state of the map page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapViewState {
    pub map_loaded: bool,
    pub selected_point_id: Option<PointId>,
    pub is_marker_in_collision: bool,
    pub is_marker_out_of_range: bool,
    pub mode: InteractionMode,
    pub rendered_point_coordinates: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// A new point was created
    Created,
    /// A location change was proposed for an existing point
    LocationProposed,
}

/// Outcome of [`MapStateFacade::submit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub kind: SubmissionKind,
    pub point_id: PointId,
    pub location: Coordinate,
    pub address: Option<String>,
}

/// Owner of the map page state.
pub struct MapStateFacade<B: MapBackend> {
    config: AppConfig,
    container_id: String,
    collaborators: Collaborators,
    surface: Option<MapSurface<B>>,
    layers: LayerStore,
    marker: MarkerInteractionController,
    page_listeners: Vec<ListenerId>,
    target: Option<Coordinate>,
    state: watch::Sender<MapViewState>,
}

impl<B: MapBackend> MapStateFacade<B> {
    pub fn new(config: AppConfig, collaborators: Collaborators) -> Self {
        let (state, _) = watch::channel(MapViewState::default());
        Self {
            layers: LayerStore::new(config.map.cluster.clone()),
            marker: MarkerInteractionController::new(InteractionSettings::from_config(&config.map)),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            config,
            collaborators,
            surface: None,
            page_listeners: Vec::new(),
            target: None,
            state,
        }
    }

    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = container_id.into();
        self
    }

    /// Creates the map surface.
    ///
    /// The initial camera comes from the camera store when one was saved
    /// inside the allowed bounds, otherwise the configured region is framed.
    pub fn initialize(&mut self, backend: B, style: StyleDocument, icons: Vec<IconImage>) -> Result<()> {
        if self.surface.as_ref().map_or(false, |s| !s.is_destroyed()) {
            return Err(StateError::invalid("initialize", "initialized").into());
        }

        let restored = match self.collaborators.camera_store.load(&self.config.storage.camera_key) {
            Ok(camera) => camera,
            Err(e) => {
                warn!(error = %e, "Ignoring stored camera");
                None
            }
        };

        let options = SurfaceOptions::from_config(self.container_id.as_str(), &self.config.map, style)
            .with_icons(icons)
            .with_initial_camera(restored);
        let surface = MapSurface::initialize(backend, options)?;

        self.surface = Some(surface);
        self.page_listeners.clear();
        self.state.send_modify(|s| {
            s.map_loaded = false;
            s.mode = InteractionMode::Browsing;
            s.selected_point_id = None;
        });
        Ok(())
    }

    /// Drains queued backend events and handles them, including events
    /// raised while handling earlier ones. Returns the number handled.
    ///
    /// An event that fails to handle does not stop the ones behind it; the
    /// first failure is returned once the queue is drained.
    pub fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        let mut failure = None;
        let mut drained = false;

        for _ in 0..MAX_PUMP_ROUNDS {
            let events = match self.surface.as_mut() {
                Some(surface) if !surface.is_destroyed() => surface.backend_mut().poll_events(),
                _ => Vec::new(),
            };
            if events.is_empty() {
                drained = true;
                break;
            }
            for event in events {
                let kind = event.kind();
                match self.handle_event(event) {
                    Ok(()) => handled += 1,
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "Failed to handle map event");
                        failure.get_or_insert(e);
                    }
                }
            }
        }

        if !drained {
            warn!(handled, "Event pump stopped with events still queued");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(handled),
        }
    }

    /// Routes one engine event. Events without a live listener are dropped.
    pub fn handle_event(&mut self, event: MapEvent) -> Result<()> {
        let Some(surface) = self.surface.as_mut() else {
            debug!(kind = %event.kind(), "No map surface, dropping event");
            return Ok(());
        };
        if !surface.accepts(&event) {
            trace!(kind = %event.kind(), "No listener, dropping event");
            return Ok(());
        }

        match event {
            MapEvent::Load => {
                if !surface.handle_load() {
                    return Ok(());
                }
                self.layers.register(surface);
                for kind in [EventKind::PointClick, EventKind::ClusterClick, EventKind::CameraMoveEnd] {
                    self.page_listeners.push(surface.listen(kind)?);
                }
                if let Some(target) = self.target {
                    self.layers.set_target_marker(surface, Some(target));
                }
                self.state.send_modify(|s| s.map_loaded = true);
                info!(container_id = %surface.container_id(), "Map loaded");
            }
            MapEvent::PointClick { id } => {
                if self.marker.is_interactive() {
                    debug!(point_id = %id, "Point click ignored while placing the marker");
                } else if self.layers.point(id).is_none() {
                    warn!(point_id = %id, "Clicked point is not rendered");
                } else {
                    self.state.send_modify(|s| s.selected_point_id = Some(id));
                    debug!(point_id = %id, "Point selected");
                }
            }
            MapEvent::ClusterClick { cluster_id, center } => {
                let zoom = surface.camera().zoom + CLUSTER_ZOOM_STEP;
                debug!(cluster_id, zoom, "Zooming into cluster");
                surface.fly_to(center, ZoomLevel::Level(zoom), None)?;
            }
            MapEvent::CameraMoveEnd { center, zoom } => {
                self.layers.refresh_points(surface);
                persist_camera(
                    self.collaborators.camera_store.as_mut(),
                    &self.config.storage.camera_key,
                    Camera::new(center, zoom),
                );
            }
            other => {
                self.marker.handle_event(surface, &mut self.layers, &other)?;
            }
        }

        self.sync_marker_state();
        Ok(())
    }

    fn mode(&self) -> InteractionMode {
        self.state.borrow().mode
    }

    fn ensure_browsing(&self, operation: &str) -> Result<()> {
        match self.mode() {
            InteractionMode::Browsing => Ok(()),
            mode => Err(StateError::invalid(operation, mode.to_string()).into()),
        }
    }

    /// Starts placing a new point at the camera center.
    pub fn start_adding(&mut self) -> Result<CollisionState> {
        self.ensure_browsing("start_adding")?;
        let surface = loaded_surface(&mut self.surface, "start_adding")?;

        let collision = self.marker.activate(surface, &mut self.layers, None)?;
        self.state.send_modify(|s| {
            s.mode = InteractionMode::Adding;
            s.selected_point_id = None;
        });
        self.sync_marker_state();
        Ok(collision)
    }

    /// Starts moving an existing point from its current location.
    pub fn start_editing_position(&mut self, point_id: PointId) -> Result<CollisionState> {
        self.ensure_browsing("start_editing_position")?;
        let surface = loaded_surface(&mut self.surface, "start_editing_position")?;
        let location = self
            .layers
            .point(point_id)
            .map(|p| p.location)
            .ok_or(EditError::PointNotFound { id: point_id.get() })?;

        surface.jump_to(location, ZoomLevel::Close)?;
        let collision = self.marker.activate(surface, &mut self.layers, Some(location))?;
        self.state.send_modify(|s| {
            s.mode = InteractionMode::EditingPosition(point_id);
            s.selected_point_id = Some(point_id);
        });
        self.sync_marker_state();
        Ok(collision)
    }

    /// Leaves the current workflow. Safe to call in any state.
    pub fn cancel(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            self.marker.deactivate(surface, &mut self.layers);
        }
        self.state.send_modify(|s| s.mode = InteractionMode::Browsing);
        self.sync_marker_state();
    }

    /// Returns the marker position if it may be saved.
    pub fn confirm_current_position(&self) -> Result<Coordinate> {
        let position = self.marker.current_position()?;
        let collision = self.marker.collision();

        if collision.is_colliding {
            return Err(CollisionError {
                position,
                colliding_with: collision.colliding_with,
            }
            .into());
        }

        if collision.is_out_of_range {
            return Err(EditError::EditDistanceExceeded {
                distance_m: collision.distance_from_reference_m.unwrap_or_default(),
                max_m: self.config.map.max_edit_distance_m,
            }
            .into());
        }

        Ok(position)
    }

    /// Confirms the marker position and saves it.
    ///
    /// Geocoding is best-effort. On a persistence failure the workflow stays
    /// active so the user can retry.
    pub async fn submit(&mut self) -> Result<Submission> {
        let location = self.confirm_current_position()?;
        let mode = self.mode();

        let address = match self.collaborators.geocoder.reverse_geocode(location).await {
            Ok(address) => address,
            Err(e) => {
                warn!(location = %location, error = %e, "Reverse geocoding failed");
                None
            }
        };

        let submission = match mode {
            InteractionMode::Adding => {
                let point = self.collaborators.repository.create_point(location).await?;
                Submission {
                    kind: SubmissionKind::Created,
                    point_id: point.id,
                    location,
                    address,
                }
            }
            InteractionMode::EditingPosition(point_id) => {
                self.collaborators
                    .repository
                    .update_point_location(point_id, location)
                    .await?;
                Submission {
                    kind: SubmissionKind::LocationProposed,
                    point_id,
                    location,
                    address,
                }
            }
            InteractionMode::Browsing => {
                return Err(StateError::invalid("submit", mode.to_string()).into());
            }
        };

        self.cancel();
        if let Err(e) = self.refresh_points(true).await {
            warn!(error = %e, "Failed to refresh points after submit");
        }

        info!(point_id = %submission.point_id, kind = ?submission.kind, location = %location, "Submission saved");
        Ok(submission)
    }

    /// Selects a rendered point.
    pub fn select(&mut self, point_id: PointId) -> Result<()> {
        if self.layers.point(point_id).is_none() {
            return Err(EditError::PointNotFound { id: point_id.get() }.into());
        }
        self.state.send_modify(|s| s.selected_point_id = Some(point_id));
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.state.send_if_modified(|s| s.selected_point_id.take().is_some());
    }

    /// Full record of the selected point.
    pub fn selected_point(&self) -> Option<&ParkingPoint> {
        let id = self.state.borrow().selected_point_id?;
        self.layers.point(id)
    }

    /// Replaces the rendered point list.
    ///
    /// Points with invalid locations are skipped. A selection whose point is
    /// gone is cleared.
    pub fn apply_points(&mut self, points: Vec<ParkingPoint>) -> Result<()> {
        let (valid, invalid): (Vec<ParkingPoint>, Vec<ParkingPoint>) =
            points.into_iter().partition(|p| p.location.is_valid());
        for point in &invalid {
            warn!(point_id = %point.id, location = %point.location, "Skipping point with invalid location");
        }

        // First record wins for a repeated id
        let mut seen = HashSet::with_capacity(valid.len());
        let mut duplicates = 0;
        let valid: Vec<ParkingPoint> = valid
            .into_iter()
            .filter(|point| {
                let fresh = seen.insert(point.id);
                if !fresh {
                    warn!(point_id = %point.id, "Skipping duplicate point id");
                    duplicates += 1;
                }
                fresh
            })
            .collect();

        let coordinates: Vec<Coordinate> = valid.iter().map(|p| p.location).collect();
        match self.surface.as_mut() {
            Some(surface) => {
                self.layers.set_points(surface, &valid);
                self.marker
                    .set_rendered_points(surface, &mut self.layers, coordinates.clone())?;
            }
            None => {
                self.layers.load_points(&valid);
                self.marker.load_rendered_points(coordinates.clone());
            }
        }

        let layers = &self.layers;
        self.state.send_modify(|s| {
            s.rendered_point_coordinates = coordinates;
            if s.selected_point_id.map_or(false, |id| layers.point(id).is_none()) {
                s.selected_point_id = None;
            }
        });
        self.sync_marker_state();

        debug!(count = valid.len(), skipped = invalid.len() + duplicates, "Points applied");
        Ok(())
    }

    /// Pulls points from the point source and applies them.
    pub async fn refresh_points(&mut self, force: bool) -> Result<usize> {
        let points = self.collaborators.points.get_points(force).await?;
        self.apply_points(points)?;
        Ok(self.state.borrow().rendered_point_coordinates.len())
    }

    /// Shows the target marker and moves the camera to it, framing it with
    /// `user_location` when known.
    pub fn show_target(&mut self, coord: Coordinate, user_location: Option<Coordinate>) -> Result<()> {
        coord.validate()?;
        self.target = Some(coord);

        let Some(surface) = self.surface.as_mut() else {
            return Ok(());
        };
        self.layers.set_target_marker(surface, Some(coord));
        match user_location {
            Some(user) => surface.fit_bounds(user, coord, self.config.map.fit_padding)?,
            None => surface.fly_to(coord, ZoomLevel::Close, None)?,
        }
        Ok(())
    }

    pub fn clear_target(&mut self) {
        self.target = None;
        if let Some(surface) = self.surface.as_mut() {
            self.layers.set_target_marker(surface, None);
        }
    }

    /// Flies the camera to a rendered point.
    pub fn fly_to_point(&mut self, point_id: PointId) -> Result<()> {
        let location = self
            .layers
            .point(point_id)
            .map(|p| p.location)
            .ok_or(EditError::PointNotFound { id: point_id.get() })?;
        let surface = live_surface(&mut self.surface, "fly_to_point")?;
        surface.fly_to(location, ZoomLevel::Close, None)?;
        Ok(())
    }

    /// Moves the camera without animation.
    pub fn jump_to(&mut self, center: Coordinate, zoom: ZoomLevel) -> Result<()> {
        let surface = live_surface(&mut self.surface, "jump_to")?;
        surface.jump_to(center, zoom)?;
        Ok(())
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> MapViewState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<MapViewState> {
        self.state.subscribe()
    }

    pub fn surface(&self) -> Option<&MapSurface<B>> {
        self.surface.as_ref()
    }

    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }

    pub fn marker(&self) -> &MarkerInteractionController {
        &self.marker
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Tears the page down: ends any workflow, saves the camera and destroys
    /// the surface. Idempotent.
    pub fn destroy(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            self.marker.deactivate(&mut surface, &mut self.layers);
            for id in self.page_listeners.drain(..) {
                surface.unlisten(id);
            }
            if !surface.is_destroyed() {
                persist_camera(
                    self.collaborators.camera_store.as_mut(),
                    &self.config.storage.camera_key,
                    surface.camera(),
                );
            }
            self.layers.unregister(&mut surface);
            surface.destroy();
        }

        self.state.send_modify(|s| {
            s.map_loaded = false;
            s.mode = InteractionMode::Browsing;
            s.selected_point_id = None;
            s.is_marker_in_collision = false;
            s.is_marker_out_of_range = false;
        });
    }

    fn sync_marker_state(&self) {
        let collision = self.marker.collision();
        self.state.send_if_modified(|s| {
            let changed = s.is_marker_in_collision != collision.is_colliding
                || s.is_marker_out_of_range != collision.is_out_of_range;
            s.is_marker_in_collision = collision.is_colliding;
            s.is_marker_out_of_range = collision.is_out_of_range;
            changed
        });
    }
}

fn live_surface<'a, B: MapBackend>(
    surface: &'a mut Option<MapSurface<B>>,
    operation: &str,
) -> Result<&'a mut MapSurface<B>> {
    match surface {
        Some(surface) if !surface.is_destroyed() => Ok(surface),
        _ => Err(StateError::no_surface(operation).into()),
    }
}

fn loaded_surface<'a, B: MapBackend>(
    surface: &'a mut Option<MapSurface<B>>,
    operation: &str,
) -> Result<&'a mut MapSurface<B>> {
    let surface = live_surface(surface, operation)?;
    if !surface.is_loaded() {
        return Err(StateError::not_loaded(operation).into());
    }
    Ok(surface)
}

fn persist_camera(store: &mut dyn CameraStore, key: &str, camera: Camera) {
    if let Err(e) = store.save(key, &camera) {
        warn!(error = %e, "Failed to persist camera");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FixedGeocoder, Geocoder, InMemoryRepository};
    use crate::headless::{HeadlessMap, HeadlessProbe};
    use crate::layers::LayerId;
    use crate::camera_store::MemoryCameraStore;
    use async_trait::async_trait;
    use freepark_core::error::CollaboratorError;
    use freepark_core::FreeParkError;
    use std::sync::Arc;

    const CENTER: Coordinate = Coordinate::new(18.64, 54.36);
    // ~200 m east of CENTER
    const FAR: Coordinate = Coordinate::new(18.643, 54.36);

    fn icons(config: &AppConfig) -> Vec<IconImage> {
        config
            .map
            .icons
            .iter()
            .map(|name| IconImage::new(name.as_str(), vec![1u8]))
            .collect()
    }

    fn facade(collaborators: Collaborators) -> (MapStateFacade<HeadlessMap>, HeadlessProbe) {
        let config = AppConfig::default();
        let icons = icons(&config);
        let mut facade = MapStateFacade::new(config, collaborators);
        let map = HeadlessMap::new();
        let probe = map.probe();
        facade.initialize(map, StyleDocument::empty("test"), icons).unwrap();
        facade.pump().unwrap();
        (facade, probe)
    }

    fn loaded_with(points: Vec<ParkingPoint>) -> (MapStateFacade<HeadlessMap>, HeadlessProbe) {
        let (mut facade, probe) = facade(Collaborators::in_memory(Vec::new()));
        facade.apply_points(points).unwrap();
        facade.jump_to(CENTER, ZoomLevel::Close).unwrap();
        facade.pump().unwrap();
        (facade, probe)
    }

    struct FailingGeocoder;

    #[async_trait]
    impl Geocoder for FailingGeocoder {
        async fn reverse_geocode(&self, _location: Coordinate) -> Result<Option<String>> {
            Err(CollaboratorError::geocoding("service unavailable").into())
        }
    }

    #[test]
    fn test_load_registers_page_listeners() {
        let (facade, probe) = facade(Collaborators::in_memory(Vec::new()));

        assert!(facade.state().map_loaded);
        assert_eq!(probe.listener_count(EventKind::Load), 0);
        assert_eq!(probe.listener_count(EventKind::PointClick), 1);
        assert_eq!(probe.listener_count(EventKind::ClusterClick), 1);
        assert_eq!(probe.listener_count(EventKind::CameraMoveEnd), 1);
        assert_eq!(probe.source_ids().len(), 4);
    }

    #[test]
    fn test_repeated_load_is_ignored() {
        let (mut facade, probe) = facade(Collaborators::in_memory(Vec::new()));
        facade.handle_event(MapEvent::Load).unwrap();
        assert_eq!(probe.listener_count(EventKind::PointClick), 1);
    }

    #[test]
    fn test_start_adding_requires_loaded_map() {
        let config = AppConfig::default();
        let icons = icons(&config);
        let mut facade = MapStateFacade::new(config, Collaborators::in_memory(Vec::new()));

        assert!(matches!(
            facade.start_adding(),
            Err(FreeParkError::State(StateError::SurfaceUnavailable { .. }))
        ));

        facade.initialize(HeadlessMap::new(), StyleDocument::empty("test"), icons).unwrap();
        assert!(matches!(
            facade.start_adding(),
            Err(FreeParkError::State(StateError::MapNotLoaded { .. }))
        ));
    }

    #[test]
    fn test_initialize_failure_keeps_no_surface() {
        let config = AppConfig::default();
        let icons = icons(&config);
        let mut facade = MapStateFacade::new(config, Collaborators::in_memory(Vec::new()));

        let err = facade
            .initialize(HeadlessMap::new().failing_style("offline"), StyleDocument::empty("test"), icons.clone())
            .unwrap_err();
        assert!(matches!(err, FreeParkError::MapInit(_)));
        assert!(facade.surface().is_none());

        // Retry from scratch
        facade.initialize(HeadlessMap::new(), StyleDocument::empty("test"), icons).unwrap();
        assert!(facade.surface().is_some());
    }

    #[test]
    fn test_adding_collision_and_confirm() {
        let (mut facade, probe) = loaded_with(vec![ParkingPoint::new(1, CENTER)]);

        let collision = facade.start_adding().unwrap();
        assert!(collision.is_colliding);
        assert!(facade.state().is_marker_in_collision);
        assert_eq!(facade.state().mode, InteractionMode::Adding);

        let err = facade.confirm_current_position().unwrap_err();
        assert!(err.is_user_facing());
        assert!(matches!(err, FreeParkError::Collision(_)));

        probe.pan_to(FAR, 17.0);
        facade.pump().unwrap();
        assert!(!facade.state().is_marker_in_collision);
        assert_eq!(facade.confirm_current_position().unwrap(), FAR);
    }

    #[test]
    fn test_second_workflow_is_rejected() {
        let (mut facade, probe) = loaded_with(vec![ParkingPoint::new(1, FAR)]);
        facade.start_adding().unwrap();
        let listeners = probe.total_listeners();

        assert!(matches!(facade.start_adding(), Err(FreeParkError::State(_))));
        assert!(matches!(
            facade.start_editing_position(PointId(1)),
            Err(FreeParkError::State(_))
        ));
        assert_eq!(probe.total_listeners(), listeners);
    }

    #[test]
    fn test_cancel_is_safe_anywhere() {
        let (mut facade, probe) = loaded_with(Vec::new());
        let baseline = probe.total_listeners();

        facade.cancel();
        facade.start_adding().unwrap();
        facade.cancel();
        facade.cancel();

        assert_eq!(probe.total_listeners(), baseline);
        assert_eq!(facade.state().mode, InteractionMode::Browsing);
        assert!(facade.confirm_current_position().is_err());
    }

    #[test]
    fn test_editing_unknown_point() {
        let (mut facade, _probe) = loaded_with(Vec::new());
        let err = facade.start_editing_position(PointId(404)).unwrap_err();
        assert!(matches!(err, FreeParkError::Edit(EditError::PointNotFound { id: 404 })));
        assert_eq!(facade.state().mode, InteractionMode::Browsing);
    }

    #[test]
    fn test_editing_out_of_range() {
        let (mut facade, probe) = loaded_with(vec![ParkingPoint::new(7, FAR)]);
        facade.jump_to(CENTER, ZoomLevel::Far).unwrap();
        facade.pump().unwrap();

        let collision = facade.start_editing_position(PointId(7)).unwrap();
        assert!(!collision.is_colliding);
        assert_eq!(facade.state().selected_point_id, Some(PointId(7)));
        assert_eq!(probe.camera().center, FAR);
        facade.pump().unwrap();

        probe.drag(&[FAR, CENTER]);
        facade.pump().unwrap();
        assert!(facade.state().is_marker_out_of_range);
        assert!(matches!(
            facade.confirm_current_position(),
            Err(FreeParkError::Edit(EditError::EditDistanceExceeded { .. }))
        ));
    }

    #[tokio::test]
    async fn test_submit_new_point() {
        let repository = Arc::new(InMemoryRepository::new(vec![ParkingPoint::new(1, CENTER)]));
        let collaborators = Collaborators {
            points: repository.clone(),
            geocoder: Arc::new(FixedGeocoder::new("Długi Targ 1, Gdańsk")),
            repository: repository.clone(),
            camera_store: Box::new(MemoryCameraStore::new()),
        };
        let (mut facade, probe) = facade(collaborators);
        facade.refresh_points(false).await.unwrap();

        probe.pan_to(FAR, 17.0);
        facade.pump().unwrap();
        facade.start_adding().unwrap();

        let submission = facade.submit().await.unwrap();
        assert_eq!(submission.kind, SubmissionKind::Created);
        assert_eq!(submission.point_id, PointId(2));
        assert_eq!(submission.location, FAR);
        assert_eq!(submission.address.as_deref(), Some("Długi Targ 1, Gdańsk"));

        let state = facade.state();
        assert_eq!(state.mode, InteractionMode::Browsing);
        assert_eq!(state.rendered_point_coordinates.len(), 2);
        assert_eq!(repository.len(), 2);
        assert!(probe.marker().map_or(true, |m| !m.visible));
    }

    #[tokio::test]
    async fn test_submit_rejects_collision_and_survives_geocoder_failure() {
        let collaborators = Collaborators::in_memory(vec![ParkingPoint::new(1, CENTER)])
            .with_geocoder(Arc::new(FailingGeocoder));
        let (mut facade, probe) = facade(collaborators);
        facade.refresh_points(false).await.unwrap();
        facade.jump_to(CENTER, ZoomLevel::Close).unwrap();
        facade.pump().unwrap();

        facade.start_adding().unwrap();
        assert!(matches!(facade.submit().await, Err(FreeParkError::Collision(_))));
        assert_eq!(facade.state().mode, InteractionMode::Adding);

        probe.pan_to(FAR, 17.0);
        facade.pump().unwrap();
        let submission = facade.submit().await.unwrap();
        assert_eq!(submission.address, None);
    }

    #[tokio::test]
    async fn test_submit_location_proposal() {
        let repository = Arc::new(InMemoryRepository::new(vec![ParkingPoint::new(3, CENTER)]));
        let collaborators = Collaborators {
            points: repository.clone(),
            geocoder: Arc::new(FixedGeocoder::new("Ogarna 5")),
            repository: repository.clone(),
            camera_store: Box::new(MemoryCameraStore::new()),
        };
        let (mut facade, probe) = facade(collaborators);
        facade.refresh_points(true).await.unwrap();

        facade.start_editing_position(PointId(3)).unwrap();
        facade.pump().unwrap();
        let moved = Coordinate::new(18.6405, 54.36);
        probe.drag(&[CENTER, moved]);
        facade.pump().unwrap();

        let submission = facade.submit().await.unwrap();
        assert_eq!(submission.kind, SubmissionKind::LocationProposed);
        assert_eq!(submission.point_id, PointId(3));
        assert_eq!(repository.proposals()[0].location, moved);
        assert!(facade.layers().point(PointId(3)).unwrap().has_edit_location_proposal);
    }

    #[test]
    fn test_point_and_cluster_clicks() {
        let (mut facade, probe) = loaded_with(vec![
            ParkingPoint::new(1, CENTER),
            ParkingPoint::new(2, FAR),
        ]);

        probe.click(CENTER).unwrap();
        facade.pump().unwrap();
        assert_eq!(facade.state().selected_point_id, Some(PointId(1)));
        assert_eq!(facade.selected_point().map(|p| p.location), Some(CENTER));

        facade.clear_selection();
        assert_eq!(facade.state().selected_point_id, None);

        // Both points aggregate at zoom 12
        facade.jump_to(CENTER, ZoomLevel::Level(12.0)).unwrap();
        facade.pump().unwrap();
        let event = probe.click(CENTER).unwrap();
        assert_eq!(event.kind(), EventKind::ClusterClick);
        facade.pump().unwrap();
        assert!((probe.camera().zoom - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_event_does_not_drop_the_rest_of_the_batch() {
        let (mut facade, engine) = loaded_with(Vec::new());
        facade.start_adding().unwrap();

        let dropped = Coordinate::new(18.641, 54.3605);
        engine.push_event(MapEvent::DragStart { position: CENTER });
        engine.push_event(MapEvent::Drag { position: Coordinate::new(f64::NAN, 54.36) });
        engine.push_event(MapEvent::DragEnd { position: dropped });

        assert!(matches!(facade.pump(), Err(FreeParkError::Geometry(_))));
        assert!(!facade.marker().is_dragging());
        assert_eq!(facade.marker().current_position().unwrap(), dropped);

        // The marker follows the camera again
        engine.pan_to(FAR, 17.0);
        facade.pump().unwrap();
        assert_eq!(facade.marker().current_position().unwrap(), FAR);
        assert_eq!(engine.marker().unwrap().position, FAR);
    }

    #[test]
    fn test_apply_points_keeps_first_of_duplicate_ids() {
        let (mut facade, engine) = loaded_with(Vec::new());

        let mut moved = ParkingPoint::new(1, FAR);
        moved.like_count = 4;
        facade
            .apply_points(vec![ParkingPoint::new(1, CENTER), moved, ParkingPoint::new(2, FAR)])
            .unwrap();

        assert_eq!(facade.state().rendered_point_coordinates, vec![CENTER, FAR]);
        let kept = facade.layers().point(PointId(1)).unwrap();
        assert_eq!((kept.location, kept.like_count), (CENTER, 0));

        facade.jump_to(CENTER, ZoomLevel::Level(17.0)).unwrap();
        facade.pump().unwrap();
        let drawn = engine.source(LayerId::Points.source_id()).unwrap();
        assert_eq!(drawn.features.len(), 2);
    }

    #[test]
    fn test_apply_points_skips_invalid_and_clears_stale_selection() {
        let (mut facade, _probe) = loaded_with(vec![ParkingPoint::new(1, CENTER)]);
        facade.select(PointId(1)).unwrap();

        facade
            .apply_points(vec![
                ParkingPoint::new(2, FAR),
                ParkingPoint::new(3, Coordinate::new(f64::NAN, 54.0)),
            ])
            .unwrap();

        let state = facade.state();
        assert_eq!(state.rendered_point_coordinates, vec![FAR]);
        assert_eq!(state.selected_point_id, None);
        assert!(matches!(
            facade.select(PointId(3)),
            Err(FreeParkError::Edit(EditError::PointNotFound { .. }))
        ));
    }

    #[test]
    fn test_points_applied_while_adding_reevaluate_collision() {
        let (mut facade, _probe) = loaded_with(Vec::new());
        facade.start_adding().unwrap();
        assert!(!facade.state().is_marker_in_collision);

        facade.apply_points(vec![ParkingPoint::new(1, CENTER)]).unwrap();
        assert!(facade.state().is_marker_in_collision);
    }

    #[test]
    fn test_target_marker() {
        let (mut facade, probe) = loaded_with(Vec::new());
        facade.show_target(FAR, None).unwrap();
        facade.pump().unwrap();
        assert_eq!(probe.camera().center, FAR);
        assert_eq!(probe.source("target-marker").unwrap().features.len(), 1);

        facade.show_target(FAR, Some(CENTER)).unwrap();
        facade.pump().unwrap();
        assert!(probe.camera().zoom <= 17.0);

        facade.clear_target();
        assert!(probe.source("target-marker").unwrap().features.is_empty());
        assert!(facade.show_target(Coordinate::new(0.0, f64::NAN), None).is_err());
    }

    #[test]
    fn test_subscribe_observes_changes() {
        let (mut facade, _probe) = loaded_with(vec![ParkingPoint::new(1, CENTER)]);
        let mut rx = facade.subscribe();
        rx.borrow_and_update();

        facade.start_adding().unwrap();
        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.mode, InteractionMode::Adding);
        assert!(state.is_marker_in_collision);
    }

    #[test]
    fn test_destroy_is_idempotent_and_persists_camera() {
        let (mut facade, probe) = loaded_with(Vec::new());
        facade.start_adding().unwrap();

        facade.destroy();
        assert_eq!(probe.total_listeners(), 0);
        assert!(probe.is_removed());
        assert!(!facade.state().map_loaded);

        facade.destroy();
        assert!(facade.surface().is_none());
        assert!(facade.collaborators.camera_store.load("map.camera").unwrap().is_some());
        assert!(matches!(facade.jump_to(CENTER, ZoomLevel::Far), Err(FreeParkError::State(_))));
    }
}
