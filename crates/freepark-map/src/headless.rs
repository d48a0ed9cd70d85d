//! In-process map backend.
//!
//! [`HeadlessMap`] keeps the state a real engine would hold (camera, sources,
//! layers, images, the marker and wired listeners) without rendering
//! anything. Camera changes queue the move events an engine would emit, so a
//! caller can drain them with [`MapBackend::poll_events`] and feed them back
//! into the facade.
//!
//! A [`HeadlessProbe`] shares the same state. It stays usable after the map
//! has been moved into a surface, which makes it a spy for tests and a way to
//! simulate user gestures (pans, drags, clicks).

use crate::backend::{IconImage, MapBackend, MapOptions, StyleDocument};
use crate::event::{EventKind, ListenerId, MapEvent};
use crate::layers::LayerId;
use freepark_core::error::MapInitError;
use freepark_core::types::{Bounds, Camera, Coordinate, Padding, PointId};
use freepark_geo::projection::{fit_camera, project};
use geojson::FeatureCollection;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use tracing::{debug, trace};

/// Clicks within this many pixels of a feature hit it.
pub const CLICK_TOLERANCE_PX: f64 = 24.0;

const DEFAULT_VIEWPORT: (f64, f64) = (800.0, 600.0);

/// Marker as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlessMarker {
    pub position: Coordinate,
    pub visible: bool,
    pub draggable: bool,
}

#[derive(Debug)]
struct HeadlessState {
    options: Option<MapOptions>,
    viewport: (f64, f64),
    camera: Camera,
    style_loaded: bool,
    removed: bool,
    images: BTreeMap<String, usize>,
    sources: BTreeMap<String, FeatureCollection>,
    layers: Vec<Value>,
    marker: Option<HeadlessMarker>,
    markers_added: usize,
    listeners: HashMap<ListenerId, EventKind>,
    wire_calls: usize,
    unwire_calls: usize,
    source_updates: usize,
    events: VecDeque<MapEvent>,
    fail_create: Option<String>,
    fail_style: Option<String>,
    fail_icon: Option<String>,
}

impl Default for HeadlessState {
    fn default() -> Self {
        Self {
            options: None,
            viewport: DEFAULT_VIEWPORT,
            camera: Camera::new(Coordinate::new(0.0, 0.0), 0.0),
            style_loaded: false,
            removed: false,
            images: BTreeMap::new(),
            sources: BTreeMap::new(),
            layers: Vec::new(),
            marker: None,
            markers_added: 0,
            listeners: HashMap::new(),
            wire_calls: 0,
            unwire_calls: 0,
            source_updates: 0,
            events: VecDeque::new(),
            fail_create: None,
            fail_style: None,
            fail_icon: None,
        }
    }
}

impl HeadlessState {
    /// Applies the engine's camera constraints.
    fn constrain(&self, camera: Camera) -> Camera {
        match &self.options {
            Some(options) => Camera::new(
                options.max_bounds.clamp(camera.center),
                camera.zoom.clamp(options.min_zoom, options.max_zoom),
            ),
            None => camera,
        }
    }

    fn move_camera(&mut self, camera: Camera) {
        self.camera = self.constrain(camera);
        let Camera { center, zoom } = self.camera;
        self.events.push_back(MapEvent::CameraMove { center, zoom });
        self.events.push_back(MapEvent::CameraMoveEnd { center, zoom });
    }
}

/// Map backend that runs without a renderer.
#[derive(Debug, Default)]
pub struct HeadlessMap {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the viewport size in pixels used for fit-bounds and clicks.
    pub fn with_viewport(self, width: f64, height: f64) -> Self {
        self.state.borrow_mut().viewport = (width, height);
        self
    }

    /// Makes map creation fail.
    pub fn failing_create(self, reason: impl Into<String>) -> Self {
        self.state.borrow_mut().fail_create = Some(reason.into());
        self
    }

    /// Makes style loading fail.
    pub fn failing_style(self, reason: impl Into<String>) -> Self {
        self.state.borrow_mut().fail_style = Some(reason.into());
        self
    }

    /// Makes registering the named icon fail.
    pub fn failing_icon(self, name: impl Into<String>) -> Self {
        self.state.borrow_mut().fail_icon = Some(name.into());
        self
    }

    /// Returns a probe sharing this map's state.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl MapBackend for HeadlessMap {
    fn create_map(&mut self, options: &MapOptions) -> Result<(), MapInitError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.fail_create {
            return Err(MapInitError::CreateFailed {
                container_id: options.container_id.clone(),
                reason: reason.clone(),
            });
        }

        state.options = Some(options.clone());
        state.camera = state.constrain(options.camera);
        state.removed = false;
        debug!(container_id = %options.container_id, "Headless map created");
        Ok(())
    }

    fn load_style(&mut self, style: &StyleDocument) -> Result<(), MapInitError> {
        let mut state = self.state.borrow_mut();
        if let Some(reason) = &state.fail_style {
            return Err(MapInitError::style(reason.clone()));
        }
        style.validate()?;

        state.style_loaded = true;
        state.events.push_back(MapEvent::Load);
        Ok(())
    }

    fn add_image(&mut self, image: &IconImage) -> Result<(), MapInitError> {
        let mut state = self.state.borrow_mut();
        if state.fail_icon.as_deref() == Some(image.name.as_str()) {
            return Err(MapInitError::icon(&image.name, "image could not be decoded"));
        }
        if image.data.is_empty() {
            return Err(MapInitError::icon(&image.name, "image data is empty"));
        }

        state.images.insert(image.name.clone(), image.data.len());
        Ok(())
    }

    fn remove_map(&mut self) {
        let mut state = self.state.borrow_mut();
        state.removed = true;
        state.style_loaded = false;
        state.sources.clear();
        state.layers.clear();
        state.images.clear();
        state.marker = None;
        state.events.clear();
    }

    fn add_source(&mut self, id: &str, data: &FeatureCollection) {
        self.state.borrow_mut().sources.insert(id.to_string(), data.clone());
    }

    fn remove_source(&mut self, id: &str) {
        self.state.borrow_mut().sources.remove(id);
    }

    fn has_source(&self, id: &str) -> bool {
        self.state.borrow().sources.contains_key(id)
    }

    fn set_source_data(&mut self, id: &str, data: &FeatureCollection) {
        let mut state = self.state.borrow_mut();
        if let Some(source) = state.sources.get_mut(id) {
            *source = data.clone();
            state.source_updates += 1;
        }
    }

    fn add_layer(&mut self, layer: &Value) {
        self.state.borrow_mut().layers.push(layer.clone());
    }

    fn remove_layer(&mut self, id: &str) {
        self.state
            .borrow_mut()
            .layers
            .retain(|layer| layer.get("id").and_then(Value::as_str) != Some(id));
    }

    fn camera(&self) -> Camera {
        self.state.borrow().camera
    }

    fn jump_to(&mut self, camera: Camera) {
        self.state.borrow_mut().move_camera(camera);
    }

    fn fly_to(&mut self, camera: Camera, speed: f64) {
        trace!(speed, "Headless fly_to completes immediately");
        self.state.borrow_mut().move_camera(camera);
    }

    fn fit_bounds(&mut self, bounds: &Bounds, padding: Padding, max_zoom: f64) {
        let mut state = self.state.borrow_mut();
        let (width, height) = state.viewport;
        let camera = fit_camera(bounds, width, height, padding, max_zoom);
        state.move_camera(camera);
    }

    fn add_marker(&mut self, position: Coordinate) {
        let mut state = self.state.borrow_mut();
        state.marker = Some(HeadlessMarker {
            position,
            visible: true,
            draggable: false,
        });
        state.markers_added += 1;
    }

    fn set_marker_position(&mut self, position: Coordinate) {
        if let Some(marker) = self.state.borrow_mut().marker.as_mut() {
            marker.position = position;
        }
    }

    fn set_marker_visible(&mut self, visible: bool) {
        if let Some(marker) = self.state.borrow_mut().marker.as_mut() {
            marker.visible = visible;
        }
    }

    fn set_marker_draggable(&mut self, draggable: bool) {
        if let Some(marker) = self.state.borrow_mut().marker.as_mut() {
            marker.draggable = draggable;
        }
    }

    fn wire_listener(&mut self, id: ListenerId, kind: EventKind) {
        let mut state = self.state.borrow_mut();
        state.listeners.insert(id, kind);
        state.wire_calls += 1;
    }

    fn unwire_listener(&mut self, id: ListenerId) {
        let mut state = self.state.borrow_mut();
        if state.listeners.remove(&id).is_some() {
            state.unwire_calls += 1;
        }
    }

    fn poll_events(&mut self) -> Vec<MapEvent> {
        self.state.borrow_mut().events.drain(..).collect()
    }
}

/// Shared view into a [`HeadlessMap`].
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessProbe {
    /// True once the map was created and not removed.
    pub fn is_created(&self) -> bool {
        let state = self.state.borrow();
        state.options.is_some() && !state.removed
    }

    pub fn is_removed(&self) -> bool {
        self.state.borrow().removed
    }

    pub fn style_loaded(&self) -> bool {
        self.state.borrow().style_loaded
    }

    pub fn camera(&self) -> Camera {
        self.state.borrow().camera
    }

    pub fn marker(&self) -> Option<HeadlessMarker> {
        self.state.borrow().marker
    }

    /// Number of times a marker was added to the map.
    pub fn markers_added(&self) -> usize {
        self.state.borrow().markers_added
    }

    pub fn source(&self, id: &str) -> Option<FeatureCollection> {
        self.state.borrow().sources.get(id).cloned()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.state.borrow().sources.keys().cloned().collect()
    }

    /// Ids of the style layers in insertion order.
    pub fn layer_ids(&self) -> Vec<String> {
        self.state
            .borrow()
            .layers
            .iter()
            .filter_map(|layer| layer.get("id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn image_names(&self) -> Vec<String> {
        self.state.borrow().images.keys().cloned().collect()
    }

    /// Listeners currently wired for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.state
            .borrow()
            .listeners
            .values()
            .filter(|k| **k == kind)
            .count()
    }

    /// Listeners currently wired, any kind.
    pub fn total_listeners(&self) -> usize {
        self.state.borrow().listeners.len()
    }

    pub fn wire_calls(&self) -> usize {
        self.state.borrow().wire_calls
    }

    pub fn unwire_calls(&self) -> usize {
        self.state.borrow().unwire_calls
    }

    /// Number of data replacements pushed to existing sources.
    pub fn source_updates(&self) -> usize {
        self.state.borrow().source_updates
    }

    pub fn pending_events(&self) -> usize {
        self.state.borrow().events.len()
    }

    /// Queues an arbitrary engine event.
    pub fn push_event(&self, event: MapEvent) {
        self.state.borrow_mut().events.push_back(event);
    }

    /// Simulates the user panning or zooming the map.
    pub fn pan_to(&self, center: Coordinate, zoom: f64) {
        self.state.borrow_mut().move_camera(Camera::new(center, zoom));
    }

    /// Simulates the user dragging the marker along `path`.
    ///
    /// The first position starts the drag and the last one drops the marker.
    pub fn drag(&self, path: &[Coordinate]) {
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return;
        };

        let mut state = self.state.borrow_mut();
        if let Some(marker) = state.marker.as_mut() {
            marker.position = last;
        }
        state.events.push_back(MapEvent::DragStart { position: first });
        for &position in path {
            state.events.push_back(MapEvent::Drag { position });
        }
        state.events.push_back(MapEvent::DragEnd { position: last });
    }

    /// Simulates a click at `at` on the points layer.
    ///
    /// Queues and returns the click event for the closest feature within
    /// [`CLICK_TOLERANCE_PX`], if any.
    pub fn click(&self, at: Coordinate) -> Option<MapEvent> {
        let mut state = self.state.borrow_mut();
        let zoom = state.camera.zoom;
        let target = project(at, zoom);

        let source = state.sources.get(LayerId::Points.source_id())?;
        let mut best: Option<(f64, MapEvent)> = None;
        for feature in &source.features {
            let Some(geojson::Value::Point(position)) = feature.geometry.as_ref().map(|g| &g.value) else {
                continue;
            };
            if position.len() < 2 {
                continue;
            }
            let center = Coordinate::new(position[0], position[1]);
            let distance = project(center, zoom).distance(target);
            if distance > CLICK_TOLERANCE_PX || best.as_ref().map_or(false, |(d, _)| *d <= distance) {
                continue;
            }

            let is_cluster = feature
                .property("cluster")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let event = if is_cluster {
                feature
                    .property("cluster_id")
                    .and_then(Value::as_u64)
                    .map(|cluster_id| MapEvent::ClusterClick { cluster_id, center })
            } else {
                feature
                    .property("id")
                    .and_then(Value::as_i64)
                    .map(|id| MapEvent::PointClick { id: PointId(id) })
            };
            if let Some(event) = event {
                best = Some((distance, event));
            }
        }

        let (_, event) = best?;
        state.events.push_back(event.clone());
        Some(event)
    }
}
