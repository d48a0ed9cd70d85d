//! Map surface lifecycle.
//!
//! A [`MapSurface`] owns exactly one native map and the registry of listeners
//! wired into it. Creation is all-or-nothing, the load event is honored once,
//! and teardown unwires every listener before the native map is removed.

use crate::backend::{IconImage, MapBackend, MapOptions, StyleDocument};
use crate::event::{EventKind, ListenerId, MapEvent};
use freepark_core::config::MapConfig;
use freepark_core::error::{GeometryError, MapInitError, StateError};
use freepark_core::types::{Bounds, Camera, Coordinate, Padding, ZoomLevel};
use geojson::FeatureCollection;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Zoom presets and limits used for camera moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomSettings {
    pub close: f64,
    pub far: f64,
    pub min: f64,
    pub max: f64,
    pub fly_speed: f64,
}

impl ZoomSettings {
    pub fn from_config(config: &MapConfig) -> Self {
        Self {
            close: config.close_zoom,
            far: config.far_zoom,
            min: config.min_zoom,
            max: config.max_zoom,
            fly_speed: config.fly_speed,
        }
    }

    /// Resolves a preset to a level within `min..=max`.
    pub fn resolve(&self, zoom: ZoomLevel) -> f64 {
        let level = match zoom {
            ZoomLevel::Close => self.close,
            ZoomLevel::Far => self.far,
            ZoomLevel::Level(level) => level,
        };
        level.clamp(self.min, self.max)
    }
}

impl Default for ZoomSettings {
    fn default() -> Self {
        Self::from_config(&MapConfig::default())
    }
}

/// Everything needed to create a surface.
#[derive(Debug, Clone)]
pub struct SurfaceOptions {
    pub container_id: String,
    /// Initial viewport when no camera is restored
    pub bounds: Bounds,
    /// The camera may not leave these bounds
    pub max_bounds: Bounds,
    pub style: StyleDocument,
    pub icons: Vec<IconImage>,
    /// Icon names that must be present in `icons`
    pub required_icons: Vec<String>,
    pub initial_camera: Option<Camera>,
    pub zoom: ZoomSettings,
}

impl SurfaceOptions {
    /// Builds options for the configured region.
    pub fn from_config(container_id: impl Into<String>, config: &MapConfig, style: StyleDocument) -> Self {
        Self {
            container_id: container_id.into(),
            bounds: config.region,
            max_bounds: config.max_bounds(),
            style,
            icons: Vec::new(),
            required_icons: config.icons.clone(),
            initial_camera: None,
            zoom: ZoomSettings::from_config(config),
        }
    }

    pub fn with_icons(mut self, icons: Vec<IconImage>) -> Self {
        self.icons = icons;
        self
    }

    pub fn with_initial_camera(mut self, camera: Option<Camera>) -> Self {
        self.initial_camera = camera;
        self
    }

    fn validate(&self) -> Result<(), MapInitError> {
        if !self.bounds.is_valid() {
            return Err(MapInitError::bounds("viewport bounds are malformed"));
        }
        if !self.max_bounds.is_valid() {
            return Err(MapInitError::bounds("max bounds are malformed"));
        }
        if !self.max_bounds.contains_bounds(&self.bounds) {
            return Err(MapInitError::bounds("viewport bounds exceed max bounds"));
        }

        self.style.validate()?;

        for name in &self.required_icons {
            if !self.icons.iter().any(|icon| &icon.name == name) {
                return Err(MapInitError::icon(name, "no image provided"));
            }
        }

        Ok(())
    }
}

/// One native map instance and its listeners.
pub struct MapSurface<B: MapBackend> {
    backend: B,
    container_id: String,
    bounds: Bounds,
    max_bounds: Bounds,
    zoom: ZoomSettings,
    listeners: BTreeMap<ListenerId, EventKind>,
    next_listener: u64,
    load_listener: Option<ListenerId>,
    loaded: bool,
    destroyed: bool,
    has_marker: bool,
}

impl<B: MapBackend> MapSurface<B> {
    /// Creates the native map, loads the style and registers every icon.
    ///
    /// On failure the native map is removed again and no surface exists.
    pub fn initialize(mut backend: B, options: SurfaceOptions) -> Result<Self, MapInitError> {
        options.validate()?;

        let restored = options
            .initial_camera
            .filter(|camera| camera.center.is_valid() && options.max_bounds.contains(camera.center));

        let map_options = MapOptions {
            container_id: options.container_id.clone(),
            camera: restored
                .unwrap_or_else(|| Camera::new(options.bounds.center(), options.zoom.far)),
            max_bounds: options.max_bounds,
            min_zoom: options.zoom.min,
            max_zoom: options.zoom.max,
        };
        backend.create_map(&map_options)?;

        let loaded = backend.load_style(&options.style).and_then(|_| {
            options
                .icons
                .iter()
                .try_for_each(|icon| backend.add_image(icon))
        });
        if let Err(e) = loaded {
            warn!(container_id = %options.container_id, error = %e, "Map initialization failed");
            backend.remove_map();
            return Err(e);
        }

        if restored.is_none() {
            backend.fit_bounds(&options.bounds, Padding::uniform(0.0), options.zoom.max);
        }

        let mut surface = Self {
            backend,
            container_id: options.container_id,
            bounds: options.bounds,
            max_bounds: options.max_bounds,
            zoom: options.zoom,
            listeners: BTreeMap::new(),
            next_listener: 1,
            load_listener: None,
            loaded: false,
            destroyed: false,
            has_marker: false,
        };
        surface.load_listener = surface.listen(EventKind::Load).ok();

        info!(
            container_id = %surface.container_id,
            restored_camera = restored.is_some(),
            "Map surface initialized"
        );
        Ok(surface)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn max_bounds(&self) -> Bounds {
        self.max_bounds
    }

    pub fn zoom_settings(&self) -> ZoomSettings {
        self.zoom
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Marks the map as loaded.
    ///
    /// Returns true only for the first load event of this surface.
    pub fn handle_load(&mut self) -> bool {
        if self.destroyed || self.loaded {
            debug!(container_id = %self.container_id, "Ignoring repeated load event");
            return false;
        }

        if let Some(id) = self.load_listener.take() {
            self.unlisten(id);
        }
        self.loaded = true;
        true
    }

    // Listener registry

    /// Registers and wires a listener for `kind`.
    pub fn listen(&mut self, kind: EventKind) -> Result<ListenerId, StateError> {
        if self.destroyed {
            return Err(StateError::no_surface("listen"));
        }

        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, kind);
        self.backend.wire_listener(id, kind);
        Ok(id)
    }

    /// Unwires a listener. Returns false if it was not registered.
    pub fn unlisten(&mut self, id: ListenerId) -> bool {
        match self.listeners.remove(&id) {
            Some(_) => {
                self.backend.unwire_listener(id);
                true
            }
            None => false,
        }
    }

    /// Returns true if `id` is a live listener.
    pub fn is_live(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.listeners.values().any(|k| *k == kind)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.values().filter(|k| **k == kind).count()
    }

    /// Returns true if some live listener would receive `event`.
    pub fn accepts(&self, event: &MapEvent) -> bool {
        !self.destroyed && self.is_listening(event.kind())
    }

    // Camera

    pub fn camera(&self) -> Camera {
        self.backend.camera()
    }

    pub fn resolve_zoom(&self, zoom: ZoomLevel) -> f64 {
        self.zoom.resolve(zoom)
    }

    fn target(&self, center: Coordinate, zoom: ZoomLevel) -> Result<Camera, GeometryError> {
        center.validate()?;
        Ok(Camera::new(self.max_bounds.clamp(center), self.resolve_zoom(zoom)))
    }

    /// Moves the camera without animation.
    pub fn jump_to(&mut self, center: Coordinate, zoom: ZoomLevel) -> Result<(), GeometryError> {
        let camera = self.target(center, zoom)?;
        if self.destroyed {
            return Ok(());
        }
        self.backend.jump_to(camera);
        Ok(())
    }

    /// Animates the camera; `speed` defaults to the configured fly speed.
    pub fn fly_to(&mut self, center: Coordinate, zoom: ZoomLevel, speed: Option<f64>) -> Result<(), GeometryError> {
        let camera = self.target(center, zoom)?;
        if self.destroyed {
            return Ok(());
        }
        self.backend.fly_to(camera, speed.unwrap_or(self.zoom.fly_speed));
        Ok(())
    }

    /// Frames two coordinates, zooming in no further than the close preset.
    pub fn fit_bounds(&mut self, a: Coordinate, b: Coordinate, padding: Padding) -> Result<(), GeometryError> {
        a.validate()?;
        b.validate()?;
        if self.destroyed {
            return Ok(());
        }
        let bounds = Bounds::from_corners(self.max_bounds.clamp(a), self.max_bounds.clamp(b));
        self.backend.fit_bounds(&bounds, padding, self.zoom.close);
        Ok(())
    }

    /// Registers an image after initialization.
    pub fn add_image(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Result<(), MapInitError> {
        if self.destroyed {
            return Ok(());
        }
        self.backend.add_image(&IconImage::new(name, data))
    }

    // Sources and layers

    pub fn has_source(&self, id: &str) -> bool {
        !self.destroyed && self.backend.has_source(id)
    }

    pub fn add_source(&mut self, id: &str, data: &FeatureCollection) {
        if !self.destroyed && !self.backend.has_source(id) {
            self.backend.add_source(id, data);
        }
    }

    pub fn remove_source(&mut self, id: &str) {
        if self.has_source(id) {
            self.backend.remove_source(id);
        }
    }

    /// Replaces source data. Returns false if the source does not exist.
    pub fn set_source_data(&mut self, id: &str, data: &FeatureCollection) -> bool {
        if !self.has_source(id) {
            return false;
        }
        self.backend.set_source_data(id, data);
        true
    }

    pub fn add_layer(&mut self, layer: &Value) {
        if !self.destroyed {
            self.backend.add_layer(layer);
        }
    }

    pub fn remove_layer(&mut self, id: &str) {
        if !self.destroyed {
            self.backend.remove_layer(id);
        }
    }

    // Marker

    pub fn has_marker(&self) -> bool {
        self.has_marker
    }

    /// Shows the marker at `position`, adding it on first use.
    pub fn show_marker(&mut self, position: Coordinate) {
        if self.destroyed {
            return;
        }
        if self.has_marker {
            self.backend.set_marker_position(position);
            self.backend.set_marker_visible(true);
        } else {
            self.backend.add_marker(position);
            self.has_marker = true;
        }
    }

    pub fn move_marker(&mut self, position: Coordinate) {
        if !self.destroyed && self.has_marker {
            self.backend.set_marker_position(position);
        }
    }

    pub fn hide_marker(&mut self) {
        if !self.destroyed && self.has_marker {
            self.backend.set_marker_visible(false);
        }
    }

    pub fn set_marker_draggable(&mut self, draggable: bool) {
        if !self.destroyed && self.has_marker {
            self.backend.set_marker_draggable(draggable);
        }
    }

    /// Unwires every listener, then removes the native map. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        let ids: Vec<ListenerId> = self.listeners.keys().copied().collect();
        for id in ids {
            self.unlisten(id);
        }
        self.load_listener = None;

        self.backend.remove_map();
        self.destroyed = true;
        self.has_marker = false;
        info!(container_id = %self.container_id, "Map surface destroyed");
    }
}

impl<B: MapBackend> Drop for MapSurface<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessMap;

    fn icons() -> Vec<IconImage> {
        MapConfig::default()
            .icons
            .iter()
            .map(|name| IconImage::new(name.as_str(), vec![0x89, 0x50, 0x4e, 0x47]))
            .collect()
    }

    fn options() -> SurfaceOptions {
        SurfaceOptions::from_config("map", &MapConfig::default(), StyleDocument::empty("test"))
            .with_icons(icons())
    }

    #[test]
    fn test_initialize_registers_icons_and_load_listener() {
        let map = HeadlessMap::new();
        let probe = map.probe();
        let surface = MapSurface::initialize(map, options()).unwrap();

        assert!(probe.is_created());
        assert_eq!(probe.image_names().len(), 4);
        assert_eq!(surface.listener_count(EventKind::Load), 1);
        assert_eq!(probe.listener_count(EventKind::Load), 1);
        assert!(MapConfig::default().region.contains(probe.camera().center));
    }

    #[test]
    fn test_style_failure_leaves_nothing_behind() {
        let map = HeadlessMap::new().failing_style("404");
        let probe = map.probe();

        let err = MapSurface::initialize(map, options()).err().unwrap();
        assert!(matches!(err, MapInitError::StyleLoadFailed { .. }));
        assert!(probe.is_removed());
        assert_eq!(probe.total_listeners(), 0);
    }

    #[test]
    fn test_icon_failure_and_missing_icon() {
        let map = HeadlessMap::new().failing_icon("target");
        let probe = map.probe();
        let err = MapSurface::initialize(map, options()).err().unwrap();
        assert!(matches!(err, MapInitError::IconLoadFailed { ref name, .. } if name == "target"));
        assert!(probe.is_removed());

        let options = options().with_icons(Vec::new());
        let err = MapSurface::initialize(HeadlessMap::new(), options).err().unwrap();
        assert!(matches!(err, MapInitError::IconLoadFailed { .. }));
    }

    #[test]
    fn test_bounds_must_fit_max_bounds() {
        let mut options = options();
        options.max_bounds = Bounds::new(Coordinate::new(18.5, 54.3), Coordinate::new(18.6, 54.4));
        let err = MapSurface::initialize(HeadlessMap::new(), options).err().unwrap();
        assert!(matches!(err, MapInitError::InvalidBounds { .. }));
    }

    #[test]
    fn test_restored_camera_is_used() {
        let camera = Camera::new(Coordinate::new(18.6, 54.4), 15.0);
        let map = HeadlessMap::new();
        let probe = map.probe();
        let _surface =
            MapSurface::initialize(map, options().with_initial_camera(Some(camera))).unwrap();
        assert_eq!(probe.camera(), camera);
    }

    #[test]
    fn test_load_is_honored_once() {
        let mut surface = MapSurface::initialize(HeadlessMap::new(), options()).unwrap();
        assert!(surface.handle_load());
        assert!(!surface.handle_load());
        assert!(surface.is_loaded());
        assert!(!surface.is_listening(EventKind::Load));
    }

    #[test]
    fn test_camera_targets_are_clamped() {
        let map = HeadlessMap::new();
        let probe = map.probe();
        let mut surface = MapSurface::initialize(map, options()).unwrap();

        surface.jump_to(Coordinate::new(30.0, 54.4), ZoomLevel::Close).unwrap();
        let camera = probe.camera();
        assert_eq!(camera.center.lng, surface.max_bounds().north_east.lng);
        assert_eq!(camera.zoom, 17.0);

        surface.fly_to(Coordinate::new(18.6, 54.4), ZoomLevel::Level(99.0), None).unwrap();
        assert_eq!(probe.camera().zoom, 20.0);

        assert!(surface.jump_to(Coordinate::new(f64::NAN, 54.4), ZoomLevel::Far).is_err());
    }

    #[test]
    fn test_marker_is_added_once() {
        let map = HeadlessMap::new();
        let probe = map.probe();
        let mut surface = MapSurface::initialize(map, options()).unwrap();

        surface.show_marker(Coordinate::new(18.6, 54.4));
        surface.hide_marker();
        surface.show_marker(Coordinate::new(18.7, 54.4));

        assert_eq!(probe.markers_added(), 1);
        let marker = probe.marker().unwrap();
        assert!(marker.visible);
        assert_eq!(marker.position, Coordinate::new(18.7, 54.4));
    }

    #[test]
    fn test_destroy_unwires_and_is_idempotent() {
        let map = HeadlessMap::new();
        let probe = map.probe();
        let mut surface = MapSurface::initialize(map, options()).unwrap();
        surface.listen(EventKind::CameraMove).unwrap();
        surface.listen(EventKind::Drag).unwrap();

        surface.destroy();
        assert!(surface.is_destroyed());
        assert_eq!(probe.total_listeners(), 0);
        assert!(probe.is_removed());

        surface.destroy();
        assert_eq!(probe.unwire_calls(), 3);
        assert!(surface.listen(EventKind::Drag).is_err());
        assert!(surface.jump_to(Coordinate::new(18.6, 54.4), ZoomLevel::Far).is_ok());
    }

    #[test]
    fn test_drop_destroys() {
        let map = HeadlessMap::new();
        let probe = map.probe();
        {
            let _surface = MapSurface::initialize(map, options()).unwrap();
        }
        assert!(probe.is_removed());
        assert_eq!(probe.total_listeners(), 0);
    }
}
