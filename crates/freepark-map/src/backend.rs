//! Native map engine seam.
//!
//! [`MapBackend`] is the narrow set of calls the map core makes into a vector
//! map engine. A GUI shell implements it on top of its engine bindings;
//! [`crate::headless::HeadlessMap`] implements it in-process for the CLI and
//! tests.

use crate::event::{EventKind, ListenerId, MapEvent};
use freepark_core::error::MapInitError;
use freepark_core::types::{Bounds, Camera, Coordinate, Padding};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameters for creating the native map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapOptions {
    /// DOM/container id the engine renders into
    pub container_id: String,
    /// Initial camera
    pub camera: Camera,
    /// The camera may not leave these bounds
    pub max_bounds: Bounds,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

/// A MapLibre style document, version 8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleDocument(Value);

impl StyleDocument {
    /// Parses and validates a style document.
    pub fn from_json(json: &str) -> Result<Self, MapInitError> {
        let value: Value = serde_json::from_str(json).map_err(|e| MapInitError::style(e.to_string()))?;
        Self::from_value(value)
    }

    /// Validates an already parsed style document.
    pub fn from_value(value: Value) -> Result<Self, MapInitError> {
        let style = Self(value);
        style.validate()?;
        Ok(style)
    }

    /// A style with no sources and no layers.
    pub fn empty(name: &str) -> Self {
        Self(serde_json::json!({
            "version": 8,
            "name": name,
            "sources": {},
            "layers": [],
        }))
    }

    /// Checks the parts of the document the engine cannot do without.
    pub fn validate(&self) -> Result<(), MapInitError> {
        let root = self
            .0
            .as_object()
            .ok_or_else(|| MapInitError::style("style document must be a JSON object"))?;

        match root.get("version").and_then(Value::as_u64) {
            Some(8) => {}
            Some(v) => return Err(MapInitError::style(format!("unsupported style version {}", v))),
            None => return Err(MapInitError::style("missing style version")),
        }

        if let Some(sources) = root.get("sources") {
            if !sources.is_object() {
                return Err(MapInitError::style("'sources' must be an object"));
            }
        }

        if !root.get("layers").map_or(false, Value::is_array) {
            return Err(MapInitError::style("'layers' must be an array"));
        }

        Ok(())
    }

    /// Style name, if present.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Raw image data registered under a name referenced by symbol layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    pub name: String,
    pub data: Vec<u8>,
}

impl IconImage {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Calls the map core makes into the native map engine.
///
/// The engine owns rendering, gestures and animation. Everything it reports
/// back arrives as [`MapEvent`]s, either forwarded by the shell or drained
/// through [`MapBackend::poll_events`].
pub trait MapBackend {
    /// Creates the native map.
    fn create_map(&mut self, options: &MapOptions) -> Result<(), MapInitError>;

    /// Loads the style document.
    fn load_style(&mut self, style: &StyleDocument) -> Result<(), MapInitError>;

    /// Registers an image for symbol layers.
    fn add_image(&mut self, image: &IconImage) -> Result<(), MapInitError>;

    /// Removes the native map together with its sources and layers.
    fn remove_map(&mut self);

    fn add_source(&mut self, id: &str, data: &FeatureCollection);
    fn remove_source(&mut self, id: &str);
    fn has_source(&self, id: &str) -> bool;

    /// Replaces the data of an existing source.
    fn set_source_data(&mut self, id: &str, data: &FeatureCollection);

    /// Adds a style layer object.
    fn add_layer(&mut self, layer: &Value);
    fn remove_layer(&mut self, id: &str);

    fn camera(&self) -> Camera;
    fn jump_to(&mut self, camera: Camera);
    fn fly_to(&mut self, camera: Camera, speed: f64);
    fn fit_bounds(&mut self, bounds: &Bounds, padding: Padding, max_zoom: f64);

    /// Adds the draggable marker. Called at most once per map.
    fn add_marker(&mut self, position: Coordinate);
    fn set_marker_position(&mut self, position: Coordinate);
    fn set_marker_visible(&mut self, visible: bool);
    fn set_marker_draggable(&mut self, draggable: bool);

    /// Attaches an engine callback for `kind`.
    fn wire_listener(&mut self, id: ListenerId, kind: EventKind);

    /// Detaches a callback attached by [`MapBackend::wire_listener`].
    fn unwire_listener(&mut self, id: ListenerId);

    /// Drains events queued by the engine since the last call.
    fn poll_events(&mut self) -> Vec<MapEvent> {
        Vec::new()
    }
}
