//! Map events delivered by the native map engine.
//!
//! The embedding shell forwards every engine callback as a [`MapEvent`]. Each
//! event belongs to one [`EventKind`]; listeners are registered per kind and
//! identified by a [`ListenerId`].

use freepark_core::types::{Coordinate, PointId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of map events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Load,
    PointClick,
    ClusterClick,
    CameraMove,
    CameraMoveEnd,
    DragStart,
    Drag,
    DragEnd,
}

impl EventKind {
    /// All event kinds.
    pub const ALL: [EventKind; 8] = [
        EventKind::Load,
        EventKind::PointClick,
        EventKind::ClusterClick,
        EventKind::CameraMove,
        EventKind::CameraMoveEnd,
        EventKind::DragStart,
        EventKind::Drag,
        EventKind::DragEnd,
    ];

    /// Engine event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Load => "load",
            EventKind::PointClick => "point_click",
            EventKind::ClusterClick => "cluster_click",
            EventKind::CameraMove => "move",
            EventKind::CameraMoveEnd => "moveend",
            EventKind::DragStart => "dragstart",
            EventKind::Drag => "drag",
            EventKind::DragEnd => "dragend",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event raised by the map engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapEvent {
    /// Style and sources are ready
    Load,
    /// An unclustered point was clicked
    PointClick { id: PointId },
    /// A cluster was clicked
    ClusterClick { cluster_id: u64, center: Coordinate },
    /// The camera moved (fires continuously during pans and animations)
    CameraMove { center: Coordinate, zoom: f64 },
    /// A camera movement finished
    CameraMoveEnd { center: Coordinate, zoom: f64 },
    /// The user grabbed the marker
    DragStart { position: Coordinate },
    /// The marker is being dragged
    Drag { position: Coordinate },
    /// The marker was dropped
    DragEnd { position: Coordinate },
}

impl MapEvent {
    /// Kind used for listener routing.
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::Load => EventKind::Load,
            MapEvent::PointClick { .. } => EventKind::PointClick,
            MapEvent::ClusterClick { .. } => EventKind::ClusterClick,
            MapEvent::CameraMove { .. } => EventKind::CameraMove,
            MapEvent::CameraMoveEnd { .. } => EventKind::CameraMoveEnd,
            MapEvent::DragStart { .. } => EventKind::DragStart,
            MapEvent::Drag { .. } => EventKind::Drag,
            MapEvent::DragEnd { .. } => EventKind::DragEnd,
        }
    }
}

/// Handle of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
