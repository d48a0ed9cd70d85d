//! # freepark-map
//!
//! The map page of FreePark, independent of any particular rendering engine.
//!
//! - [`surface`]: lifecycle of one native map instance, camera commands and
//!   the listener registry
//! - [`layers`]: GeoJSON sources and style layers (points, geofence radius,
//!   connecting line, target marker)
//! - [`marker`]: the draggable placement marker and its collision checks
//! - [`facade`]: page-level state, workflows and event routing
//!
//! Engines plug in through the [`MapBackend`] trait. [`HeadlessMap`] is an
//! in-process backend used by the CLI and tests.
//!
//! ## Example
//!
//! ```
//! use freepark_core::config::AppConfig;
//! use freepark_map::{Collaborators, HeadlessMap, IconImage, MapStateFacade, StyleDocument};
//!
//! let config = AppConfig::default();
//! let icons = config
//!     .map
//!     .icons
//!     .iter()
//!     .map(|name| IconImage::new(name.as_str(), vec![0u8; 4]))
//!     .collect();
//!
//! let mut facade = MapStateFacade::new(config, Collaborators::in_memory(Vec::new()));
//! facade
//!     .initialize(HeadlessMap::new(), StyleDocument::empty("freepark"), icons)
//!     .unwrap();
//! facade.pump().unwrap();
//! assert!(facade.state().map_loaded);
//! ```

pub mod backend;
pub mod camera_store;
pub mod collaborators;
pub mod event;
pub mod facade;
pub mod headless;
pub mod layers;
pub mod marker;
pub mod surface;

pub use backend::{IconImage, MapBackend, MapOptions, StyleDocument};
pub use camera_store::{open_camera_store, CameraStore, JsonFileCameraStore, MemoryCameraStore};
pub use collaborators::{
    Collaborators, FixedGeocoder, Geocoder, InMemoryRepository, NoopGeocoder, PointRepository,
    PointSource, StaticPointSource,
};
pub use event::{EventKind, ListenerId, MapEvent};
pub use facade::{InteractionMode, MapStateFacade, MapViewState, Submission, SubmissionKind};
pub use headless::{HeadlessMap, HeadlessProbe};
pub use layers::{LayerId, LayerStore, RadiusCircle};
pub use marker::{CollisionState, InteractionSettings, MarkerInteractionController, MarkerState};
pub use surface::{MapSurface, SurfaceOptions, ZoomSettings};
