//! # freepark-geo
//!
//! Stateless geometry used by the FreePark map controller:
//!
//! - [`geometry`]: geofence circles, point-in-polygon, haversine distance and
//!   nearest-point search, built on the `geo` crate
//! - [`projection`]: Web-Mercator pixel projection and camera framing
//! - [`cluster`]: screen-space clustering of the points layer
//!
//! ## Example
//!
//! ```
//! use freepark_core::types::Coordinate;
//! use freepark_geo::geometry::{buffer_polygon, is_point_in_polygon};
//!
//! let marker = Coordinate::new(18.64, 54.36);
//! let geofence = buffer_polygon(marker, 20.0).unwrap();
//! assert!(is_point_in_polygon(marker, &geofence).unwrap());
//! ```

pub mod cluster;
pub mod geometry;
pub mod projection;

pub use cluster::{abbreviate_count, Cluster, ClusterIndex, ClusterNode};
pub use geometry::{
    buffer_polygon, circle_polygon, distance_meters, is_point_in_polygon, nearest, GeoResult,
    DEFAULT_CIRCLE_STEPS,
};
pub use projection::{fit_camera, project, unproject, PixelPoint};

// Re-export the polygon type used across the API
pub use geo::Polygon;
