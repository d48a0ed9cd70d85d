//! # FreePark Core
//!
//! Core types, error handling, and configuration for the FreePark map
//! controller.
//!
//! - **Types**: `Coordinate`, `ParkingPoint`, `PointId`, `Bounds`, `Camera`,
//!   `Padding` and `ZoomLevel`.
//! - **Errors**: the error taxonomy shared by every crate, split into
//!   contract violations and user-facing conditions.
//! - **Configuration**: YAML/environment configuration with validation.
//!
//! ## Example
//!
//! ```
//! use freepark_core::config::AppConfig;
//! use freepark_core::types::{Coordinate, ParkingPoint};
//!
//! let config = AppConfig::default();
//! assert!(config.validate().is_ok());
//!
//! let point = ParkingPoint::new(1, Coordinate::new(18.64, 54.36)).with_votes(4, 1);
//! assert_eq!(point.score_label(), "+3");
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, ClusterConfig, MapConfig};
pub use error::{FreeParkError, Result};
pub use types::{Bounds, Camera, Coordinate, Padding, ParkingPoint, PointId, ZoomLevel};
