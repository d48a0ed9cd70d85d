//! Error types for the FreePark map controller.
//!
//! Errors fall into two groups. Contract violations (`StateError`,
//! `GeometryError`, `MapInitError`) indicate a caller bug or a broken
//! environment and are meant to fail loudly. `CollisionError` and `EditError`
//! are the expected, recoverable conditions that the UI turns into a friendly
//! message. All errors are serializable so they can be handed to a UI layer
//! as structured data.

use crate::types::Coordinate;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias using FreeParkError as the error type.
pub type Result<T> = std::result::Result<T, FreeParkError>;

/// Top-level error type for all FreePark operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum FreeParkError {
    /// Map surface initialization failed
    #[error("Map initialization error: {0}")]
    MapInit(#[from] MapInitError),

    /// Operation called in the wrong interaction state
    #[error("Invalid state: {0}")]
    State(#[from] StateError),

    /// Malformed geometry input
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Position overlaps an existing point's geofence
    #[error("{0}")]
    Collision(#[from] CollisionError),

    /// Edit workflow rejected the position or point
    #[error("{0}")]
    Edit(#[from] EditError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failure reported by an external collaborator
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

impl FreeParkError {
    /// Returns true for the recoverable conditions the UI shows to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, FreeParkError::Collision(_) | FreeParkError::Edit(_))
    }

    /// Returns true if this error signals misuse of the API.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, FreeParkError::State(_) | FreeParkError::Geometry(_))
    }
}

/// Errors raised while creating the map surface.
///
/// Initialization is all-or-nothing: when any of these is returned no surface
/// exists and the caller retries from scratch.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum MapInitError {
    /// Viewport or restriction bounds are malformed
    #[error("Invalid bounds: {reason}")]
    InvalidBounds { reason: String },

    /// The native map could not be created
    #[error("Failed to create map in container '{container_id}': {reason}")]
    CreateFailed { container_id: String, reason: String },

    /// The style document could not be loaded
    #[error("Failed to load map style: {reason}")]
    StyleLoadFailed { reason: String },

    /// A required icon image could not be registered
    #[error("Failed to load icon '{name}': {reason}")]
    IconLoadFailed { name: String, reason: String },
}

impl MapInitError {
    /// Creates a style load failure.
    pub fn style(reason: impl Into<String>) -> Self {
        Self::StyleLoadFailed {
            reason: reason.into(),
        }
    }

    /// Creates an icon load failure.
    pub fn icon(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IconLoadFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid bounds error.
    pub fn bounds(reason: impl Into<String>) -> Self {
        Self::InvalidBounds {
            reason: reason.into(),
        }
    }
}

/// Operations invoked in a state that does not allow them.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum StateError {
    /// Operation requires a different interaction state
    #[error("'{operation}' is not allowed while {state}")]
    InvalidState { operation: String, state: String },

    /// The map has not fired its load event yet
    #[error("'{operation}' requires a loaded map")]
    MapNotLoaded { operation: String },

    /// The map surface was destroyed or never created
    #[error("'{operation}' requires an initialized map surface")]
    SurfaceUnavailable { operation: String },
}

impl StateError {
    /// Creates an invalid state error.
    pub fn invalid(operation: impl Into<String>, state: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }

    /// Creates a map-not-loaded error.
    pub fn not_loaded(operation: impl Into<String>) -> Self {
        Self::MapNotLoaded {
            operation: operation.into(),
        }
    }

    /// Creates a surface-unavailable error.
    pub fn no_surface(operation: impl Into<String>) -> Self {
        Self::SurfaceUnavailable {
            operation: operation.into(),
        }
    }
}

/// Malformed numeric input to geometry functions.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum GeometryError {
    /// Coordinate is NaN, infinite or outside WGS84 range
    #[error("Invalid coordinate: lng={lng}, lat={lat}")]
    InvalidCoordinate { lng: f64, lat: f64 },

    /// Radius is negative or not finite
    #[error("Invalid radius: {radius}")]
    InvalidRadius { radius: f64 },

    /// Any other out-of-range parameter
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl GeometryError {
    /// Creates an invalid coordinate error.
    pub fn invalid_coordinate(coord: Coordinate) -> Self {
        Self::InvalidCoordinate {
            lng: coord.lng,
            lat: coord.lat,
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The marker's geofence overlaps an existing point.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Position {position} is too close to an existing parking point")]
pub struct CollisionError {
    /// Position the user tried to confirm
    pub position: Coordinate,
    /// First rendered point found inside the geofence
    pub colliding_with: Option<Coordinate>,
}

/// Recoverable failures of the edit-position workflow.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum EditError {
    /// Marker moved farther from the original location than allowed
    #[error("New location is {distance_m:.0} m from the original, limit is {max_m:.0} m")]
    EditDistanceExceeded { distance_m: f64, max_m: f64 },

    /// No rendered point has the requested id
    #[error("Parking point {id} not found")]
    PointNotFound { id: i64 },
}

/// Errors related to configuration.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation failed error.
    pub fn validation_failed(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }
}

/// Failures reported by the collaborators the map core calls out to.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum CollaboratorError {
    /// Point data source failed
    #[error("Failed to fetch parking points: {reason}")]
    PointSource { reason: String },

    /// Reverse geocoding failed
    #[error("Reverse geocoding failed: {reason}")]
    Geocoding { reason: String },

    /// Saving a point failed
    #[error("Failed to persist parking point: {reason}")]
    Persistence { reason: String },

    /// Local key-value storage failed
    #[error("Storage error: {reason}")]
    Storage { reason: String },
}

impl CollaboratorError {
    pub fn point_source(reason: impl Into<String>) -> Self {
        Self::PointSource {
            reason: reason.into(),
        }
    }

    pub fn geocoding(reason: impl Into<String>) -> Self {
        Self::Geocoding {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        Self::Persistence {
            reason: reason.into(),
        }
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }
}

/// Wrapper for I/O errors to make them serializable.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct IoError {
    pub kind: String,
    pub message: String,
}

impl From<io::Error> for IoError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for FreeParkError {
    fn from(err: io::Error) -> Self {
        FreeParkError::Io(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_is_user_facing() {
        let err: FreeParkError = CollisionError {
            position: Coordinate::new(18.64, 54.36),
            colliding_with: Some(Coordinate::new(18.64, 54.36)),
        }
        .into();
        assert!(err.is_user_facing());
        assert!(!err.is_programming_error());
    }

    #[test]
    fn test_state_error_is_programming_error() {
        let err: FreeParkError = StateError::invalid("activate", "interactive").into();
        assert!(err.is_programming_error());
        assert!(!err.is_user_facing());
        assert_eq!(
            err.to_string(),
            "Invalid state: 'activate' is not allowed while interactive"
        );
    }

    #[test]
    fn test_geometry_error_helpers() {
        let err = GeometryError::invalid_coordinate(Coordinate::new(f64::NAN, 1.0));
        assert!(matches!(err, GeometryError::InvalidCoordinate { .. }));

        let err = GeometryError::invalid_value("steps", "must be at least 3");
        assert!(err.to_string().contains("steps"));
    }

    #[test]
    fn test_error_serialization() {
        let err = FreeParkError::MapInit(MapInitError::icon("parking", "decode failed"));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("MapInit"));
        assert!(json.contains("parking"));
    }

    #[test]
    fn test_edit_distance_message() {
        let err = EditError::EditDistanceExceeded {
            distance_m: 142.4,
            max_m: 100.0,
        };
        assert_eq!(
            err.to_string(),
            "New location is 142 m from the original, limit is 100 m"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: FreeParkError = io_err.into();
        assert!(matches!(err, FreeParkError::Io(_)));
    }
}
