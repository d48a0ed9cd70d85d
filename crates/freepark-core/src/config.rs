//! Configuration management for the FreePark map controller.
//!
//! Every tunable the map core uses is passed in through [`AppConfig`]; nothing
//! region- or style-specific is hardcoded in the controller. Configuration can
//! be loaded from YAML, merged with `FREEPARK__*` environment variables through
//! the `config` crate, and validated before use.

use crate::error::{ConfigError, Result};
use crate::types::{Bounds, Coordinate, Padding, ZoomLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use freepark_core::config::AppConfig;
///
/// let config = AppConfig::from_file("freepark.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Map viewport and interaction settings
    #[serde(default)]
    pub map: MapConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Local storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate, layering `FREEPARK__*`
    /// environment variables over the file.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("FREEPARK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.map.validate()?;
        self.logging.parse_level()?;
        Ok(())
    }
}

/// Map viewport, geofencing and interaction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Region the application is locked to; also the initial viewport
    #[serde(default = "default_region")]
    pub region: Bounds,

    /// Extra margin in degrees around the region the camera may pan into
    #[serde(default = "default_region_margin")]
    pub region_margin_deg: f64,

    /// Geofence radius around the interactive marker, in meters
    #[serde(default = "default_geofence_radius")]
    pub geofence_radius_m: f64,

    /// Vertices used to approximate geofence circles
    #[serde(default = "default_circle_steps")]
    pub circle_steps: usize,

    /// Point clustering
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Zoom level of the `close` preset
    #[serde(default = "default_close_zoom")]
    pub close_zoom: f64,

    /// Zoom level of the `far` preset
    #[serde(default = "default_far_zoom")]
    pub far_zoom: f64,

    /// Lowest zoom the camera may reach
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,

    /// Highest zoom the camera may reach
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,

    /// Speed factor for animated camera moves
    #[serde(default = "default_fly_speed")]
    pub fly_speed: f64,

    /// Radius visualization is hidden below this zoom
    #[serde(default = "default_min_zoom_to_show_radius")]
    pub min_zoom_to_show_radius: f64,

    /// How far a point may be moved in the edit-position workflow, in meters
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance_m: f64,

    /// Padding used when framing two coordinates
    #[serde(default)]
    pub fit_padding: Padding,

    /// Icon images the layers reference
    #[serde(default = "default_icons")]
    pub icons: Vec<String>,
}

fn default_region() -> Bounds {
    // Gdańsk, Sopot and Gdynia
    Bounds::new(Coordinate::new(18.35, 54.25), Coordinate::new(18.95, 54.65))
}

fn default_region_margin() -> f64 {
    0.1
}

fn default_geofence_radius() -> f64 {
    20.0
}

fn default_circle_steps() -> usize {
    64
}

fn default_close_zoom() -> f64 {
    17.0
}

fn default_far_zoom() -> f64 {
    12.0
}

fn default_min_zoom() -> f64 {
    9.0
}

fn default_max_zoom() -> f64 {
    20.0
}

fn default_fly_speed() -> f64 {
    1.2
}

fn default_min_zoom_to_show_radius() -> f64 {
    14.0
}

fn default_max_edit_distance() -> f64 {
    100.0
}

fn default_icons() -> Vec<String> {
    ["parking", "parking-verified", "parking-proposal", "target"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            region_margin_deg: default_region_margin(),
            geofence_radius_m: default_geofence_radius(),
            circle_steps: default_circle_steps(),
            cluster: ClusterConfig::default(),
            close_zoom: default_close_zoom(),
            far_zoom: default_far_zoom(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            fly_speed: default_fly_speed(),
            min_zoom_to_show_radius: default_min_zoom_to_show_radius(),
            max_edit_distance_m: default_max_edit_distance(),
            fit_padding: Padding::default(),
            icons: default_icons(),
        }
    }
}

impl MapConfig {
    /// Bounds the camera is restricted to: the region plus its margin.
    pub fn max_bounds(&self) -> Bounds {
        self.region.expand(self.region_margin_deg)
    }

    /// Resolves a zoom preset to a numeric level within the camera range.
    pub fn resolve_zoom(&self, zoom: ZoomLevel) -> f64 {
        let level = match zoom {
            ZoomLevel::Close => self.close_zoom,
            ZoomLevel::Far => self.far_zoom,
            ZoomLevel::Level(level) => level,
        };
        level.clamp(self.min_zoom, self.max_zoom)
    }

    /// Validates the map configuration.
    pub fn validate(&self) -> Result<()> {
        if !self.region.is_valid() {
            return Err(ConfigError::invalid_value(
                "map.region",
                "south_west must be below and left of north_east",
            )
            .into());
        }

        if !(self.region_margin_deg >= 0.0) {
            return Err(ConfigError::invalid_value(
                "map.region_margin_deg",
                "must be zero or positive",
            )
            .into());
        }

        if !(self.geofence_radius_m > 0.0) {
            return Err(
                ConfigError::invalid_value("map.geofence_radius_m", "must be positive").into(),
            );
        }

        if self.circle_steps < 3 {
            return Err(
                ConfigError::invalid_value("map.circle_steps", "must be at least 3").into(),
            );
        }

        if !(self.min_zoom < self.max_zoom) {
            return Err(ConfigError::validation_failed("min_zoom must be below max_zoom").into());
        }

        for (field, level) in [
            ("map.close_zoom", self.close_zoom),
            ("map.far_zoom", self.far_zoom),
            ("map.min_zoom_to_show_radius", self.min_zoom_to_show_radius),
        ] {
            if !(self.min_zoom..=self.max_zoom).contains(&level) {
                return Err(ConfigError::invalid_value(
                    field,
                    format!("must be between {} and {}", self.min_zoom, self.max_zoom),
                )
                .into());
            }
        }

        if self.far_zoom >= self.close_zoom {
            return Err(
                ConfigError::validation_failed("far_zoom must be below close_zoom").into(),
            );
        }

        if !(self.fly_speed > 0.0) {
            return Err(ConfigError::invalid_value("map.fly_speed", "must be positive").into());
        }

        if !(self.max_edit_distance_m > 0.0) {
            return Err(ConfigError::invalid_value(
                "map.max_edit_distance_m",
                "must be positive",
            )
            .into());
        }

        self.cluster.validate()
    }
}

/// Clustering of the points layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Points aggregate at this zoom and below
    #[serde(default = "default_cluster_max_zoom")]
    pub max_zoom: u8,

    /// Pixel radius within which points aggregate
    #[serde(default = "default_cluster_radius")]
    pub radius_px: f64,

    /// `point_count` thresholds between radius buckets, ascending
    #[serde(default = "default_count_thresholds")]
    pub count_thresholds: Vec<u32>,

    /// Rendered cluster radius per bucket; one more entry than thresholds
    #[serde(default = "default_bucket_radii")]
    pub bucket_radii: Vec<u32>,
}

fn default_cluster_max_zoom() -> u8 {
    14
}

fn default_cluster_radius() -> f64 {
    50.0
}

fn default_count_thresholds() -> Vec<u32> {
    vec![100, 750]
}

fn default_bucket_radii() -> Vec<u32> {
    vec![20, 30, 40]
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_zoom: default_cluster_max_zoom(),
            radius_px: default_cluster_radius(),
            count_thresholds: default_count_thresholds(),
            bucket_radii: default_bucket_radii(),
        }
    }
}

impl ClusterConfig {
    /// Returns the rendered radius bucket for a cluster of `count` points.
    pub fn bucket_radius(&self, count: u32) -> u32 {
        let bucket = self
            .count_thresholds
            .iter()
            .take_while(|threshold| count >= **threshold)
            .count();
        self.bucket_radii
            .get(bucket)
            .or_else(|| self.bucket_radii.last())
            .copied()
            .unwrap_or(0)
    }

    /// Validates the clustering configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.radius_px > 0.0) {
            return Err(
                ConfigError::invalid_value("map.cluster.radius_px", "must be positive").into(),
            );
        }

        if self.count_thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid_value(
                "map.cluster.count_thresholds",
                "must be strictly ascending",
            )
            .into());
        }

        if self.bucket_radii.len() != self.count_thresholds.len() + 1 {
            return Err(ConfigError::invalid_value(
                "map.cluster.bucket_radii",
                "must have one more entry than count_thresholds",
            )
            .into());
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Plain level name: `trace`, `debug`, `info`, `warn` or `error`.
    /// Per-target directives go in `RUST_LOG`, which overrides this.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                reason: format!("Invalid log level: {}", self.level),
            }
            .into()
        })
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
}

/// Local key-value storage used for best-effort camera persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// File backing the store; in-memory when absent
    #[serde(default)]
    pub camera_store_path: Option<PathBuf>,

    /// Key under which the last camera position is stored
    #[serde(default = "default_camera_key")]
    pub camera_key: String,
}

fn default_camera_key() -> String {
    "map.camera".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            camera_store_path: None,
            camera_key: default_camera_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.map.geofence_radius_m, 20.0);
        assert_eq!(config.map.cluster.max_zoom, 14);
        assert_eq!(config.map.cluster.radius_px, 50.0);
    }

    #[test]
    fn test_max_bounds_adds_margin() {
        let config = MapConfig::default();
        let max_bounds = config.max_bounds();
        assert!(max_bounds.contains_bounds(&config.region));
        assert!((max_bounds.south_west.lng - 18.25).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_zoom_presets() {
        let config = MapConfig::default();
        assert_eq!(config.resolve_zoom(ZoomLevel::Close), 17.0);
        assert_eq!(config.resolve_zoom(ZoomLevel::Far), 12.0);
        assert_eq!(config.resolve_zoom(ZoomLevel::Level(15.5)), 15.5);
        assert_eq!(config.resolve_zoom(ZoomLevel::Level(30.0)), 20.0);
    }

    #[test]
    fn test_bucket_radius() {
        let cluster = ClusterConfig::default();
        assert_eq!(cluster.bucket_radius(2), 20);
        assert_eq!(cluster.bucket_radius(99), 20);
        assert_eq!(cluster.bucket_radius(100), 30);
        assert_eq!(cluster.bucket_radius(150), 30);
        assert_eq!(cluster.bucket_radius(750), 40);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = MapConfig::default();
        config.geofence_radius_m = 0.0;
        assert!(config.validate().is_err());

        let mut config = MapConfig::default();
        config.circle_steps = 2;
        assert!(config.validate().is_err());

        let mut config = MapConfig::default();
        config.far_zoom = 18.0;
        assert!(config.validate().is_err());

        let mut config = MapConfig::default();
        config.cluster.bucket_radii = vec![20, 30];
        assert!(config.validate().is_err());

        let mut config = MapConfig::default();
        config.region = Bounds::new(Coordinate::new(19.0, 54.0), Coordinate::new(18.0, 55.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
map:
  region:
    south_west: { lng: 21.0, lat: 52.1 }
    north_east: { lng: 21.3, lat: 52.4 }
  geofence_radius_m: 30
  cluster:
    max_zoom: 13
    radius_px: 40

logging:
  level: debug
  format: json
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.map.geofence_radius_m, 30.0);
        assert_eq!(config.map.cluster.max_zoom, 13);
        assert_eq!(config.map.cluster.count_thresholds, vec![100, 750]);
        assert_eq!(config.map.close_zoom, 17.0);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_missing_file() {
        let err = AppConfig::from_file("/nonexistent/freepark.yaml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_logging_parse_level() {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            ..Default::default()
        };
        assert!(logging.parse_level().is_ok());

        let invalid = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };
        assert!(invalid.parse_level().is_err());
    }

    #[test]
    fn test_logging_level_rejects_filter_directives() {
        let upper = LoggingConfig {
            level: "WARN".to_string(),
            ..Default::default()
        };
        assert_eq!(upper.parse_level().unwrap(), Level::WARN);

        let directive = LoggingConfig {
            level: "freepark=debug".to_string(),
            ..Default::default()
        };
        let err = directive.parse_level().unwrap_err();
        assert!(err.to_string().contains("freepark=debug"));

        let config = AppConfig {
            logging: directive,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
