//! freepark - inspect the FreePark map core from the command line
//!
//! Runs the map page against the headless backend so collision checks,
//! clustering and configuration can be examined without a browser.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use freepark_core::config::{AppConfig, LogFormat, LoggingConfig};
use freepark_core::types::{Coordinate, ParkingPoint, PointId, ZoomLevel};
use freepark_geo::geometry::{distance_meters, nearest};
use freepark_map::{
    open_camera_store, Collaborators, HeadlessMap, HeadlessProbe, IconImage, LayerId,
    MapStateFacade, StaticPointSource, StyleDocument,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// FreePark map core toolbox
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "FREEPARK_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file with the parking points to render
    #[arg(short, long)]
    points: Option<PathBuf>,

    /// Style document to load instead of the built-in empty style
    #[arg(long)]
    style: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place the marker at a location and report collisions
    Check {
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Move this existing point instead of adding a new one
        #[arg(long)]
        edit: Option<i64>,
    },

    /// Print the points layer as rendered at a zoom level
    Layers {
        #[arg(long)]
        zoom: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
    },

    /// Find the point closest to a location
    Nearest {
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    position: Coordinate,
    is_colliding: bool,
    colliding_with: Option<Coordinate>,
    nearest_distance_m: Option<f64>,
    distance_from_reference_m: Option<f64>,
    is_out_of_range: bool,
    can_confirm: bool,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NearestReport {
    point: ParkingPoint,
    distance_m: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    init_tracing(&config.logging)?;

    match &args.command {
        &Command::Config => print(args.output, &config),
        &Command::Nearest { lng, lat } => {
            let points = load_points(args.points.as_ref())?;
            let at = Coordinate::new(lng, lat);
            let coordinates: Vec<Coordinate> = points.iter().map(|p| p.location).collect();
            let Some(closest) = nearest(at, &coordinates).context("Invalid location")? else {
                bail!("No points loaded");
            };
            let distance_m = distance_meters(at, closest).context("Invalid location")?;
            let point = points
                .into_iter()
                .find(|p| p.location == closest)
                .context("Nearest point vanished")?;
            print(args.output, &NearestReport { point, distance_m })
        }
        &Command::Layers { zoom, lng, lat } => {
            let (mut facade, _probe) = open_map(&args, config).await?;
            let center = match (lng, lat) {
                (Some(lng), Some(lat)) => Coordinate::new(lng, lat),
                _ => facade.config().map.region.center(),
            };
            facade
                .jump_to(center, ZoomLevel::Level(zoom))
                .context("Failed to move the camera")?;
            facade.pump()?;

            let collection = facade
                .layers()
                .collection(LayerId::Points)
                .cloned()
                .context("Points layer is not registered")?;
            let result = print(args.output, &collection);
            facade.destroy();
            result
        }
        &Command::Check { lng, lat, edit } => {
            let (mut facade, probe) = open_map(&args, config).await?;
            let at = Coordinate::new(lng, lat);

            match edit {
                Some(id) => {
                    facade
                        .start_editing_position(PointId(id))
                        .with_context(|| format!("Cannot edit point {}", id))?;
                    facade.pump()?;
                    let from = facade.marker().current_position()?;
                    probe.drag(&[from, at]);
                }
                None => {
                    facade
                        .jump_to(at, ZoomLevel::Close)
                        .context("Failed to move the camera")?;
                    facade.pump()?;
                    facade.start_adding()?;
                }
            }
            facade.pump()?;

            let collision = facade.marker().collision().clone();
            let position = facade.marker().current_position()?;
            let confirmed = facade.confirm_current_position();
            let report = CheckReport {
                position,
                is_colliding: collision.is_colliding,
                colliding_with: collision.colliding_with,
                nearest_distance_m: collision.nearest_distance_m,
                distance_from_reference_m: collision.distance_from_reference_m,
                is_out_of_range: collision.is_out_of_range,
                can_confirm: confirmed.is_ok(),
                reason: confirmed.err().map(|e| e.to_string()),
            };

            let result = print(args.output, &report);
            facade.destroy();
            result
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_config_builder(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => AppConfig::default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let level = logging.parse_level()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    // Logs go to stderr so command output stays parseable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
    Ok(())
}

fn load_points(path: Option<&PathBuf>) -> Result<Vec<ParkingPoint>> {
    match path {
        Some(path) => {
            let source = StaticPointSource::from_json_file(path)
                .with_context(|| format!("Failed to load points: {:?}", path))?;
            Ok(source.points().to_vec())
        }
        None => {
            warn!("No points file given, rendering an empty map");
            Ok(Vec::new())
        }
    }
}

async fn open_map(args: &Args, config: AppConfig) -> Result<(MapStateFacade<HeadlessMap>, HeadlessProbe)> {
    let style = match &args.style {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read style: {:?}", path))?;
            StyleDocument::from_json(&json).context("Invalid style document")?
        }
        None => StyleDocument::empty("freepark"),
    };
    // The headless engine only checks that every icon has image data
    let icons: Vec<IconImage> = config
        .map
        .icons
        .iter()
        .map(|name| IconImage::new(name.as_str(), name.as_bytes().to_vec()))
        .collect();

    let points = load_points(args.points.as_ref())?;
    let collaborators =
        Collaborators::in_memory(points).with_camera_store(open_camera_store(&config.storage));

    let mut facade = MapStateFacade::new(config, collaborators);
    let map = HeadlessMap::new();
    let probe = map.probe();
    facade
        .initialize(map, style, icons)
        .context("Failed to initialize the map")?;
    facade.pump()?;

    let count = facade.refresh_points(true).await?;
    info!(count, "Map ready");
    Ok((facade, probe))
}

fn print<T: Serialize>(format: OutputFormat, value: &T) -> Result<()> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text);
    Ok(())
}
