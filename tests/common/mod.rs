//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use freepark_core::config::AppConfig;
use freepark_core::types::{Coordinate, ParkingPoint, ZoomLevel};
use freepark_map::{
    Collaborators, HeadlessMap, HeadlessProbe, IconImage, MapStateFacade, StaticPointSource,
    StyleDocument,
};
use std::path::PathBuf;

/// Długi Targ, Gdańsk
pub const OLD_TOWN: Coordinate = Coordinate::new(18.6466, 54.3520);

/// Get the path to test fixtures
pub fn fixtures_dir() -> PathBuf {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest_dir).join("tests").join("fixtures")
}

/// Load the fixture parking points
pub fn fixture_points() -> Vec<ParkingPoint> {
    let path = fixtures_dir().join("points.json");
    StaticPointSource::from_json_file(&path)
        .unwrap_or_else(|e| panic!("Failed to load points from {:?}: {}", path, e))
        .points()
        .to_vec()
}

/// Offsets `from` by the given distances in meters
pub fn offset_m(from: Coordinate, east_m: f64, north_m: f64) -> Coordinate {
    const METERS_PER_DEGREE: f64 = 111_195.0;
    let lat = from.lat + north_m / METERS_PER_DEGREE;
    let lng = from.lng + east_m / (METERS_PER_DEGREE * from.lat.to_radians().cos());
    Coordinate::new(lng, lat)
}

/// One placeholder image per configured icon
pub fn icons(config: &AppConfig) -> Vec<IconImage> {
    config
        .map
        .icons
        .iter()
        .map(|name| IconImage::new(name.as_str(), vec![0x89, 0x50, 0x4e, 0x47]))
        .collect()
}

/// Facade over a headless map that has fired its load event
pub fn loaded_facade(
    config: AppConfig,
    collaborators: Collaborators,
) -> (MapStateFacade<HeadlessMap>, HeadlessProbe) {
    let icons = icons(&config);
    let mut facade = MapStateFacade::new(config, collaborators);
    let map = HeadlessMap::new();
    let probe = map.probe();
    facade
        .initialize(map, StyleDocument::empty("test"), icons)
        .expect("Failed to initialize map");
    facade.pump().expect("Failed to pump load event");
    assert!(facade.state().map_loaded);
    (facade, probe)
}

/// Loaded facade showing `points`, with the camera at `center` on the close preset
pub fn facade_at(
    points: Vec<ParkingPoint>,
    center: Coordinate,
) -> (MapStateFacade<HeadlessMap>, HeadlessProbe) {
    let (mut facade, probe) = loaded_facade(AppConfig::default(), Collaborators::in_memory(Vec::new()));
    facade.apply_points(points).expect("Failed to apply points");
    facade
        .jump_to(center, ZoomLevel::Close)
        .expect("Failed to move camera");
    facade.pump().expect("Failed to pump camera events");
    (facade, probe)
}
