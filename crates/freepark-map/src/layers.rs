//! GeoJSON layers of the map.
//!
//! Every named layer is backed by one GeoJSON source whose data is replaced
//! as a whole on each update, so repeating an update yields the same state.
//! Point features carry only the properties the style needs; the full
//! [`ParkingPoint`] records stay in a side table keyed by [`PointId`].

use crate::backend::MapBackend;
use crate::surface::MapSurface;
use freepark_core::config::ClusterConfig;
use freepark_core::types::{Coordinate, ParkingPoint, PointId};
use freepark_geo::cluster::{abbreviate_count, Cluster, ClusterIndex, ClusterNode};
use freepark_geo::geometry::{distance_meters, polygon_ring, GeoResult};
use freepark_geo::Polygon;
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Named layers managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerId {
    /// Parking points and clusters
    Points,
    /// Geofence around the interactive marker
    Radius,
    /// Line from the original location to the marker while editing
    ConnectingLine,
    /// Searched address
    TargetMarker,
}

impl LayerId {
    pub const ALL: [LayerId; 4] = [
        LayerId::Points,
        LayerId::Radius,
        LayerId::ConnectingLine,
        LayerId::TargetMarker,
    ];

    /// Id of the GeoJSON source backing this layer.
    pub fn source_id(&self) -> &'static str {
        match self {
            LayerId::Points => "points",
            LayerId::Radius => "radius",
            LayerId::ConnectingLine => "connecting-line",
            LayerId::TargetMarker => "target-marker",
        }
    }

    /// Style layers drawing this source.
    pub fn style_layers(&self) -> Vec<Value> {
        let source = self.source_id();
        match self {
            LayerId::Points => vec![
                json!({
                    "id": "clusters",
                    "type": "circle",
                    "source": source,
                    "filter": ["has", "point_count"],
                    "paint": {
                        "circle-color": "#1e88e5",
                        "circle-radius": ["get", "cluster_radius"],
                        "circle-stroke-width": 2,
                        "circle-stroke-color": "#ffffff"
                    }
                }),
                json!({
                    "id": "cluster-count",
                    "type": "symbol",
                    "source": source,
                    "filter": ["has", "point_count"],
                    "layout": {
                        "text-field": ["get", "point_count_abbreviated"],
                        "text-size": 14
                    },
                    "paint": { "text-color": "#ffffff" }
                }),
                json!({
                    "id": "unclustered-point",
                    "type": "symbol",
                    "source": source,
                    "filter": ["!", ["has", "point_count"]],
                    "layout": {
                        "icon-image": [
                            "case",
                            ["get", "hasEditLocationProposal"], "parking-proposal",
                            ["get", "isVerified"], "parking-verified",
                            "parking"
                        ],
                        "icon-allow-overlap": true,
                        "text-field": ["get", "scoreLabel"],
                        "text-offset": [0, 1.4],
                        "text-size": 12
                    }
                }),
            ],
            LayerId::Radius => vec![json!({
                "id": "radius-fill",
                "type": "fill",
                "source": source,
                "paint": {
                    "fill-color": ["case", ["get", "isColliding"], "#e53935", "#43a047"],
                    "fill-opacity": 0.25
                }
            })],
            LayerId::ConnectingLine => vec![
                json!({
                    "id": "connecting-line",
                    "type": "line",
                    "source": source,
                    "paint": {
                        "line-color": ["case", ["get", "isColliding"], "#e53935", "#1e88e5"],
                        "line-width": 2,
                        "line-dasharray": [2, 2]
                    }
                }),
                json!({
                    "id": "connecting-line-label",
                    "type": "symbol",
                    "source": source,
                    "layout": {
                        "symbol-placement": "line-center",
                        "text-field": ["get", "distanceLabel"],
                        "text-size": 12
                    }
                }),
            ],
            LayerId::TargetMarker => vec![json!({
                "id": "target-marker",
                "type": "symbol",
                "source": source,
                "layout": {
                    "icon-image": "target",
                    "icon-allow-overlap": true
                }
            })],
        }
    }
}

/// A geofence circle to draw on the radius layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusCircle {
    pub polygon: Polygon<f64>,
    pub is_colliding: bool,
}

/// Owner of the data pushed to every layer.
#[derive(Debug, Clone)]
pub struct LayerStore {
    cluster: ClusterConfig,
    index: ClusterIndex,
    points: HashMap<PointId, ParkingPoint>,
    collections: BTreeMap<LayerId, FeatureCollection>,
    points_zoom: Option<i64>,
}

impl LayerStore {
    pub fn new(cluster: ClusterConfig) -> Self {
        Self {
            index: ClusterIndex::from_config(&cluster),
            cluster,
            points: HashMap::new(),
            collections: BTreeMap::new(),
            points_zoom: None,
        }
    }

    /// Adds every source and its style layers to the map, then pushes the
    /// points loaded so far.
    pub fn register<B: MapBackend>(&mut self, surface: &mut MapSurface<B>) -> bool {
        if surface.is_destroyed() {
            return false;
        }

        for layer in LayerId::ALL {
            surface.add_source(layer.source_id(), &empty_collection());
            for style_layer in layer.style_layers() {
                surface.add_layer(&style_layer);
            }
            self.collections.insert(layer, empty_collection());
        }

        info!(points = self.points.len(), "Map layers registered");
        self.push_points(surface)
    }

    /// Removes style layers and sources from the map.
    pub fn unregister<B: MapBackend>(&mut self, surface: &mut MapSurface<B>) {
        for layer in LayerId::ALL {
            for style_layer in layer.style_layers() {
                if let Some(id) = style_layer.get("id").and_then(Value::as_str) {
                    surface.remove_layer(id);
                }
            }
            surface.remove_source(layer.source_id());
        }
        self.collections.clear();
        self.points_zoom = None;
    }

    /// Returns true if the layer's source exists on the map.
    pub fn is_registered<B: MapBackend>(&self, surface: &MapSurface<B>, layer: LayerId) -> bool {
        surface.has_source(layer.source_id())
    }

    /// Replaces the point list without touching the map.
    pub fn load_points(&mut self, points: &[ParkingPoint]) {
        self.points = points.iter().map(|p| (p.id, p.clone())).collect();
        self.index.load(points.iter().map(|p| (p.id, p.location)));
    }

    /// Replaces the point list and pushes it for the current zoom.
    pub fn set_points<B: MapBackend>(&mut self, surface: &mut MapSurface<B>, points: &[ParkingPoint]) -> bool {
        self.load_points(points);
        self.push_points(surface)
    }

    /// Re-clusters the points if the integer zoom changed since the last push.
    pub fn refresh_points<B: MapBackend>(&mut self, surface: &mut MapSurface<B>) -> bool {
        let zoom = surface.camera().zoom.floor() as i64;
        if self.points_zoom == Some(zoom) {
            return false;
        }
        self.push_points(surface)
    }

    fn push_points<B: MapBackend>(&mut self, surface: &mut MapSurface<B>) -> bool {
        let zoom = surface.camera().zoom;
        let collection = self.points_collection(zoom);
        let pushed = self.push(surface, LayerId::Points, collection);
        if pushed {
            self.points_zoom = Some(zoom.floor() as i64);
        }
        pushed
    }

    /// Builds the points layer as rendered at `zoom`.
    pub fn points_collection(&self, zoom: f64) -> FeatureCollection {
        let features = self
            .index
            .nodes(zoom)
            .iter()
            .filter_map(|node| match node {
                ClusterNode::Point { id, .. } => self.points.get(id).map(point_feature),
                ClusterNode::Cluster(cluster) => Some(cluster_feature(cluster, &self.cluster)),
            })
            .collect();
        collection(features)
    }

    /// Replaces the radius layer. An empty slice clears it.
    pub fn set_radius<B: MapBackend>(&mut self, surface: &mut MapSurface<B>, circles: &[RadiusCircle]) -> bool {
        let features = circles
            .iter()
            .map(|circle| {
                let ring = polygon_ring(&circle.polygon)
                    .iter()
                    .map(Coordinate::to_position)
                    .collect();
                let mut properties = JsonObject::new();
                properties.insert("isColliding".to_string(), json!(circle.is_colliding));
                feature(geojson::Value::Polygon(vec![ring]), None, properties)
            })
            .collect();
        self.push(surface, LayerId::Radius, collection(features))
    }

    /// Draws a line between two coordinates, or clears it if either is absent.
    pub fn set_connecting_line<B: MapBackend>(
        &mut self,
        surface: &mut MapSurface<B>,
        from: Option<Coordinate>,
        to: Option<Coordinate>,
        is_colliding: bool,
    ) -> GeoResult<bool> {
        let features = match (from, to) {
            (Some(from), Some(to)) => {
                let distance = distance_meters(from, to)?.round() as i64;
                let mut properties = JsonObject::new();
                properties.insert("distanceMeters".to_string(), json!(distance));
                properties.insert("distanceLabel".to_string(), json!(format!("{} m", distance)));
                properties.insert("isColliding".to_string(), json!(is_colliding));
                let line = geojson::Value::LineString(vec![from.to_position(), to.to_position()]);
                vec![feature(line, None, properties)]
            }
            _ => Vec::new(),
        };
        Ok(self.push(surface, LayerId::ConnectingLine, collection(features)))
    }

    /// Shows the target marker at `coord`, or clears it.
    pub fn set_target_marker<B: MapBackend>(&mut self, surface: &mut MapSurface<B>, coord: Option<Coordinate>) -> bool {
        let features = coord
            .map(|c| feature(geojson::Value::Point(c.to_position()), None, JsonObject::new()))
            .into_iter()
            .collect();
        self.push(surface, LayerId::TargetMarker, collection(features))
    }

    /// Clears the radius and connecting-line layers.
    pub fn clear_interaction_layers<B: MapBackend>(&mut self, surface: &mut MapSurface<B>) {
        self.set_radius(surface, &[]);
        self.push(surface, LayerId::ConnectingLine, empty_collection());
    }

    /// Data last pushed to `layer`.
    pub fn collection(&self, layer: LayerId) -> Option<&FeatureCollection> {
        self.collections.get(&layer)
    }

    /// Looks up a point in the side table.
    pub fn point(&self, id: PointId) -> Option<&ParkingPoint> {
        self.points.get(&id)
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    fn push<B: MapBackend>(&mut self, surface: &mut MapSurface<B>, layer: LayerId, data: FeatureCollection) -> bool {
        if !surface.set_source_data(layer.source_id(), &data) {
            debug!(source = layer.source_id(), "Source not registered, skipping update");
            return false;
        }
        self.collections.insert(layer, data);
        true
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn empty_collection() -> FeatureCollection {
    collection(Vec::new())
}

fn feature(value: geojson::Value, id: Option<Id>, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn point_feature(point: &ParkingPoint) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), json!(point.id.get()));
    properties.insert("score".to_string(), json!(point.score()));
    properties.insert("scoreLabel".to_string(), json!(point.score_label()));
    properties.insert("isVerified".to_string(), json!(point.is_verified));
    properties.insert(
        "hasEditLocationProposal".to_string(),
        json!(point.has_edit_location_proposal),
    );

    feature(
        geojson::Value::Point(point.location.to_position()),
        Some(Id::Number(point.id.get().into())),
        properties,
    )
}

fn cluster_feature(cluster: &Cluster, config: &ClusterConfig) -> Feature {
    let count = cluster.point_count();
    let radius = config.bucket_radius(u32::try_from(count).unwrap_or(u32::MAX));

    let mut properties = JsonObject::new();
    properties.insert("cluster".to_string(), json!(true));
    properties.insert("cluster_id".to_string(), json!(cluster.id));
    properties.insert("point_count".to_string(), json!(count));
    properties.insert("point_count_abbreviated".to_string(), json!(abbreviate_count(count)));
    properties.insert("cluster_radius".to_string(), json!(radius));

    feature(
        geojson::Value::Point(cluster.center.to_position()),
        Some(Id::Number(cluster.id.into())),
        properties,
    )
}
