//! Screen-space clustering of parking points.
//!
//! Clusters are built bottom-up, the way vector map engines aggregate a
//! clustered source: every point starts as its own node at `max_zoom`, and at
//! each zoom level down to the requested one nodes are merged into weighted
//! clusters. Two nodes merge when their centers lie within `radius_px` of each
//! other, or when all of their members fit inside one circle of `radius_px`.
//! A cluster at a given zoom is therefore always a union of the clusters one
//! level above it, and any group of points that fits in a `radius_px` circle
//! ends up as one cluster.

use crate::projection::{project, unproject, PixelPoint};
use freepark_core::config::ClusterConfig;
use freepark_core::types::{Coordinate, PointId};
use std::collections::HashMap;
use tracing::trace;

// Absorbs projection round-off for points sitting on a circle's rim.
const RIM_TOLERANCE: f64 = 1e-9;

/// An aggregate of nearby points.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Stable for a given input order and zoom
    pub id: u64,
    /// Mean position of the members
    pub center: Coordinate,
    /// Member point ids in input order
    pub members: Vec<PointId>,
}

impl Cluster {
    pub fn point_count(&self) -> usize {
        self.members.len()
    }
}

/// One rendered item of the points layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterNode {
    /// A point drawn on its own
    Point { id: PointId, location: Coordinate },
    /// Several points drawn as one marker
    Cluster(Cluster),
}

/// Index over the current point list.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    entries: Vec<(PointId, Coordinate)>,
    max_zoom: u8,
    radius_px: f64,
}

impl ClusterIndex {
    /// Creates an empty index.
    pub fn new(max_zoom: u8, radius_px: f64) -> Self {
        Self {
            entries: Vec::new(),
            max_zoom,
            radius_px,
        }
    }

    /// Creates an empty index from configuration.
    pub fn from_config(config: &ClusterConfig) -> Self {
        Self::new(config.max_zoom, config.radius_px)
    }

    /// Replaces the indexed points.
    pub fn load<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (PointId, Coordinate)>,
    {
        self.entries = entries.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if points aggregate at this zoom.
    pub fn clusters_at_zoom(&self, zoom: f64) -> bool {
        zoom.floor() <= f64::from(self.max_zoom)
    }

    /// Computes the rendered items at `zoom`.
    pub fn nodes(&self, zoom: f64) -> Vec<ClusterNode> {
        if !self.clusters_at_zoom(zoom) || self.entries.len() < 2 {
            return self.singles();
        }

        let target = zoom.floor().max(0.0) as u8;
        // Zoom 0 world pixels; a distance at zoom z is this one times 2^z
        let pixels: Vec<PixelPoint> = self
            .entries
            .iter()
            .map(|(_, coord)| project(*coord, 0.0))
            .collect();

        let mut nodes: Vec<Node> = pixels
            .iter()
            .enumerate()
            .map(|(index, &pixel)| Node::single(index, pixel))
            .collect();

        for z in (target..=self.max_zoom).rev() {
            let radius = self.radius_px / 2f64.powi(i32::from(z));
            loop {
                let (merged, changed) = self.merge_pass(nodes, &pixels, radius);
                nodes = merged;
                if !changed {
                    break;
                }
            }
        }

        let mut ordered = nodes;
        ordered.sort_by_key(|node| node.first);
        ordered
            .into_iter()
            .map(|node| self.render(node, target))
            .collect()
    }

    fn singles(&self) -> Vec<ClusterNode> {
        self.entries
            .iter()
            .map(|&(id, location)| ClusterNode::Point { id, location })
            .collect()
    }

    // One sweep over the nodes, heaviest first. Returns the new node list and
    // whether anything merged.
    fn merge_pass(&self, nodes: Vec<Node>, pixels: &[PixelPoint], radius: f64) -> (Vec<Node>, bool) {
        let cell = 2.0 * radius;
        let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            grid.entry(cell_of(node.center(), cell)).or_default().push(i);
        }

        let mut order: Vec<usize> = (0..nodes.len()).collect();
        order.sort_by(|&a, &b| nodes[a].rank(&nodes[b]));

        let mut absorbed = vec![false; nodes.len()];
        let mut out = Vec::with_capacity(nodes.len());
        let mut changed = false;

        for &i in &order {
            if absorbed[i] {
                continue;
            }
            absorbed[i] = true;
            let mut cluster = nodes[i].clone();

            let (cx, cy) = cell_of(nodes[i].center(), cell);
            let mut candidates: Vec<usize> = (-1..=1)
                .flat_map(|dx| (-1..=1).map(move |dy| (cx + dx, cy + dy)))
                .filter_map(|key| grid.get(&key))
                .flatten()
                .copied()
                .filter(|&j| !absorbed[j])
                .collect();
            candidates.sort_by(|&a, &b| nodes[a].rank(&nodes[b]));

            for j in candidates {
                if absorbed[j] {
                    continue;
                }
                let other = &nodes[j];
                let distance = cluster.center().distance(other.center());
                let joins = distance <= radius
                    || (distance <= 2.0 * radius && fits_in_circle(&cluster, other, pixels, radius));
                if joins {
                    absorbed[j] = true;
                    cluster.absorb(other);
                    changed = true;
                }
            }
            out.push(cluster);
        }

        (out, changed)
    }

    fn render(&self, node: Node, zoom: u8) -> ClusterNode {
        if node.members.len() == 1 {
            let (id, location) = self.entries[node.first];
            return ClusterNode::Point { id, location };
        }

        let center = node.center();
        let mut members = node.members;
        members.sort_unstable();
        let cluster = Cluster {
            id: ((node.first as u64) << 5) + u64::from(zoom) + 1,
            center: unproject(center, 0.0),
            members: members.iter().map(|&m| self.entries[m].0).collect(),
        };
        trace!(cluster_id = cluster.id, point_count = cluster.point_count(), zoom, "Cluster formed");
        ClusterNode::Cluster(cluster)
    }
}

/// A point or cluster during aggregation.
#[derive(Debug, Clone)]
struct Node {
    sum_x: f64,
    sum_y: f64,
    /// Entry indices
    members: Vec<usize>,
    /// Smallest entry index, used for ids and ordering
    first: usize,
}

impl Node {
    fn single(index: usize, pixel: PixelPoint) -> Self {
        Self {
            sum_x: pixel.x,
            sum_y: pixel.y,
            members: vec![index],
            first: index,
        }
    }

    fn weight(&self) -> usize {
        self.members.len()
    }

    fn center(&self) -> PixelPoint {
        let n = self.weight() as f64;
        PixelPoint::new(self.sum_x / n, self.sum_y / n)
    }

    fn absorb(&mut self, other: &Node) {
        self.sum_x += other.sum_x;
        self.sum_y += other.sum_y;
        self.members.extend_from_slice(&other.members);
        self.first = self.first.min(other.first);
    }

    // Heavier first, then input order.
    fn rank(&self, other: &Node) -> std::cmp::Ordering {
        other
            .weight()
            .cmp(&self.weight())
            .then(self.first.cmp(&other.first))
    }
}

fn cell_of(point: PixelPoint, cell: f64) -> (i64, i64) {
    ((point.x / cell).floor() as i64, (point.y / cell).floor() as i64)
}

fn fits_in_circle(a: &Node, b: &Node, pixels: &[PixelPoint], radius: f64) -> bool {
    let points: Vec<PixelPoint> = a
        .members
        .iter()
        .chain(&b.members)
        .map(|&i| pixels[i])
        .collect();

    let (min_x, max_x, min_y, max_y) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(min_x, max_x, min_y, max_y), p| (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y)),
    );
    let limit = radius * (1.0 + RIM_TOLERANCE);
    if max_x - min_x > 2.0 * limit || max_y - min_y > 2.0 * limit {
        return false;
    }

    enclosing_circle(&points).1 <= limit
}

/// Smallest circle containing every point, as `(center, radius)`.
fn enclosing_circle(points: &[PixelPoint]) -> (PixelPoint, f64) {
    let Some(&first) = points.first() else {
        return (PixelPoint::new(0.0, 0.0), 0.0);
    };

    let mut circle = (first, 0.0);
    let outside = |circle: (PixelPoint, f64), p: PixelPoint| p.distance(circle.0) > circle.1 * (1.0 + RIM_TOLERANCE);

    for i in 1..points.len() {
        if !outside(circle, points[i]) {
            continue;
        }
        circle = (points[i], 0.0);
        for j in 0..i {
            if !outside(circle, points[j]) {
                continue;
            }
            circle = circle_on(points[i], points[j]);
            for k in 0..j {
                if outside(circle, points[k]) {
                    circle = circle_through(points[i], points[j], points[k]);
                }
            }
        }
    }
    circle
}

fn circle_on(a: PixelPoint, b: PixelPoint) -> (PixelPoint, f64) {
    let center = PixelPoint::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
    (center, a.distance(b) / 2.0)
}

// Circumcircle; collinear points fall back to the widest pair.
fn circle_through(a: PixelPoint, b: PixelPoint, c: PixelPoint) -> (PixelPoint, f64) {
    let (bx, by) = (b.x - a.x, b.y - a.y);
    let (cx, cy) = (c.x - a.x, c.y - a.y);
    let d = 2.0 * (bx * cy - by * cx);
    if d.abs() < f64::EPSILON {
        return [circle_on(a, b), circle_on(a, c), circle_on(b, c)]
            .into_iter()
            .fold((a, 0.0), |widest, candidate| if candidate.1 > widest.1 { candidate } else { widest });
    }

    let b2 = bx * bx + by * by;
    let c2 = cx * cx + cy * cy;
    let ux = (cy * b2 - by * c2) / d;
    let uy = (bx * c2 - cx * b2) / d;
    (PixelPoint::new(a.x + ux, a.y + uy), ux.hypot(uy))
}

/// Short label for a cluster size: `42`, `1.5k`, `12k`.
pub fn abbreviate_count(count: usize) -> String {
    if count >= 10_000 {
        format!("{}k", (count as f64 / 1000.0).round())
    } else if count >= 1000 {
        format!("{}k", (count as f64 / 100.0).round() / 10.0)
    } else {
        count.to_string()
    }
}
