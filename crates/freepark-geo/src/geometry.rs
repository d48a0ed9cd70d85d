//! Geofencing geometry.
//!
//! Pure functions over WGS84 coordinates: circle polygons for buffer
//! visualization, point-in-polygon tests, great-circle distance and nearest
//! point search. Every function validates its input first and fails with
//! [`GeometryError`] instead of producing degenerate shapes.

use freepark_core::error::GeometryError;
use freepark_core::types::Coordinate;
use geo::{Coord, Destination, Distance, Haversine, Intersects, LineString, Point, Polygon};

/// Vertices used for geofence circles unless configured otherwise.
pub const DEFAULT_CIRCLE_STEPS: usize = 64;

/// Result alias for geometry operations.
pub type GeoResult<T> = Result<T, GeometryError>;

/// Converts a coordinate into a `geo` point (x = lng, y = lat).
pub fn to_point(coord: Coordinate) -> Point<f64> {
    Point::new(coord.lng, coord.lat)
}

/// Converts a `geo` point back into a coordinate.
pub fn from_point(point: Point<f64>) -> Coordinate {
    Coordinate::new(point.x(), point.y())
}

fn validate_radius(radius_meters: f64) -> GeoResult<()> {
    if radius_meters.is_finite() && radius_meters >= 0.0 {
        Ok(())
    } else {
        Err(GeometryError::InvalidRadius {
            radius: radius_meters,
        })
    }
}

/// Approximates a circle of `radius_meters` around `center` with `steps`
/// vertices placed at equal bearings.
pub fn circle_polygon(center: Coordinate, radius_meters: f64, steps: usize) -> GeoResult<Polygon<f64>> {
    center.validate()?;
    validate_radius(radius_meters)?;
    if steps < 3 {
        return Err(GeometryError::invalid_value(
            "steps",
            format!("a polygon needs at least 3 vertices, got {}", steps),
        ));
    }

    let origin = to_point(center);
    let ring: Vec<Coord<f64>> = (0..steps)
        .map(|i| {
            let bearing = 360.0 * i as f64 / steps as f64;
            Haversine.destination(origin, bearing, radius_meters).into()
        })
        .collect();

    // Polygon::new closes the ring.
    Ok(Polygon::new(LineString::new(ring), vec![]))
}

/// Geofence test shape around `center`.
pub fn buffer_polygon(center: Coordinate, radius_meters: f64) -> GeoResult<Polygon<f64>> {
    circle_polygon(center, radius_meters, DEFAULT_CIRCLE_STEPS)
}

/// Returns true if `p` lies inside or on the boundary of `polygon`.
pub fn is_point_in_polygon(p: Coordinate, polygon: &Polygon<f64>) -> GeoResult<bool> {
    p.validate()?;
    Ok(polygon.intersects(&to_point(p)))
}

/// Great-circle distance in meters.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> GeoResult<f64> {
    a.validate()?;
    b.validate()?;
    Ok(Haversine.distance(to_point(a), to_point(b)))
}

/// Returns the candidate closest to `from`, or `None` for an empty slice.
///
/// Ties keep the candidate that appears first.
pub fn nearest(from: Coordinate, candidates: &[Coordinate]) -> GeoResult<Option<Coordinate>> {
    from.validate()?;

    let mut best: Option<(Coordinate, f64)> = None;
    for &candidate in candidates {
        let distance = distance_meters(from, candidate)?;
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((candidate, distance));
        }
    }

    Ok(best.map(|(coord, _)| coord))
}

/// Exterior ring of a polygon as coordinates, closing vertex included.
pub fn polygon_ring(polygon: &Polygon<f64>) -> Vec<Coordinate> {
    polygon
        .exterior()
        .points()
        .map(from_point)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GDANSK: Coordinate = Coordinate::new(18.64, 54.36);

    #[test]
    fn test_circle_polygon_vertices() {
        let polygon = circle_polygon(GDANSK, 25.0, 64).unwrap();
        let ring = polygon_ring(&polygon);
        // 64 vertices plus the closing one
        assert_eq!(ring.len(), 65);
        assert_eq!(ring.first(), ring.last());

        for vertex in &ring {
            let d = distance_meters(GDANSK, *vertex).unwrap();
            assert!((d - 25.0).abs() < 0.01, "vertex at {} m", d);
        }
    }

    #[test]
    fn test_circle_polygon_rejects_bad_input() {
        assert!(matches!(
            circle_polygon(Coordinate::new(f64::NAN, 54.0), 20.0, 64),
            Err(GeometryError::InvalidCoordinate { .. })
        ));
        assert!(matches!(
            circle_polygon(GDANSK, -1.0, 64),
            Err(GeometryError::InvalidRadius { .. })
        ));
        assert!(matches!(
            circle_polygon(GDANSK, 20.0, 2),
            Err(GeometryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_point_in_buffer() {
        let buffer = buffer_polygon(GDANSK, 20.0).unwrap();
        assert!(is_point_in_polygon(GDANSK, &buffer).unwrap());
        // ~200 m east
        assert!(!is_point_in_polygon(Coordinate::new(18.643, 54.36), &buffer).unwrap());
    }

    #[test]
    fn test_point_in_polygon_rejects_nan() {
        let buffer = buffer_polygon(GDANSK, 20.0).unwrap();
        assert!(is_point_in_polygon(Coordinate::new(18.64, f64::NAN), &buffer).is_err());
    }

    #[test]
    fn test_geofence_symmetry() {
        let radius = 30.0;
        let buffer_a = buffer_polygon(GDANSK, radius).unwrap();

        // Points around A at increasing distances and varied bearings
        for step in 0..24 {
            let bearing = step as f64 * 15.0 + 7.0;
            for distance in [1.0, 10.0, 25.0, 29.0, 31.0, 40.0, 120.0] {
                let b = from_point(Haversine.destination(to_point(GDANSK), bearing, distance));
                let d = distance_meters(GDANSK, b).unwrap();
                let buffer_b = buffer_polygon(b, radius).unwrap();

                let b_in_a = is_point_in_polygon(b, &buffer_a).unwrap();
                let a_in_b = is_point_in_polygon(GDANSK, &buffer_b).unwrap();

                if d < radius * 0.99 {
                    assert!(b_in_a && a_in_b, "{} m at {} deg should be inside", d, bearing);
                } else if d > radius * 1.01 {
                    assert!(!b_in_a && !a_in_b, "{} m at {} deg should be outside", d, bearing);
                }
            }
        }
    }

    #[test]
    fn test_distance_meters() {
        let d = distance_meters(GDANSK, GDANSK).unwrap();
        assert_eq!(d, 0.0);

        // One degree of latitude is ~111.2 km
        let d = distance_meters(Coordinate::new(18.0, 54.0), Coordinate::new(18.0, 55.0)).unwrap();
        assert!((d - 111_195.0).abs() < 100.0);

        assert!(distance_meters(GDANSK, Coordinate::new(200.0, 0.0)).is_err());
    }

    #[test]
    fn test_nearest() {
        let from = Coordinate::new(0.0, 0.0);
        let candidates = [Coordinate::new(1.0, 1.0), Coordinate::new(0.1, 0.1)];
        assert_eq!(nearest(from, &candidates).unwrap(), Some(Coordinate::new(0.1, 0.1)));
    }

    #[test]
    fn test_nearest_empty_and_ties() {
        let from = Coordinate::new(0.0, 0.0);
        assert_eq!(nearest(from, &[]).unwrap(), None);

        let candidates = [
            Coordinate::new(0.5, 0.0),
            Coordinate::new(-0.5, 0.0),
            Coordinate::new(0.0, 2.0),
        ];
        assert_eq!(nearest(from, &candidates).unwrap(), Some(Coordinate::new(0.5, 0.0)));
    }

    #[test]
    fn test_nearest_rejects_invalid_candidate() {
        let from = Coordinate::new(0.0, 0.0);
        let candidates = [Coordinate::new(0.1, 0.1), Coordinate::new(f64::NAN, 0.0)];
        assert!(nearest(from, &candidates).is_err());
    }
}
