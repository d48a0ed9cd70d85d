//! Web-Mercator projection at the 512 px tile size used by vector map
//! engines.
//!
//! Pixel coordinates grow east (x) and south (y) from the top-left corner of
//! the world at the given zoom.

use freepark_core::types::{Bounds, Camera, Coordinate, Padding};
use std::f64::consts::PI;

/// Tile size of vector-tile map engines.
pub const TILE_SIZE: f64 = 512.0;

/// Mercator cannot represent the poles.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A position in world pixels at some zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance(&self, other: PixelPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Width of the world in pixels at `zoom`.
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

/// Projects a coordinate to world pixels.
pub fn project(coord: Coordinate, zoom: f64) -> PixelPoint {
    let size = world_size(zoom);
    let lat = coord.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin = lat.to_radians().sin();

    let x = (coord.lng + 180.0) / 360.0 * size;
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * size;
    PixelPoint::new(x, y)
}

/// Inverse of [`project`].
pub fn unproject(pixel: PixelPoint, zoom: f64) -> Coordinate {
    let size = world_size(zoom);
    let lng = pixel.x / size * 360.0 - 180.0;
    let y = 180.0 - pixel.y / size * 360.0;
    let lat = 360.0 / PI * (y * PI / 180.0).exp().atan() - 90.0;
    Coordinate::new(lng, lat)
}

/// Computes the camera that frames `bounds` inside a `width` x `height`
/// viewport with the given padding, capped at `max_zoom`.
///
/// Asymmetric padding shifts the center so the framed area sits in the
/// unpadded part of the viewport.
pub fn fit_camera(bounds: &Bounds, width: f64, height: f64, padding: Padding, max_zoom: f64) -> Camera {
    let sw = project(bounds.south_west, 0.0);
    let ne = project(bounds.north_east, 0.0);
    let span_x = (ne.x - sw.x).abs();
    let span_y = (sw.y - ne.y).abs();

    let usable_w = (width - padding.left - padding.right).max(1.0);
    let usable_h = (height - padding.top - padding.bottom).max(1.0);

    let scale_x = if span_x > 0.0 { usable_w / span_x } else { f64::INFINITY };
    let scale_y = if span_y > 0.0 { usable_h / span_y } else { f64::INFINITY };
    let zoom = scale_x.min(scale_y).log2().min(max_zoom);

    let mid = project(bounds.center(), zoom);
    let offset = PixelPoint::new(
        mid.x + (padding.right - padding.left) / 2.0,
        mid.y + (padding.bottom - padding.top) / 2.0,
    );

    Camera::new(unproject(offset, zoom), zoom)
}
