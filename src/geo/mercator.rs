//! Spherical Web-Mercator math.
//!
//! Pixel space at zoom `z` is a square of `256 * 2^z` pixels with the origin
//! at the top-left corner (north-west). Tile rows follow the XYZ convention;
//! [`flip_y`] is the single conversion point to and from TMS rows.

use std::f64::consts::PI;

use super::bounds::{GeographicBounds, ProjectedBounds};
use super::{EARTH_RADIUS, MAX_LATITUDE, TILE_SIZE};

/// Highest zoom considered when matching a map request to a tile pyramid.
const MAX_SELECTABLE_ZOOM: u8 = 23;

/// Number of tiles along one axis at zoom `z`.
#[inline]
pub fn tile_count(z: u8) -> u64 {
    1u64 << z
}

/// Width and height of the whole map in pixels at zoom `z`.
#[inline]
pub fn map_size(z: u8) -> f64 {
    TILE_SIZE as f64 * tile_count(z) as f64
}

/// Convert a row between the XYZ and TMS conventions. Self-inverse for
/// rows in `0..2^z`.
#[inline]
pub fn flip_y(y: u32, z: u8) -> u32 {
    tile_count(z).saturating_sub(y as u64 + 1) as u32
}

// =============================================================================
// Degrees <-> meters
// =============================================================================

#[inline]
pub fn lon_to_x(lon: f64) -> f64 {
    lon.to_radians() * EARTH_RADIUS
}

/// Latitude in degrees to northing in meters; clipped to the Mercator range.
#[inline]
pub fn lat_to_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    (PI / 4.0 + lat / 2.0).tan().ln() * EARTH_RADIUS
}

#[inline]
pub fn x_to_lon(x: f64) -> f64 {
    (x / EARTH_RADIUS).to_degrees()
}

#[inline]
pub fn y_to_lat(y: f64) -> f64 {
    (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees()
}

pub fn projected_to_geographic(bounds: &ProjectedBounds) -> GeographicBounds {
    GeographicBounds::new(
        x_to_lon(bounds.left),
        y_to_lat(bounds.bottom),
        x_to_lon(bounds.right),
        y_to_lat(bounds.top),
    )
}

pub fn geographic_to_projected(bounds: &GeographicBounds) -> ProjectedBounds {
    ProjectedBounds::new(
        lon_to_x(bounds.min_lon),
        lat_to_y(bounds.min_lat),
        lon_to_x(bounds.max_lon),
        lat_to_y(bounds.max_lat),
    )
}

// =============================================================================
// Degrees <-> pixels
// =============================================================================

/// Position of a point in pixel space at zoom `z`, clipped to the map square.
pub fn lon_lat_to_pixel(lon: f64, lat: f64, z: u8) -> (f64, f64) {
    let size = map_size(z);
    let sin_lat = lat.to_radians().sin();
    let px = (lon + 180.0) / 360.0 * size;
    let py = (0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * PI)) * size;
    (px.clamp(0.0, size), py.clamp(0.0, size))
}

/// Inverse of [`lon_lat_to_pixel`]. Input is clipped to the map square.
pub fn pixel_to_lon_lat(px: f64, py: f64, z: u8) -> (f64, f64) {
    let size = map_size(z);
    let x = px.clamp(0.0, size) / size - 0.5;
    let y = 0.5 - py.clamp(0.0, size) / size;
    let lat = 90.0 - 360.0 * (-y * 2.0 * PI).exp().atan() / PI;
    let lon = 360.0 * x;
    (lon, lat)
}

// =============================================================================
// Tiles
// =============================================================================

/// Geographic envelope of an XYZ tile.
pub fn tile_to_geographic(x: u32, y: u32, z: u8) -> GeographicBounds {
    let size = map_size(z);
    let tile = TILE_SIZE as f64;
    let px0 = (x as f64 * tile).clamp(0.0, size);
    let py0 = (y as f64 * tile).clamp(0.0, size);
    let px1 = (px0 + tile).clamp(0.0, size);
    let py1 = (py0 + tile).clamp(0.0, size);

    let (min_lon, max_lat) = pixel_to_lon_lat(px0, py0, z);
    let (max_lon, min_lat) = pixel_to_lon_lat(px1, py1, z);
    GeographicBounds::new(min_lon, min_lat, max_lon, max_lat)
}

/// EPSG:3857 envelope of an XYZ tile.
pub fn tile_to_projected(x: u32, y: u32, z: u8) -> ProjectedBounds {
    geographic_to_projected(&tile_to_geographic(x, y, z))
}

/// Fractional tile column containing `lon` at zoom `z`. Not clipped.
pub fn tile_coordinate_x_at_zoom(lon: f64, z: u8) -> f64 {
    (lon + 180.0) / 360.0 * tile_count(z) as f64
}

/// Fractional tile row (XYZ) containing `lat` at zoom `z`. Not clipped.
pub fn tile_coordinate_y_at_zoom(lat: f64, z: u8) -> f64 {
    let lat = lat.to_radians();
    (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * tile_count(z) as f64
}

/// Pick the pyramid zoom whose map width best matches `width` pixels
/// spread over `bounds`.
///
/// The first zoom with the smallest distance wins, so ties resolve to the
/// coarser level.
pub fn select_zoom(bounds: &GeographicBounds, width: u32) -> u8 {
    let span = bounds.width();
    if !(span > 0.0) {
        return 0;
    }
    let implied = width as f64 * 360.0 / span;

    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for z in 0..=MAX_SELECTABLE_ZOOM {
        let distance = (map_size(z) - implied).abs();
        if distance < best_distance {
            best = z;
            best_distance = distance;
        }
    }
    best
}
