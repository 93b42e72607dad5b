//! Web-Mercator coordinate engine.
//!
//! Pure math shared by every other layer: conversions between tile, pixel,
//! geographic (EPSG:4326) and projected (EPSG:3857) coordinates, zoom
//! selection for map rendering, and row flipping between the XYZ and TMS
//! conventions.
//!
//! XYZ (row 0 at the top) is the canonical convention everywhere in this
//! crate. TMS rows are converted at the edges with [`flip_y`].

mod bounds;
mod mercator;

pub use bounds::{GeographicBounds, ProjectedBounds, TileCoordinate};
pub use mercator::{
    flip_y, geographic_to_projected, lat_to_y, lon_lat_to_pixel, lon_to_x, map_size,
    pixel_to_lon_lat, projected_to_geographic, select_zoom, tile_coordinate_x_at_zoom,
    tile_coordinate_y_at_zoom, tile_count, tile_to_geographic, tile_to_projected, x_to_lon,
    y_to_lat,
};

/// WGS84 semi-major axis used by the spherical Mercator projection.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Edge length of a web tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Latitude where the Mercator square ends.
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Default upper zoom for sources that do not declare one.
pub const MAX_ZOOM: u8 = 24;

/// Coordinate reference systems this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Srid {
    /// WGS84 longitude/latitude in degrees
    Epsg4326,
    /// Spherical Web Mercator in meters
    Epsg3857,
}

impl Srid {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Srid::Epsg4326),
            3857 | 900913 => Some(Srid::Epsg3857),
            _ => None,
        }
    }

    /// Parse `EPSG:3857`-style identifiers, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let (authority, code) = value.trim().split_once(':')?;
        if !authority.eq_ignore_ascii_case("EPSG") {
            return None;
        }
        Self::from_code(code.parse().ok()?)
    }

    pub const fn code(self) -> u32 {
        match self {
            Srid::Epsg4326 => 4326,
            Srid::Epsg3857 => 3857,
        }
    }
}

impl std::fmt::Display for Srid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.code())
    }
}
