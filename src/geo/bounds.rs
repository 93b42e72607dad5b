//! Bounding boxes and tile coordinates.

use serde::{Deserialize, Serialize};

use super::mercator::tile_count;

// =============================================================================
// TileCoordinate
// =============================================================================

/// A tile address in the XYZ convention (row 0 at the top).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoordinate {
    pub const fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Whether `x` and `y` both lie in `0..2^z`.
    pub fn is_valid(&self) -> bool {
        if self.z > 31 {
            return false;
        }
        let count = tile_count(self.z);
        (self.x as u64) < count && (self.y as u64) < count
    }
}

// =============================================================================
// ProjectedBounds
// =============================================================================

/// Rectangle in EPSG:3857 meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedBounds {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl ProjectedBounds {
    /// Build a rectangle, swapping edges given in the wrong order.
    pub fn new(left: f64, bottom: f64, right: f64, top: f64) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// A rectangle with zero width or height (or NaN edges) covers nothing.
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// True when the two rectangles share an area larger than zero.
    pub fn intersects(&self, other: &ProjectedBounds) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.bottom < other.top
            && other.bottom < self.top
    }

    pub fn intersection(&self, other: &ProjectedBounds) -> Option<ProjectedBounds> {
        if !self.intersects(other) {
            return None;
        }
        Some(ProjectedBounds {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        })
    }
}

// =============================================================================
// GeographicBounds
// =============================================================================

/// Rectangle in EPSG:4326 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographicBounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeographicBounds {
    /// The whole Web-Mercator world.
    pub const WORLD: GeographicBounds = GeographicBounds {
        min_lon: -180.0,
        min_lat: -super::MAX_LATITUDE,
        max_lon: 180.0,
        max_lat: super::MAX_LATITUDE,
    };

    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon: min_lon.min(max_lon),
            min_lat: min_lat.min(max_lat),
            max_lon: min_lon.max(max_lon),
            max_lat: min_lat.max(max_lat),
        }
    }

    /// Parse the MBTiles `bounds` metadata value: `"west,south,east,north"`.
    pub fn parse(value: &str) -> Option<Self> {
        let parts: Vec<f64> = value
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match parts.as_slice() {
            [w, s, e, n] => Some(Self::new(*w, *s, *e, *n)),
            _ => None,
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn intersects(&self, other: &GeographicBounds) -> bool {
        self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
            && self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
    }
}
