//! Georeferenced raster (GeoTIFF) tile extraction.
//!
//! Supported rasters are tiled, chunky, 8 bits per sample with one to four
//! samples, stored uncompressed, deflated or as JPEG, and georeferenced by a
//! single tie point plus pixel scale in EPSG:3857 or EPSG:4326.

mod decode;
mod extractor;
mod properties;

pub use decode::{decode_tile, TileLayout};
pub use extractor::{RasterExtractor, MAX_CANVAS_PIXELS};
pub use properties::{RasterProperties, TileDirectory};
