//! TIFF parser for georeferenced rasters.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.
//!
//! - **GeoTIFF**: georeferencing lives in three extra tags (pixel scale, tie
//!   points, GeoKey directory), parsed by [`GeoKeyDirectory`] and the raster
//!   extractor.

mod geokeys;
mod parser;
mod tags;
mod values;

pub use geokeys::{
    GeoKeyDirectory, ANGULAR_DEGREE, GEOGRAPHIC_TYPE, GEOG_ANGULAR_UNITS, GT_MODEL_TYPE,
    LINEAR_METER, PROJECTED_CS_TYPE, PROJ_LINEAR_UNITS,
};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::ValueReader;
