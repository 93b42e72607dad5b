//! Map composition for WMS `GetMap` requests.
//!
//! Maps of arbitrary EPSG:3857 bounding boxes and pixel sizes are assembled
//! from the tiles of one or more sources.

mod compositor;

pub use compositor::{MapCompositor, MapRequest, MAX_CANVAS_TILES, MAX_MAP_SIZE};
