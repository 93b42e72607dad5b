//! Content addressing for stored tiles.
//!
//! Tiles of a single uniform color are common (open water, empty land) and
//! are stored once per color. Every other tile gets an id derived from its
//! coordinate.

use image::Rgba;

/// Return the color of a tile whose pixels are all identical.
///
/// Data that does not decode as an image is never blank.
pub fn check_if_blank(data: &[u8]) -> Option<Rgba<u8>> {
    let image = image::load_from_memory(data).ok()?.into_rgba8();
    let mut pixels = image.pixels();
    let first = *pixels.next()?;
    pixels.all(|p| *p == first).then_some(first)
}

/// Storage key for a tile: `#RRGGBBAA` for blank tiles, otherwise
/// `{col}-{row}-{zoom}`.
pub fn tile_id(col: u32, row: u32, zoom: u8, data: &[u8]) -> String {
    match check_if_blank(data) {
        Some(color) => format!("#{}", hex::encode_upper(color.0)),
        None => format!("{}-{}-{}", col, row, zoom),
    }
}
