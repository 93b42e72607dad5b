//! Pixel canvas helpers shared by the map compositor and the raster
//! extractor.
//!
//! Both build a working canvas from whole tiles and then need an arbitrary
//! fractional rectangle of it scaled into a fixed-size output.

use image::imageops::{self, FilterType};
use image::RgbaImage;

const SNAP_EPSILON: f64 = 1e-9;

/// Round values that are within floating-point noise of an integer.
///
/// Tile and pixel edges computed through projections often land a hair off
/// an exact boundary; without snapping, `floor`/`ceil` would pull in an
/// extra row or column of tiles.
#[inline]
pub fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < SNAP_EPSILON {
        rounded
    } else {
        value
    }
}

/// Inclusive integer cells `floor(min) ..= ceil(max) - 1` covered by a
/// fractional span.
///
/// An empty or inverted span yields `start > end`.
pub fn cell_span(min: f64, max: f64, cell_size: f64) -> (i64, i64) {
    let start = snap(min / cell_size).floor() as i64;
    let end = snap(max / cell_size).ceil() as i64 - 1;
    (start, end)
}

/// Draw the fractional source rectangle `(x, y, width, height)` of `src`,
/// scaled to cover all of `dst`.
///
/// Parts of the rectangle that fall outside `src` leave the matching region
/// of `dst` untouched. Drawing alpha-blends over existing pixels.
pub fn draw_scaled(
    src: &RgbaImage,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    dst: &mut RgbaImage,
) {
    if !(width > 0.0 && height > 0.0) || dst.width() == 0 || dst.height() == 0 {
        return;
    }

    let scale_x = dst.width() as f64 / width;
    let scale_y = dst.height() as f64 / height;

    // Visible part of the rectangle, in source pixels
    let x0 = snap(x.max(0.0)).floor();
    let y0 = snap(y.max(0.0)).floor();
    let x1 = snap((x + width).min(src.width() as f64)).ceil();
    let y1 = snap((y + height).min(src.height() as f64)).ceil();
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    // Where that part lands in the output
    let dx0 = ((x0 - x) * scale_x).round();
    let dy0 = ((y0 - y) * scale_y).round();
    let dx1 = ((x1 - x) * scale_x).round();
    let dy1 = ((y1 - y) * scale_y).round();
    let out_width = (dx1 - dx0) as u32;
    let out_height = (dy1 - dy0) as u32;
    if out_width == 0 || out_height == 0 {
        return;
    }

    let crop = imageops::crop_imm(
        src,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )
    .to_image();

    if crop.width() == out_width && crop.height() == out_height {
        imageops::overlay(dst, &crop, dx0 as i64, dy0 as i64);
    } else {
        let scaled = imageops::resize(&crop, out_width, out_height, FilterType::CatmullRom);
        imageops::overlay(dst, &scaled, dx0 as i64, dy0 as i64);
    }
}
