//! Raster tile decoding.
//!
//! Turns the compressed bytes of one TIFF tile into a top-down RGBA image
//! cropped to the part of the tile that lies inside the raster.

use std::io::Read;

use flate2::read::ZlibDecoder;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::TileError;
use crate::format::jpeg::prepare_tile_jpeg;
use crate::format::tiff::Compression;

/// Pixel layout shared by every tile of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub tile_width: u32,
    pub tile_height: u32,
    pub samples_per_pixel: u16,
    pub compression: Compression,
    /// 1 = none, 2 = horizontal differencing
    pub predictor: u16,
}

impl TileLayout {
    /// Size of one fully decoded tile in bytes.
    pub fn decoded_size(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * self.samples_per_pixel as usize
    }
}

/// Decode one raster tile and crop it to `visible_width x visible_height`.
pub fn decode_tile(
    data: &[u8],
    layout: &TileLayout,
    jpeg_tables: Option<&[u8]>,
    visible_width: u32,
    visible_height: u32,
) -> Result<RgbaImage, TileError> {
    let full = match layout.compression {
        Compression::Jpeg => decode_jpeg(data, layout, jpeg_tables)?,
        Compression::None => samples_to_rgba(data, layout)?,
        Compression::Deflate | Compression::AdobeDeflate => {
            let mut inflated = Vec::with_capacity(layout.decoded_size());
            ZlibDecoder::new(data)
                .read_to_end(&mut inflated)
                .map_err(|e| TileError::DecodeError {
                    message: format!("deflate: {}", e),
                })?;
            samples_to_rgba(&inflated, layout)?
        }
        other => {
            return Err(TileError::DecodeError {
                message: format!("unsupported compression {}", other.name()),
            })
        }
    };

    let width = visible_width.min(full.width());
    let height = visible_height.min(full.height());
    if width == full.width() && height == full.height() {
        Ok(full)
    } else {
        Ok(image::imageops::crop_imm(&full, 0, 0, width, height).to_image())
    }
}

fn decode_jpeg(
    data: &[u8],
    layout: &TileLayout,
    jpeg_tables: Option<&[u8]>,
) -> Result<RgbaImage, TileError> {
    let stream = prepare_tile_jpeg(jpeg_tables, data);
    let image = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg).map_err(|e| {
        TileError::DecodeError {
            message: format!("jpeg: {}", e),
        }
    })?;

    let image = image.into_rgba8();
    if image.width() < layout.tile_width || image.height() < layout.tile_height {
        return Err(TileError::DecodeError {
            message: format!(
                "jpeg tile is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                layout.tile_width,
                layout.tile_height
            ),
        });
    }
    Ok(image)
}

/// Expand chunky 8-bit samples to RGBA, undoing the horizontal predictor.
fn samples_to_rgba(data: &[u8], layout: &TileLayout) -> Result<RgbaImage, TileError> {
    let expected = layout.decoded_size();
    if data.len() < expected {
        return Err(TileError::DecodeError {
            message: format!("tile holds {} bytes, expected {}", data.len(), expected),
        });
    }

    let expand: fn(&[u8]) -> Rgba<u8> = match layout.samples_per_pixel {
        1 => |s| Rgba([s[0], s[0], s[0], 255]),
        2 => |s| Rgba([s[0], s[0], s[0], s[1]]),
        3 => |s| Rgba([s[0], s[1], s[2], 255]),
        4 => |s| Rgba([s[0], s[1], s[2], s[3]]),
        other => {
            return Err(TileError::DecodeError {
                message: format!("{} samples per pixel", other),
            })
        }
    };

    let spp = layout.samples_per_pixel as usize;
    let row_len = layout.tile_width as usize * spp;
    let mut samples = data[..expected].to_vec();

    if layout.predictor == 2 {
        for row in samples.chunks_exact_mut(row_len) {
            for i in spp..row_len {
                row[i] = row[i].wrapping_add(row[i - spp]);
            }
        }
    }

    let mut image = RgbaImage::new(layout.tile_width, layout.tile_height);
    for (pixel, chunk) in image.pixels_mut().zip(samples.chunks_exact(spp)) {
        *pixel = expand(chunk);
    }
    Ok(image)
}
