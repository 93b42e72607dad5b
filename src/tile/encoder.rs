//! Tile image encoding and decoding.
//!
//! Everything that turns encoded tile bytes into pixels and back goes
//! through [`TileEncoder`]. Rendering works on `RgbaImage` buffers; output is
//! PNG (lossless, keeps alpha) or JPEG (alpha flattened onto white).

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader, Rgb, RgbImage, RgbaImage};

use crate::error::TileError;
use crate::format::TileFormat;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Tile Encoder
// =============================================================================

/// Stateless PNG/JPEG codec for tiles and rendered maps.
#[derive(Debug, Clone, Copy)]
pub struct TileEncoder {
    jpeg_quality: u8,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl TileEncoder {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: clamp_quality(jpeg_quality),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Decode any supported raster tile into RGBA pixels.
    pub fn decode(&self, data: &[u8]) -> Result<RgbaImage, TileError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| TileError::DecodeError {
                message: e.to_string(),
            })?;

        let image = reader.decode().map_err(|e| TileError::DecodeError {
            message: e.to_string(),
        })?;

        Ok(image.into_rgba8())
    }

    /// Encode pixels as PNG or JPEG.
    pub fn encode(&self, image: &RgbaImage, format: TileFormat) -> Result<Bytes, TileError> {
        let mut output = Vec::new();

        match format {
            TileFormat::Png => {
                PngEncoder::new(&mut output)
                    .write_image(
                        image.as_raw(),
                        image.width(),
                        image.height(),
                        ExtendedColorType::Rgba8,
                    )
                    .map_err(|e| TileError::EncodeError {
                        message: e.to_string(),
                    })?;
            }
            TileFormat::Jpeg => {
                let flattened = flatten(image);
                JpegEncoder::new_with_quality(&mut output, self.jpeg_quality)
                    .encode_image(&flattened)
                    .map_err(|e| TileError::EncodeError {
                        message: e.to_string(),
                    })?;
            }
            other => {
                return Err(TileError::UnsupportedFormat {
                    message: format!("cannot encode {} tiles", other),
                })
            }
        }

        Ok(Bytes::from(output))
    }

    /// Re-encode a tile from one format into another.
    ///
    /// Identical formats pass through untouched. Vector tiles cannot be
    /// converted in either direction.
    pub fn convert(
        &self,
        data: Bytes,
        from: TileFormat,
        to: TileFormat,
    ) -> Result<Bytes, TileError> {
        if from == to {
            return Ok(data);
        }
        if !from.is_raster() || !to.is_raster() {
            return Err(TileError::UnsupportedFormat {
                message: format!("cannot convert {} tiles to {}", from, to),
            });
        }

        let image = self.decode(&data)?;
        self.encode(&image, to)
    }
}

/// Composite RGBA pixels over white, dropping the alpha channel.
fn flatten(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as u32;
        let over_white = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
