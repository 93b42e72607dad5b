//! Web tiles cut from a tiled GeoTIFF.
//!
//! # Pipeline
//!
//! 1. Web tile bounds (XYZ) in the raster's CRS, intersected with the raster
//!    footprint. No overlap means no tile.
//! 2. The overlap in raster pixels selects a range of raster tiles.
//! 3. Those tiles are read one raster row at a time, decoded and stitched
//!    into a working canvas. At coarse zooms the canvas holds the raster at
//!    a reduced resolution so its size stays bounded.
//! 4. The web tile's exact pixel rectangle is scaled out of the canvas into a
//!    transparent 256x256 image and encoded as PNG. Rasters in degrees are
//!    resampled row by row onto Mercator latitudes.
//!
//! Decoding and scaling are CPU-bound and run on the blocking pool.

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::error::{TiffError, TileError};
use crate::format::tiff::{Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use crate::format::TileFormat;
use crate::geo::{
    tile_to_geographic, tile_to_projected, y_to_lat, ProjectedBounds, Srid, TileCoordinate,
    TILE_SIZE,
};
use crate::io::RangeReader;
use crate::tile::canvas::{cell_span, draw_scaled};
use crate::tile::TileEncoder;

use super::decode::{decode_tile, TileLayout};
use super::properties::{read_properties, RasterProperties, TileDirectory};

/// Largest working canvas a single web tile may use, in pixels.
pub const MAX_CANVAS_PIXELS: u64 = 4096 * 4096;

/// One raster tile placed on the working canvas, in full-resolution pixels.
struct PlacedTile {
    x: u64,
    y: u64,
    visible_width: u32,
    visible_height: u32,
}

/// Maps raster CRS coordinates onto the working canvas.
#[derive(Debug, Clone, Copy)]
struct CanvasFrame {
    left: f64,
    top: f64,
    pixel_width: f64,
    pixel_height: f64,
    /// Raster pixels per canvas pixel
    step: f64,
}

impl CanvasFrame {
    fn column(&self, x: f64) -> f64 {
        (x - self.left) / self.pixel_width / self.step
    }

    fn row(&self, y: f64) -> f64 {
        (self.top - y) / self.pixel_height / self.step
    }

    /// Scale a full-resolution canvas position down to the working canvas.
    fn reduce(&self, value: u64) -> i64 {
        (value as f64 / self.step).round() as i64
    }
}

/// Serves web tiles from one GeoTIFF.
pub struct RasterExtractor<R> {
    reader: R,
    properties: RasterProperties,
    directory: TileDirectory,
}

impl<R: RangeReader> RasterExtractor<R> {
    /// Parse and validate the raster's first image.
    pub async fn open(reader: R) -> Result<Self, TiffError> {
        let size = reader.size();
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(size) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, size)?;

        let ifd = read_first_ifd(&reader, &header).await?;
        let (properties, directory) = read_properties(&reader, &header, &ifd).await?;

        debug!(
            raster = reader.identifier(),
            width = properties.width,
            height = properties.height,
            srid = %properties.srid,
            "Opened raster"
        );

        Ok(Self {
            reader,
            properties,
            directory,
        })
    }

    pub fn properties(&self) -> &RasterProperties {
        &self.properties
    }

    /// Render the XYZ tile `(x, y, z)` from the raster.
    ///
    /// Returns `Ok(None)` for invalid coordinates and for tiles that do not
    /// overlap the raster.
    pub async fn get_tile(&self, x: u32, y: u32, z: u8) -> Result<Option<Bytes>, TileError> {
        if !TileCoordinate::new(x, y, z).is_valid() {
            return Ok(None);
        }

        let props = &self.properties;
        let mercator = tile_to_projected(x, y, z);
        let tile_bounds = match props.srid {
            Srid::Epsg3857 => mercator,
            Srid::Epsg4326 => {
                let g = tile_to_geographic(x, y, z);
                ProjectedBounds::new(g.min_lon, g.min_lat, g.max_lon, g.max_lat)
            }
        };

        let Some(overlap) = tile_bounds.intersection(&props.extent) else {
            return Ok(None);
        };

        let tile_w = props.tile_width();
        let tile_h = props.tile_height();
        let to_px = |v: f64| (v - props.extent.left) / props.pixel_width;
        let to_py = |v: f64| (props.extent.top - v) / props.pixel_height;
        let (col_start, col_end) =
            cell_span(to_px(overlap.left), to_px(overlap.right), tile_w as f64);
        let (row_start, row_end) =
            cell_span(to_py(overlap.top), to_py(overlap.bottom), tile_h as f64);
        let col_start = col_start.clamp(0, props.tiles_across as i64 - 1) as u32;
        let col_end = col_end.clamp(0, props.tiles_across as i64 - 1) as u32;
        let row_start = row_start.clamp(0, props.tiles_down as i64 - 1) as u32;
        let row_end = row_end.clamp(0, props.tiles_down as i64 - 1) as u32;
        if col_end < col_start || row_end < row_start {
            return Ok(None);
        }

        let full_width = (col_end - col_start + 1) as u64 * tile_w as u64;
        let full_height = (row_end - row_start + 1) as u64 * tile_h as u64;
        let step = reduction(full_width, full_height);
        let frame = CanvasFrame {
            left: props.extent.left + (col_start * tile_w) as f64 * props.pixel_width,
            top: props.extent.top - (row_start * tile_h) as f64 * props.pixel_height,
            pixel_width: props.pixel_width,
            pixel_height: props.pixel_height,
            step: step as f64,
        };
        debug!(
            tile = %format!("{}/{}/{}", z, x, y),
            columns = ?(col_start, col_end),
            rows = ?(row_start, row_end),
            step,
            "Cutting raster tile"
        );

        let mut canvas = RgbaImage::new(
            full_width.div_ceil(step) as u32,
            full_height.div_ceil(step) as u32,
        );
        for row in row_start..=row_end {
            canvas = self
                .stitch_row(canvas, frame, row, col_start..=col_end, (col_start, row_start))
                .await?;
        }

        let srid = props.srid;
        let encoded = tokio::task::spawn_blocking(move || -> Result<Bytes, TileError> {
            let mut output = RgbaImage::from_pixel(TILE_SIZE, TILE_SIZE, Rgba([0, 0, 0, 0]));
            let left = frame.column(tile_bounds.left);
            let width = frame.column(tile_bounds.right) - left;
            match srid {
                Srid::Epsg3857 => {
                    let top = frame.row(tile_bounds.top);
                    let height = frame.row(tile_bounds.bottom) - top;
                    draw_scaled(&canvas, left, top, width, height, &mut output);
                }
                Srid::Epsg4326 => {
                    draw_mercator_rows(&canvas, &frame, left, width, &mercator, &mut output)
                }
            }
            TileEncoder::default().encode(&output, TileFormat::Png)
        })
        .await
        .map_err(|e| TileError::DecodeError {
            message: format!("raster task failed: {}", e),
        })??;

        Ok(Some(encoded))
    }

    /// Read one row of raster tiles and draw them onto the canvas.
    async fn stitch_row(
        &self,
        canvas: RgbaImage,
        frame: CanvasFrame,
        row: u32,
        columns: std::ops::RangeInclusive<u32>,
        origin: (u32, u32),
    ) -> Result<RgbaImage, TileError> {
        let props = &self.properties;
        let mut placed = Vec::new();
        let mut ranges = Vec::new();
        for col in columns {
            let Some((offset, length)) = props
                .tile_index(col, row)
                .and_then(|index| self.directory.location(index))
            else {
                continue;
            };
            // Sparse tile
            if length == 0 {
                continue;
            }
            ranges.push((offset, length as usize));
            placed.push(PlacedTile {
                x: ((col - origin.0) * props.tile_width()) as u64,
                y: ((row - origin.1) * props.tile_height()) as u64,
                visible_width: props.tile_width().min(props.width - col * props.tile_width()),
                visible_height: props.tile_height().min(props.height - row * props.tile_height()),
            });
        }
        if ranges.is_empty() {
            return Ok(canvas);
        }

        let chunks = self.reader.read_ranges(&ranges).await?;
        let layout = props.layout;
        let jpeg_tables = self.directory.jpeg_tables.clone();
        tokio::task::spawn_blocking(move || -> Result<RgbaImage, TileError> {
            let mut canvas = canvas;
            for (tile, data) in placed.iter().zip(&chunks) {
                let tables = jpeg_tables.as_deref();
                draw_raster_tile(&mut canvas, &frame, tile, data, &layout, tables)?;
            }
            Ok(canvas)
        })
        .await
        .map_err(|e| TileError::DecodeError {
            message: format!("raster task failed: {}", e),
        })?
    }
}

/// Smallest power-of-two reduction that keeps a `width x height` canvas
/// within [`MAX_CANVAS_PIXELS`].
fn reduction(width: u64, height: u64) -> u64 {
    let mut step = 1;
    while width.div_ceil(step) * height.div_ceil(step) > MAX_CANVAS_PIXELS {
        step *= 2;
    }
    step
}

fn draw_raster_tile(
    canvas: &mut RgbaImage,
    frame: &CanvasFrame,
    tile: &PlacedTile,
    data: &[u8],
    layout: &TileLayout,
    jpeg_tables: Option<&[u8]>,
) -> Result<(), TileError> {
    let decoded = decode_tile(
        data,
        layout,
        jpeg_tables,
        tile.visible_width,
        tile.visible_height,
    )?;
    if frame.step == 1.0 {
        imageops::replace(canvas, &decoded, tile.x as i64, tile.y as i64);
        return Ok(());
    }

    let x0 = frame.reduce(tile.x);
    let y0 = frame.reduce(tile.y);
    let x1 = frame.reduce(tile.x + decoded.width() as u64);
    let y1 = frame.reduce(tile.y + decoded.height() as u64);
    if x1 > x0 && y1 > y0 {
        let reduced = imageops::resize(
            &decoded,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
            FilterType::Triangle,
        );
        imageops::replace(canvas, &reduced, x0, y0);
    }
    Ok(())
}

/// Fill `output` one row at a time from a canvas whose rows are evenly
/// spaced in latitude.
fn draw_mercator_rows(
    canvas: &RgbaImage,
    frame: &CanvasFrame,
    left: f64,
    width: f64,
    mercator: &ProjectedBounds,
    output: &mut RgbaImage,
) {
    let resolution = mercator.height() / output.height() as f64;
    for row in 0..output.height() {
        let north = mercator.top - row as f64 * resolution;
        let top = frame.row(y_to_lat(north));
        let bottom = frame.row(y_to_lat(north - resolution));

        let mut line = RgbaImage::new(output.width(), 1);
        draw_scaled(canvas, left, top, width, bottom - top, &mut line);
        imageops::replace(output, &line, 0, row as i64);
    }
}

async fn read_first_ifd<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
) -> Result<Ifd, TiffError> {
    let offset = header.first_ifd_offset;
    let count_bytes = reader
        .read_exact_at(offset, header.ifd_count_size())
        .await?;
    let entry_count = if header.is_bigtiff {
        header.byte_order.read_u64(&count_bytes)
    } else {
        header.byte_order.read_u16(&count_bytes) as u64
    };

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
    Ifd::parse(&ifd_bytes, header)
}

// =============================================================================
// Tests
// =============================================================================
