//! Raster metadata derived once when a GeoTIFF is opened.

use bytes::Bytes;

use crate::error::TiffError;
use crate::format::tiff::{
    Compression, GeoKeyDirectory, Ifd, TiffHeader, TiffTag, ValueReader,
};
use crate::geo::{
    geographic_to_projected, projected_to_geographic, GeographicBounds, ProjectedBounds, Srid,
    MAX_LATITUDE,
};
use crate::io::RangeReader;

use super::decode::TileLayout;

/// Georeferencing and pixel layout of a tiled GeoTIFF.
#[derive(Debug, Clone)]
pub struct RasterProperties {
    pub width: u32,
    pub height: u32,
    pub layout: TileLayout,
    pub tiles_across: u32,
    pub tiles_down: u32,
    pub srid: Srid,

    /// Raster footprint in its own CRS units (meters or degrees)
    pub extent: ProjectedBounds,

    /// Footprint in EPSG:3857
    pub projected_bounds: ProjectedBounds,

    /// Footprint in EPSG:4326
    pub geographic_bounds: GeographicBounds,

    /// Size of one pixel in CRS units
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl RasterProperties {
    pub fn tile_width(&self) -> u32 {
        self.layout.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.layout.tile_height
    }

    /// Decoded size of one raster tile in bytes.
    pub fn tile_byte_size(&self) -> usize {
        self.layout.decoded_size()
    }

    pub fn tile_index(&self, column: u32, row: u32) -> Option<usize> {
        if column >= self.tiles_across || row >= self.tiles_down {
            return None;
        }
        Some(row as usize * self.tiles_across as usize + column as usize)
    }
}

/// Where the compressed tiles live in the file.
#[derive(Debug, Clone, Default)]
pub struct TileDirectory {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileDirectory {
    pub fn location(&self, index: usize) -> Option<(u64, u64)> {
        Some((*self.offsets.get(index)?, *self.byte_counts.get(index)?))
    }
}

/// Validate the first IFD of a GeoTIFF and derive its properties.
pub async fn read_properties<R: RangeReader + ?Sized>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<(RasterProperties, TileDirectory), TiffError> {
    let byte_order = header.byte_order;
    let values = ValueReader::new(reader, header);

    if !ifd.is_tiled() {
        return Err(if ifd.is_stripped() {
            TiffError::StripOrganization
        } else {
            TiffError::MissingTag("TileWidth")
        });
    }

    let width = ifd
        .image_width(byte_order)
        .ok_or(TiffError::MissingTag("ImageWidth"))?;
    let height = ifd
        .image_height(byte_order)
        .ok_or(TiffError::MissingTag("ImageLength"))?;
    let tile_width = ifd
        .tile_width(byte_order)
        .ok_or(TiffError::MissingTag("TileWidth"))?;
    let tile_height = ifd
        .tile_height(byte_order)
        .ok_or(TiffError::MissingTag("TileLength"))?;
    if width == 0 || height == 0 || tile_width == 0 || tile_height == 0 {
        return Err(TiffError::UnsupportedRaster(format!(
            "empty image or tile size ({}x{}, tiles {}x{})",
            width, height, tile_width, tile_height
        )));
    }

    let planar = ifd
        .get_u32(TiffTag::PlanarConfiguration, byte_order)
        .unwrap_or(1);
    if planar != 1 {
        return Err(TiffError::UnsupportedRaster(
            "planar configuration must be chunky (1)".to_string(),
        ));
    }

    let samples_per_pixel = ifd
        .get_u32(TiffTag::SamplesPerPixel, byte_order)
        .unwrap_or(1);
    if !(1..=4).contains(&samples_per_pixel) {
        return Err(TiffError::UnsupportedRaster(format!(
            "{} samples per pixel (1 to 4 supported)",
            samples_per_pixel
        )));
    }

    let bits = match ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
        Some(entry) => values.read_u16_array(entry).await?,
        None => vec![1],
    };
    if bits.iter().any(|&b| b != 8) {
        return Err(TiffError::UnsupportedRaster(format!(
            "bits per sample {:?} (only 8 supported)",
            bits
        )));
    }

    let compression_raw = ifd.compression(byte_order).unwrap_or(1);
    let compression = Compression::from_u16(compression_raw)
        .filter(|c| c.is_supported())
        .ok_or_else(|| {
            TiffError::UnsupportedCompression(
                Compression::from_u16(compression_raw)
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| format!("unknown ({})", compression_raw)),
            )
        })?;

    let predictor = ifd.get_u32(TiffTag::Predictor, byte_order).unwrap_or(1);
    if predictor != 1 && predictor != 2 {
        return Err(TiffError::UnsupportedRaster(format!(
            "predictor {} (only none and horizontal supported)",
            predictor
        )));
    }

    // Georeferencing
    if ifd.has_tag(TiffTag::ModelTransformation) {
        return Err(TiffError::UnsupportedRaster(
            "ModelTransformationTag is not supported".to_string(),
        ));
    }

    let tie_point = values
        .read_f64_array(
            ifd.get_entry_by_tag(TiffTag::ModelTiepoint)
                .ok_or(TiffError::MissingTag("ModelTiepoint"))?,
        )
        .await?;
    let &[i, j, _, tie_x, tie_y, _] = tie_point.as_slice() else {
        return Err(TiffError::UnsupportedRaster(format!(
            "expected exactly one tie point, got {} values",
            tie_point.len()
        )));
    };

    let scale = values
        .read_f64_array(
            ifd.get_entry_by_tag(TiffTag::ModelPixelScale)
                .ok_or(TiffError::MissingTag("ModelPixelScale"))?,
        )
        .await?;
    let (pixel_width, pixel_height) = match scale.as_slice() {
        &[sx, sy, ..] if sx > 0.0 && sy > 0.0 => (sx, sy),
        _ => {
            return Err(TiffError::InvalidTagValue {
                tag: "ModelPixelScale",
                message: format!("expected two positive scales, got {:?}", scale),
            })
        }
    };

    let geo_keys = values
        .read_u16_array(
            ifd.get_entry_by_tag(TiffTag::GeoKeyDirectory)
                .ok_or(TiffError::MissingTag("GeoKeyDirectory"))?,
        )
        .await?;
    let srid = GeoKeyDirectory::parse(&geo_keys)?.srid()?;

    let left = tie_x - i * pixel_width;
    let top = tie_y + j * pixel_height;
    let extent = ProjectedBounds::new(
        left,
        top - height as f64 * pixel_height,
        left + width as f64 * pixel_width,
        top,
    );

    let (projected_bounds, geographic_bounds) = match srid {
        Srid::Epsg3857 => (extent, projected_to_geographic(&extent)),
        Srid::Epsg4326 => {
            let geographic = GeographicBounds::new(
                extent.left.max(-180.0),
                extent.bottom.max(-MAX_LATITUDE),
                extent.right.min(180.0),
                extent.top.min(MAX_LATITUDE),
            );
            (geographic_to_projected(&geographic), geographic)
        }
    };

    // Tile directory
    let offsets = values
        .read_u64_array(
            ifd.get_entry_by_tag(TiffTag::TileOffsets)
                .ok_or(TiffError::MissingTag("TileOffsets"))?,
        )
        .await?;
    let byte_counts = values
        .read_u64_array(
            ifd.get_entry_by_tag(TiffTag::TileByteCounts)
                .ok_or(TiffError::MissingTag("TileByteCounts"))?,
        )
        .await?;
    let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
        Some(entry) => Some(values.read_raw_bytes(entry).await?),
        None => None,
    };

    let tiles_across = width.div_ceil(tile_width);
    let tiles_down = height.div_ceil(tile_height);
    let tile_total = tiles_across as usize * tiles_down as usize;
    if offsets.len() < tile_total || byte_counts.len() < tile_total {
        return Err(TiffError::InvalidTagValue {
            tag: "TileOffsets",
            message: format!(
                "{} tiles expected, {} offsets and {} byte counts found",
                tile_total,
                offsets.len(),
                byte_counts.len()
            ),
        });
    }

    let properties = RasterProperties {
        width,
        height,
        layout: TileLayout {
            tile_width,
            tile_height,
            samples_per_pixel: samples_per_pixel as u16,
            compression,
            predictor: predictor as u16,
        },
        tiles_across,
        tiles_down,
        srid,
        extent,
        projected_bounds,
        geographic_bounds,
        pixel_width,
        pixel_height,
    };

    Ok((
        properties,
        TileDirectory {
            offsets,
            byte_counts,
            jpeg_tables,
        },
    ))
}
