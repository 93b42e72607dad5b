//! Web tiles rendered from a tiled GeoTIFF.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{SourceError, TileError};
use crate::format::TileFormat;
use crate::geo::MAX_ZOOM;
use crate::io::LocalFileReader;
use crate::raster::RasterExtractor;

use super::{SourceConfiguration, TileSource};

/// A GeoTIFF on local disk served as PNG tiles.
pub struct GeoTiffSource {
    config: SourceConfiguration,
    extractor: RasterExtractor<LocalFileReader>,
}

impl GeoTiffSource {
    /// Open the raster and take the layer bounds from its georeferencing.
    pub async fn init(mut config: SourceConfiguration) -> Result<Self, SourceError> {
        let reader = LocalFileReader::open(&config.location).await?;
        let extractor = RasterExtractor::open(reader).await?;

        let props = extractor.properties();
        config.bounds.get_or_insert(props.geographic_bounds);
        config.format = Some(TileFormat::Png);
        config.min_zoom.get_or_insert(0);
        config.max_zoom.get_or_insert(MAX_ZOOM);
        config.tms = Some(false);

        info!(
            source_id = %config.id,
            width = props.width,
            height = props.height,
            srid = %props.srid,
            "Loaded raster"
        );

        Ok(Self { config, extractor })
    }

    pub fn extractor(&self) -> &RasterExtractor<LocalFileReader> {
        &self.extractor
    }
}

#[async_trait]
impl TileSource for GeoTiffSource {
    fn configuration(&self) -> &SourceConfiguration {
        &self.config
    }

    async fn get_tile(
        &self,
        x: u32,
        y: u32,
        z: u8,
        _cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, TileError> {
        if !self.config.covers(x, y, z) {
            return Ok(None);
        }
        self.extractor.get_tile(x, y, z).await
    }
}
