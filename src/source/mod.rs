//! Tile sources.
//!
//! A source answers "give me tile (x, y, z)" from one backend. The set of
//! backends is closed: local file trees, MBTiles databases, HTTP proxies
//! (XYZ, TMS, WMTS and WMS upstreams), PostGIS tables and GeoTIFF rasters.
//!
//! # Contract
//!
//! - Coordinates passed to [`TileSource::get_tile`] are always XYZ. Sources
//!   whose storage counts rows from the bottom flip internally.
//! - `Ok(Some(bytes))` is a tile, `Ok(None)` is an absent tile (including
//!   coordinates outside the grid or the zoom range), `Err` is an unexpected
//!   failure.
//! - Out-of-range requests never touch the backend.

mod config;
mod file;
mod geotiff;
mod http;
mod mbtiles;
mod postgis;
mod registry;

pub use config::{
    BackendConfiguration, CacheConfiguration, Layer, PostGisParameters, ServiceProperties,
    SourceConfiguration, WmsParameters, WmtsParameters,
};
pub use file::FileSource;
pub use geotiff::GeoTiffSource;
pub use http::{HttpSource, DEFAULT_UPSTREAM_TIMEOUT};
pub use mbtiles::MbTilesSource;
pub use postgis::PostGisSource;
pub use registry::SourceRegistry;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{SourceError, TileError};

// =============================================================================
// TileSource Trait
// =============================================================================

/// A backend that serves tiles by XYZ coordinate.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// The finalized configuration of this source.
    fn configuration(&self) -> &SourceConfiguration;

    /// Fetch one tile.
    ///
    /// Long-running fetches stop with [`TileError::Cancelled`] once `cancel`
    /// fires.
    async fn get_tile(
        &self,
        x: u32,
        y: u32,
        z: u8,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, TileError>;
}

// =============================================================================
// Source
// =============================================================================

/// Any configured source.
pub enum Source {
    File(FileSource),
    MbTiles(MbTilesSource),
    Http(HttpSource),
    PostGis(PostGisSource),
    GeoTiff(GeoTiffSource),
}

impl Source {
    /// Build and initialize the variant selected by the configuration's
    /// `type` tag.
    ///
    /// `http` is shared by every proxy source.
    pub async fn init(
        config: SourceConfiguration,
        http: &reqwest::Client,
    ) -> Result<Self, SourceError> {
        debug!(
            source_id = %config.id,
            kind = config.backend.type_name(),
            "Initializing source"
        );

        let source = match config.backend {
            BackendConfiguration::File => Source::File(FileSource::init(config)?),
            BackendConfiguration::MbTiles => Source::MbTiles(MbTilesSource::init(config).await?),
            BackendConfiguration::Xyz { .. }
            | BackendConfiguration::Tms { .. }
            | BackendConfiguration::Wmts { .. }
            | BackendConfiguration::Wms { .. } => {
                Source::Http(HttpSource::init(config, http.clone()).await?)
            }
            BackendConfiguration::PostGis { .. } => {
                Source::PostGis(PostGisSource::init(config).await?)
            }
            BackendConfiguration::GeoTiff => Source::GeoTiff(GeoTiffSource::init(config).await?),
        };
        Ok(source)
    }

    fn inner(&self) -> &dyn TileSource {
        match self {
            Source::File(s) => s,
            Source::MbTiles(s) => s,
            Source::Http(s) => s,
            Source::PostGis(s) => s,
            Source::GeoTiff(s) => s,
        }
    }
}

#[async_trait]
impl TileSource for Source {
    fn configuration(&self) -> &SourceConfiguration {
        self.inner().configuration()
    }

    async fn get_tile(
        &self,
        x: u32,
        y: u32,
        z: u8,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, TileError> {
        self.inner().get_tile(x, y, z, cancel).await
    }
}

/// Replace `{x}`, `{y}`, `{z}` and `{-y}` in a path or URL template.
///
/// `y` is the row in the storage convention; `{-y}` always receives the
/// TMS row.
pub(crate) fn fill_template(template: &str, x: u32, y: u32, tms_y: u32, z: u8) -> String {
    template
        .replace("{x}", &x.to_string())
        .replace("{-y}", &tms_y.to_string())
        .replace("{y}", &y.to_string())
        .replace("{z}", &z.to_string())
}
