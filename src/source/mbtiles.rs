//! Tiles served from an MBTiles database.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{SourceError, TileError};
use crate::format::TileFormat;
use crate::geo::{flip_y, GeographicBounds, MAX_ZOOM};
use crate::store::TileStore;

use super::{SourceConfiguration, TileSource};

/// Point lookups into a tile database.
///
/// MBTiles rows count from the bottom, so `tms` defaults to `true`.
pub struct MbTilesSource {
    config: SourceConfiguration,
    store: TileStore,
}

impl MbTilesSource {
    /// Open the database and complete the configuration from its
    /// `metadata` table.
    ///
    /// Configured values win over metadata. Missing zooms fall back to the
    /// range of stored tiles, a missing format to sniffing the first tile.
    pub async fn init(mut config: SourceConfiguration) -> Result<Self, SourceError> {
        if config.location.is_empty() {
            return Err(SourceError::configuration(&config.id, "missing database path"));
        }
        let store = TileStore::open(&config.location).await?;

        let metadata: HashMap<String, String> = store
            .read_metadata()
            .await?
            .into_iter()
            .map(|item| (item.name, item.value))
            .collect();

        if config.title.is_empty() {
            if let Some(name) = metadata.get("name") {
                config.title = name.clone();
            }
        }
        if config.abstract_text.is_empty() {
            if let Some(description) = metadata.get("description") {
                config.abstract_text = description.clone();
            }
        }
        if config.bounds.is_none() {
            config.bounds = metadata.get("bounds").and_then(|b| GeographicBounds::parse(b));
        }

        if config.format.is_none() {
            let mut format = metadata.get("format").and_then(|f| TileFormat::parse(f));
            if format.is_none() {
                format = store
                    .read_first_tile()
                    .await?
                    .and_then(|tile| TileFormat::detect(&tile));
            }
            config.format = Some(format.unwrap_or(TileFormat::Png));
        }

        let meta_zoom = |key: &str| metadata.get(key).and_then(|v| v.trim().parse::<u8>().ok());
        let (mut min_zoom, mut max_zoom) = (meta_zoom("minzoom"), meta_zoom("maxzoom"));
        if min_zoom.is_none() || max_zoom.is_none() {
            if let Some((min, max)) = store.read_zoom_level_range().await? {
                min_zoom = min_zoom.or(Some(min));
                max_zoom = max_zoom.or(Some(max));
            }
        }
        if config.min_zoom.is_none() {
            config.min_zoom = Some(min_zoom.unwrap_or(0));
        }
        if config.max_zoom.is_none() {
            config.max_zoom = Some(max_zoom.unwrap_or(MAX_ZOOM));
        }
        config.tms.get_or_insert(true);

        debug!(
            source_id = %config.id,
            layout = ?store.layout(),
            min_zoom = config.min_zoom(),
            max_zoom = config.max_zoom(),
            format = %config.format(),
            "Opened tile database"
        );

        Ok(Self { config, store })
    }
}

#[async_trait]
impl TileSource for MbTilesSource {
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

        let row = if self.config.tms() { flip_y(y, z) } else { y };
        Ok(self.store.read_tile(x, row, z).await?)
    }
}
