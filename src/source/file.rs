//! Tiles stored as individual files in a directory tree.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{IoError, SourceError, TileError};
use crate::format::TileFormat;
use crate::geo::{flip_y, MAX_ZOOM};

use super::{fill_template, SourceConfiguration, TileSource};

/// Serves `{z}/{x}/{y}`-addressed files from a path template.
pub struct FileSource {
    config: SourceConfiguration,
}

impl FileSource {
    /// Validate the template and fill in defaults.
    ///
    /// The format is taken from the template's extension when not configured.
    pub fn init(mut config: SourceConfiguration) -> Result<Self, SourceError> {
        for placeholder in ["{x}", "{y}", "{z}"] {
            if !config.location.contains(placeholder) {
                return Err(SourceError::configuration(
                    &config.id,
                    format!("path template must contain {}", placeholder),
                ));
            }
        }

        if config.format.is_none() {
            config.format = Some(TileFormat::from_path(&config.location).ok_or_else(|| {
                SourceError::configuration(
                    &config.id,
                    "format not configured and not recognizable from the template extension",
                )
            })?);
        }
        config.min_zoom.get_or_insert(0);
        config.max_zoom.get_or_insert(MAX_ZOOM);
        config.tms.get_or_insert(false);

        Ok(Self { config })
    }

    fn tile_path(&self, x: u32, y: u32, z: u8) -> String {
        let tms_y = flip_y(y, z);
        let row = if self.config.tms() { tms_y } else { y };
        fill_template(&self.config.location, x, row, tms_y, z)
    }
}

#[async_trait]
impl TileSource for FileSource {
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

        let path = self.tile_path(x, y, z);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(source_id = %self.config.id, path = %path, "Tile file not found");
                Ok(None)
            }
            Err(e) => Err(TileError::Io(IoError::Read(format!("{}: {}", path, e)))),
        }
    }
}
