//! Tile Service: the entry point for tile and map requests.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       TileService                         │
//! │                                                           │
//! │   get_tile()                     get_map()                │
//! │   1. Resolve layer               1. Validate request      │
//! │   2. Fetch from source           2. Fetch tiles (all      │
//! │   3. Convert format if asked        layers, concurrently) │
//! │                                  3. Stitch, scale, encode │
//! │        │                                  │               │
//! │        ▼                                  ▼               │
//! │  ┌──────────────┐               ┌──────────────────┐      │
//! │  │SourceRegistry│◄──────────────│  MapCompositor   │      │
//! │  └──────────────┘               └──────────────────┘      │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Coordinates are XYZ; protocol handlers flip TMS rows before calling.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::TileError;
use crate::format::TileFormat;
use crate::render::{MapCompositor, MapRequest};
use crate::source::{SourceRegistry, TileSource};

use super::encoder::TileEncoder;

// =============================================================================
// Tile Response
// =============================================================================

/// Encoded image ready to send.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: Bytes,
    pub content_type: &'static str,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Serves tiles and rendered maps from a source registry.
///
/// The registry is shared, so the service is cheap to clone into request
/// handlers.
#[derive(Clone)]
pub struct TileService {
    registry: Arc<SourceRegistry>,
    encoder: TileEncoder,
    compositor: MapCompositor,
}

impl TileService {
    /// Create a service; JPEG output uses the registry's configured quality.
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        let encoder = TileEncoder::new(registry.service().jpeg_quality);
        Self {
            compositor: MapCompositor::new(Arc::clone(&registry), encoder),
            registry,
            encoder,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Fetch one tile of `layer`, converted to `format` when given.
    ///
    /// # Errors
    ///
    /// - `SourceNotFound` for an unknown layer
    /// - `UnsupportedFormat` when conversion involves vector tiles
    /// - any error the source reports
    pub async fn get_tile(
        &self,
        layer: &str,
        x: u32,
        y: u32,
        z: u8,
        format: Option<TileFormat>,
        cancel: &CancellationToken,
    ) -> Result<Option<TileResponse>, TileError> {
        let source = self
            .registry
            .get(layer)
            .ok_or_else(|| TileError::SourceNotFound {
                id: layer.to_string(),
            })?;

        let native = source.configuration().format();
        let target = format.unwrap_or(native);
        if native != target && (!native.is_raster() || !target.is_raster()) {
            return Err(TileError::UnsupportedFormat {
                message: format!("layer '{}' serves {} tiles, not {}", layer, native, target),
            });
        }

        let Some(data) = source.get_tile(x, y, z, cancel).await? else {
            debug!(layer, x, y, z, "Tile not found");
            return Ok(None);
        };

        let data = if native == target {
            data
        } else {
            let encoder = self.encoder;
            tokio::task::spawn_blocking(move || encoder.convert(data, native, target))
                .await
                .map_err(|e| TileError::EncodeError {
                    message: format!("conversion task failed: {}", e),
                })??
        };

        Ok(Some(TileResponse {
            data,
            content_type: target.content_type(),
        }))
    }

    /// Render a map image.
    pub async fn get_map(
        &self,
        request: MapRequest,
        cancel: &CancellationToken,
    ) -> Result<TileResponse, TileError> {
        let data = self.compositor.render(&request, cancel).await?;
        Ok(TileResponse {
            data,
            content_type: request.format.content_type(),
        })
    }
}
