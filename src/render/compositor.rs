//! Map rendering from tile sources.
//!
//! # Pipeline
//!
//! 1. Pick the pyramid zoom whose resolution best matches the request.
//! 2. Enumerate the XYZ tiles covering the bounding box at that zoom.
//! 3. Fetch them from every requested layer concurrently.
//! 4. Per layer, stitch the tiles into a working canvas.
//! 5. Draw the bounding box's exact canvas rectangle, scaled, onto the
//!    output, one layer over the other in request order.
//! 6. Encode the output as PNG or JPEG.

use std::sync::Arc;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::format::TileFormat;
use crate::geo::{
    projected_to_geographic, select_zoom, tile_coordinate_x_at_zoom, tile_coordinate_y_at_zoom,
    tile_count, ProjectedBounds, Srid, TILE_SIZE,
};
use crate::source::{Source, SourceRegistry, TileSource};
use crate::tile::canvas::{cell_span, draw_scaled};
use crate::tile::TileEncoder;

/// Largest output width or height.
pub const MAX_MAP_SIZE: u32 = 4096;

/// Largest number of tiles one layer's working canvas may hold.
pub const MAX_CANVAS_TILES: u64 = 1024;

/// Tile fetches in flight at once for one map request.
pub const MAX_CONCURRENT_FETCHES: usize = 32;

// =============================================================================
// Map Request
// =============================================================================

/// A rendered map request (WMS `GetMap`).
#[derive(Debug, Clone)]
pub struct MapRequest {
    /// Source ids, bottom layer first
    pub layers: Vec<String>,
    pub srs: Srid,
    pub bbox: ProjectedBounds,
    pub width: u32,
    pub height: u32,
    pub background: Rgba<u8>,
    pub transparent: bool,
    pub format: TileFormat,
}

impl MapRequest {
    pub fn validate(&self) -> Result<(), TileError> {
        if self.srs != Srid::Epsg3857 {
            return Err(TileError::invalid_request(format!(
                "unsupported SRS {}, only EPSG:3857 is rendered",
                self.srs
            )));
        }
        if !(1..=MAX_MAP_SIZE).contains(&self.width) || !(1..=MAX_MAP_SIZE).contains(&self.height)
        {
            return Err(TileError::invalid_request(format!(
                "map size {}x{} outside 1..={}",
                self.width, self.height, MAX_MAP_SIZE
            )));
        }
        let edges = [self.bbox.left, self.bbox.bottom, self.bbox.right, self.bbox.top];
        if edges.iter().any(|edge| !edge.is_finite()) {
            return Err(TileError::invalid_request("bounding box is not finite"));
        }
        if self.bbox.is_degenerate() {
            return Err(TileError::invalid_request("empty bounding box"));
        }
        if !matches!(self.format, TileFormat::Png | TileFormat::Jpeg) {
            return Err(TileError::UnsupportedFormat {
                message: format!("maps cannot be rendered as {}", self.format),
            });
        }
        if self.layers.is_empty() {
            return Err(TileError::invalid_request("no layers requested"));
        }
        Ok(())
    }

    /// Color the output starts from.
    fn fill(&self) -> Rgba<u8> {
        let [r, g, b, _] = self.background.0;
        Rgba([r, g, b, if self.transparent { 0 } else { 255 }])
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// Tiles covering a bounding box at one zoom, and where the box lies on
/// the canvas stitched from them.
#[derive(Debug, Clone, PartialEq)]
struct TileGrid {
    zoom: u8,
    /// First and last column, unwrapped
    columns: (i64, i64),
    /// First and last row, clamped to the grid
    rows: (i64, i64),
    /// Bounding box on the canvas: x, y, width, height in pixels
    rect: (f64, f64, f64, f64),
}

impl TileGrid {
    fn plan(bbox: &ProjectedBounds, width: u32) -> Self {
        let geo = projected_to_geographic(bbox);
        let zoom = select_zoom(&geo, width);

        let x_min = tile_coordinate_x_at_zoom(geo.min_lon, zoom);
        let x_max = tile_coordinate_x_at_zoom(geo.max_lon, zoom);
        let y_min = tile_coordinate_y_at_zoom(geo.max_lat, zoom);
        let y_max = tile_coordinate_y_at_zoom(geo.min_lat, zoom);

        let last = tile_count(zoom) as i64 - 1;
        let columns = cell_span(x_min, x_max, 1.0);
        let (row_start, row_end) = cell_span(y_min, y_max, 1.0);
        let rows = (row_start.clamp(0, last), row_end.clamp(0, last));

        let tile = TILE_SIZE as f64;
        let rect = (
            (x_min - columns.0 as f64) * tile,
            (y_min - rows.0 as f64) * tile,
            (x_max - x_min) * tile,
            (y_max - y_min) * tile,
        );

        Self {
            zoom,
            columns,
            rows,
            rect,
        }
    }

    fn tiles_across(&self) -> Option<u64> {
        span_len(self.columns)
    }

    fn tiles_down(&self) -> Option<u64> {
        span_len(self.rows)
    }

    /// Canvas size in tiles, if it stays within [`MAX_CANVAS_TILES`].
    fn canvas_tiles(&self) -> Result<(u32, u32), TileError> {
        match (self.tiles_across(), self.tiles_down()) {
            (Some(across), Some(down)) if across.saturating_mul(down) <= MAX_CANVAS_TILES => {
                Ok((across as u32, down as u32))
            }
            _ => Err(TileError::invalid_request(format!(
                "bounding box spans too many tiles at zoom {}",
                self.zoom
            ))),
        }
    }

    /// Canvas-relative `(column, row)` and XYZ `(x, y)` of every tile.
    fn tiles(&self) -> impl Iterator<Item = ((u32, u32), (u32, u32))> + '_ {
        let count = tile_count(self.zoom) as i64;
        (self.rows.0..=self.rows.1).flat_map(move |row| {
            (self.columns.0..=self.columns.1).map(move |column| {
                let canvas = ((column - self.columns.0) as u32, (row - self.rows.0) as u32);
                let xyz = (column.rem_euclid(count) as u32, row as u32);
                (canvas, xyz)
            })
        })
    }
}

/// Number of cells in an inclusive span; `None` when it does not fit.
fn span_len((start, end): (i64, i64)) -> Option<u64> {
    let len = end.checked_sub(start)?.checked_add(1)?;
    Some(len.max(0) as u64)
}

/// An encoded tile and where it goes.
struct FetchedTile {
    layer: usize,
    column: u32,
    row: u32,
    data: Bytes,
}

// =============================================================================
// Map Compositor
// =============================================================================

/// Renders maps from the sources of a registry.
#[derive(Clone)]
pub struct MapCompositor {
    registry: Arc<SourceRegistry>,
    encoder: TileEncoder,
}

impl MapCompositor {
    pub fn new(registry: Arc<SourceRegistry>, encoder: TileEncoder) -> Self {
        Self { registry, encoder }
    }

    /// Render `request` into an encoded image.
    pub async fn render(
        &self,
        request: &MapRequest,
        cancel: &CancellationToken,
    ) -> Result<Bytes, TileError> {
        request.validate()?;

        let sources = request
            .layers
            .iter()
            .map(|id| self.resolve(id))
            .collect::<Result<Vec<_>, _>>()?;

        let grid = TileGrid::plan(&request.bbox, request.width);
        let canvas_tiles = grid.canvas_tiles()?;
        debug!(
            zoom = grid.zoom,
            columns = ?grid.columns,
            rows = ?grid.rows,
            layers = sources.len(),
            "Rendering map"
        );

        let tiles = fetch_tiles(&sources, &grid, cancel).await?;

        let encoder = self.encoder;
        let request = request.clone();
        let layer_count = sources.len();
        tokio::task::spawn_blocking(move || {
            let image = compose(&request, &grid, canvas_tiles, layer_count, tiles, &encoder);
            encoder.encode(&image, request.format)
        })
        .await
        .map_err(|e| TileError::EncodeError {
            message: format!("render task failed: {}", e),
        })?
    }

    fn resolve(&self, id: &str) -> Result<Arc<Source>, TileError> {
        let source = self
            .registry
            .get(id)
            .ok_or_else(|| TileError::SourceNotFound { id: id.to_string() })?;
        let format = source.configuration().format();
        if !format.is_raster() {
            return Err(TileError::UnsupportedFormat {
                message: format!("layer '{}' serves {} tiles", id, format),
            });
        }
        Ok(source)
    }
}

/// Fetch every tile of every layer, at most [`MAX_CONCURRENT_FETCHES`] at
/// a time.
///
/// The first error cancels the remaining fetches.
async fn fetch_tiles(
    sources: &[Arc<Source>],
    grid: &TileGrid,
    cancel: &CancellationToken,
) -> Result<Vec<FetchedTile>, TileError> {
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_FETCHES));
    let mut set = JoinSet::new();
    for (layer, source) in sources.iter().enumerate() {
        for ((column, row), (x, y)) in grid.tiles() {
            let source = Arc::clone(source);
            let permits = Arc::clone(&permits);
            let cancel = cancel.clone();
            let z = grid.zoom;
            set.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TileError::Cancelled),
                    permit = permits.acquire_owned() => {
                        permit.map_err(|_| TileError::Cancelled)?
                    }
                };
                let data = source.get_tile(x, y, z, &cancel).await?;
                Ok::<_, TileError>(data.map(|data| FetchedTile {
                    layer,
                    column,
                    row,
                    data,
                }))
            });
        }
    }

    let mut tiles = Vec::new();
    while let Some(joined) = set.join_next().await {
        let fetched = joined.map_err(|e| TileError::Upstream {
            message: format!("tile fetch task failed: {}", e),
        })??;
        tiles.extend(fetched);
    }
    Ok(tiles)
}

/// Stitch each layer and draw it onto the output.
fn compose(
    request: &MapRequest,
    grid: &TileGrid,
    (tiles_across, tiles_down): (u32, u32),
    layer_count: usize,
    tiles: Vec<FetchedTile>,
    encoder: &TileEncoder,
) -> RgbaImage {
    let mut output = RgbaImage::from_pixel(request.width, request.height, request.fill());
    let canvas_width = tiles_across * TILE_SIZE;
    let canvas_height = tiles_down * TILE_SIZE;
    let (x, y, width, height) = grid.rect;

    for layer in 0..layer_count {
        let mut canvas: Option<RgbaImage> = None;

        for tile in tiles.iter().filter(|t| t.layer == layer) {
            let image = match encoder.decode(&tile.data) {
                Ok(image) => image,
                Err(e) => {
                    warn!(
                        layer = %request.layers[layer],
                        column = tile.column,
                        row = tile.row,
                        error = %e,
                        "Skipping undecodable tile"
                    );
                    continue;
                }
            };
            let image = if image.dimensions() == (TILE_SIZE, TILE_SIZE) {
                image
            } else {
                imageops::resize(&image, TILE_SIZE, TILE_SIZE, FilterType::CatmullRom)
            };

            let canvas = canvas.get_or_insert_with(|| {
                RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([0, 0, 0, 0]))
            });
            imageops::replace(
                canvas,
                &image,
                (tile.column * TILE_SIZE) as i64,
                (tile.row * TILE_SIZE) as i64,
            );
        }

        if let Some(canvas) = canvas {
            draw_scaled(&canvas, x, y, width, height, &mut output);
        }
    }

    output
}
