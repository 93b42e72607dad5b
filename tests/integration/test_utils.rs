//! Test utilities for integration tests.
//!
//! Builders for tile images, tile trees, MBTiles files and tiled GeoTIFFs,
//! plus a local upstream tile server for proxy tests.

use std::io::Cursor;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::Value;

use tile_map_service::format::tiff::PROJECTED_CS_TYPE;
use tile_map_service::source::{ServiceProperties, SourceConfiguration, SourceRegistry};
use tile_map_service::store::{MetadataItem, TileStore};
use tile_map_service::tile::TileService;

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];

// =============================================================================
// Images
// =============================================================================

/// A 256x256 PNG of one color.
pub fn solid_png(color: [u8; 4]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbaImage::from_pixel(256, 256, Rgba(color))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// A 256x256 PNG with a gradient, so it is never considered blank.
pub fn gradient_png(seed: u8) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbaImage::from_fn(256, 256, |x, y| {
        Rgba([x as u8, y as u8, seed, 255])
    })
    .write_to(&mut out, ImageFormat::Png)
    .unwrap();
    out.into_inner()
}

pub fn decode(data: &[u8]) -> RgbaImage {
    image::load_from_memory(data).unwrap().into_rgba8()
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G'])
}

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0xFF && data[1] == 0xD8
}

// =============================================================================
// Source Fixtures
// =============================================================================

/// Write `{root}/{z}/{x}/{y}.png` for each `(x, y, z)`.
pub fn write_tile_tree(root: &Path, tiles: &[((u32, u32, u8), Vec<u8>)]) {
    for ((x, y, z), data) in tiles {
        let dir = root.join(z.to_string()).join(x.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.png", y)), data).unwrap();
    }
}

/// Create a deduplicated MBTiles file holding tiles at TMS coordinates.
pub async fn create_mbtiles(path: &Path, tiles: &[((u32, u32, u8), Vec<u8>)]) -> TileStore {
    let store = TileStore::create(path).await.unwrap();
    store
        .add_metadata_item(&MetadataItem::new("format", "png"))
        .await
        .unwrap();
    for ((x, tms_y, z), data) in tiles {
        store.add_tile(*x, *tms_y, *z, data).await.unwrap();
    }
    store
}

pub fn source_config(value: Value) -> SourceConfiguration {
    serde_json::from_value(value).unwrap()
}

pub async fn registry(configs: Vec<SourceConfiguration>) -> Arc<SourceRegistry> {
    Arc::new(
        SourceRegistry::init(ServiceProperties::default(), configs, &reqwest::Client::new())
            .await,
    )
}

pub async fn tile_service(configs: Vec<SourceConfiguration>) -> TileService {
    TileService::new(registry(configs).await)
}

// =============================================================================
// GeoTIFF Builder
// =============================================================================

const SHORT: u16 = 3;
const LONG: u16 = 4;
const DOUBLE: u16 = 12;

/// GeoKey directory declaring EPSG:3857.
pub fn mercator_geokeys() -> Vec<u16> {
    vec![1, 1, 0, 2, 1024, 0, 1, 1, PROJECTED_CS_TYPE, 0, 1, 3857]
}

/// GeoKey directory declaring EPSG:4326.
pub fn wgs84_geokeys() -> Vec<u16> {
    vec![1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326]
}

/// Little-endian tiled RGB GeoTIFF, 256x256 uncompressed tiles, every
/// pixel `color`.
pub fn create_geotiff(
    width: u32,
    height: u32,
    color: [u8; 3],
    tie_point: [f64; 6],
    scale: [f64; 3],
    geo_keys: &[u16],
) -> Vec<u8> {
    let tile = 256u32;
    let tiles = (width.div_ceil(tile) * height.div_ceil(tile)) as usize;
    let tile_data: Vec<u8> = color.repeat((tile * tile) as usize);

    let doubles = |v: &[f64]| v.iter().flat_map(|d| d.to_le_bytes()).collect::<Vec<u8>>();
    let shorts = |v: &[u16]| v.iter().flat_map(|s| s.to_le_bytes()).collect::<Vec<u8>>();

    let mut entries: Vec<(u16, u16, u32, Vec<u8>)> = vec![
        (256, LONG, 1, width.to_le_bytes().to_vec()),
        (257, LONG, 1, height.to_le_bytes().to_vec()),
        (258, SHORT, 3, shorts(&[8, 8, 8])),
        (259, SHORT, 1, shorts(&[1])),
        (262, SHORT, 1, shorts(&[2])),
        (277, SHORT, 1, shorts(&[3])),
        (284, SHORT, 1, shorts(&[1])),
        (322, LONG, 1, tile.to_le_bytes().to_vec()),
        (323, LONG, 1, tile.to_le_bytes().to_vec()),
        (324, LONG, tiles as u32, vec![0; tiles * 4]),
        (
            325,
            LONG,
            tiles as u32,
            (tile_data.len() as u32).to_le_bytes().repeat(tiles),
        ),
        (33550, DOUBLE, 3, doubles(&scale)),
        (33922, DOUBLE, 6, doubles(&tie_point)),
        (34735, SHORT, geo_keys.len() as u32, shorts(geo_keys)),
    ];

    let ifd_size = 2 + entries.len() * 12 + 4;
    let external: usize = entries
        .iter()
        .filter(|e| e.3.len() > 4)
        .map(|e| e.3.len())
        .sum();
    let first_tile = 8 + ifd_size + external;
    let offsets: Vec<u8> = (0..tiles)
        .flat_map(|i| ((first_tile + i * tile_data.len()) as u32).to_le_bytes())
        .collect();
    if let Some(entry) = entries.iter_mut().find(|e| e.0 == 324) {
        entry.3 = offsets;
    }

    let mut out = vec![0x49, 0x49, 42, 0];
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    let mut blobs = Vec::new();
    let mut next = 8 + ifd_size;
    for (tag, kind, count, payload) in &entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        if payload.len() <= 4 {
            let mut inline = payload.clone();
            inline.resize(4, 0);
            out.extend_from_slice(&inline);
        } else {
            out.extend_from_slice(&(next as u32).to_le_bytes());
            next += payload.len();
            blobs.extend_from_slice(payload);
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&blobs);
    for _ in 0..tiles {
        out.extend_from_slice(&tile_data);
    }
    out
}

// =============================================================================
// Upstream Tile Server
// =============================================================================

/// A local XYZ server answering `/tiles/{z}/{x}/{y}.png`.
///
/// Only the tiles it was built with exist; everything else is a 404.
pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct UpstreamState {
    tiles: Arc<Vec<((u32, u32, u8), Vec<u8>)>>,
    hits: Arc<AtomicUsize>,
}

async fn upstream_tile(
    State(state): State<UpstreamState>,
    UrlPath((z, x, file)): UrlPath<(u8, u32, String)>,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let y: Option<u32> = file.strip_suffix(".png").and_then(|y| y.parse().ok());
    let found = state
        .tiles
        .iter()
        .find(|((tx, ty, tz), _)| *tx == x && Some(*ty) == y && *tz == z);
    match found {
        Some((_, data)) => ([(header::CONTENT_TYPE, "image/png")], data.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

impl Upstream {
    pub async fn start(tiles: Vec<((u32, u32, u8), Vec<u8>)>) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = UpstreamState {
            tiles: Arc::new(tiles),
            hits: Arc::clone(&hits),
        };
        let router = Router::new()
            .route("/tiles/{z}/{x}/{file}", get(upstream_tile))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, hits }
    }

    /// URL template of the tile endpoint.
    pub fn template(&self) -> String {
        format!("http://{}/tiles/{{z}}/{{x}}/{{y}}.png", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
