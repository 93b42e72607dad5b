//! Tile source integration tests.
//!
//! Tests verify:
//! - File trees and MBTiles files in XYZ coordinates
//! - Upstream proxying against a local tile server, with write-through cache
//! - Zoom range short-circuiting
//! - Registry behavior with a mix of good and broken sources

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tile_map_service::format::TileFormat;
use tile_map_service::geo::flip_y;
use tile_map_service::source::{Source, TileSource};
use tile_map_service::store::TileStore;

use super::test_utils::{
    create_mbtiles, decode, gradient_png, registry, solid_png, source_config, write_tile_tree,
    Upstream, BLUE, RED,
};

// =============================================================================
// Local Sources
// =============================================================================

#[tokio::test]
async fn test_single_tile_mbtiles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("world.mbtiles");
    create_mbtiles(&path, &[((0, 0, 0), solid_png(RED))]).await;

    let source = Source::init(
        source_config(json!({
            "id": "world",
            "type": "mbtiles",
            "location": path.display().to_string(),
        })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let cancel = CancellationToken::new();

    let tile = source.get_tile(0, 0, 0, &cancel).await.unwrap().unwrap();
    assert_eq!(decode(&tile).get_pixel(0, 0).0, RED);
    assert!(source.get_tile(0, 0, 1, &cancel).await.unwrap().is_none());

    let config = source.configuration();
    assert_eq!(config.format(), TileFormat::Png);
    assert_eq!((config.min_zoom(), config.max_zoom()), (0, 0));
    assert!(config.tms());
}

#[tokio::test]
async fn test_mbtiles_rows_are_flipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rows.mbtiles");
    // XYZ (1, 0, 2) is TMS row 3
    create_mbtiles(&path, &[((1, flip_y(0, 2), 2), solid_png(BLUE))]).await;

    let source = Source::init(
        source_config(json!({ "id": "rows", "type": "mbtiles", "location": path })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let cancel = CancellationToken::new();

    assert!(source.get_tile(1, 0, 2, &cancel).await.unwrap().is_some());
    assert!(source.get_tile(1, 3, 2, &cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_tree_with_tms_rows() {
    let dir = TempDir::new().unwrap();
    write_tile_tree(dir.path(), &[((0, 0, 1), solid_png(RED))]);

    let template = format!("{}/{{z}}/{{x}}/{{y}}.png", dir.path().display());
    let xyz = Source::init(
        source_config(json!({ "id": "xyz", "type": "file", "location": template })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let tms = Source::init(
        source_config(json!({ "id": "tms", "type": "file", "location": template, "tms": true })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let cancel = CancellationToken::new();

    assert!(xyz.get_tile(0, 0, 1, &cancel).await.unwrap().is_some());
    assert!(xyz.get_tile(0, 1, 1, &cancel).await.unwrap().is_none());
    assert!(tms.get_tile(0, 1, 1, &cancel).await.unwrap().is_some());
    assert!(tms.get_tile(0, 0, 1, &cancel).await.unwrap().is_none());
}

// =============================================================================
// HTTP Proxy
// =============================================================================

#[tokio::test]
async fn test_xyz_proxy_with_write_through_cache() {
    let upstream = Upstream::start(vec![((1, 0, 1), gradient_png(9))]).await;
    let dir = TempDir::new().unwrap();
    let db_file = dir.path().join("cache").join("osm.mbtiles");

    let source = Source::init(
        source_config(json!({
            "id": "osm",
            "type": "xyz",
            "location": upstream.template(),
            "cache": { "dbFile": db_file },
        })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let cancel = CancellationToken::new();

    let first = source.get_tile(1, 0, 1, &cancel).await.unwrap().unwrap();
    assert_eq!(first.as_ref(), gradient_png(9).as_slice());
    assert_eq!(upstream.hits(), 1);

    // Served from the cache, stored at the TMS row
    let second = source.get_tile(1, 0, 1, &cancel).await.unwrap().unwrap();
    assert_eq!(second, first);
    assert_eq!(upstream.hits(), 1);
    let store = TileStore::open(&db_file).await.unwrap();
    assert!(store.read_tile(1, 1, 1).await.unwrap().is_some());

    // Upstream 404 is an absent tile and is not cached
    assert!(source.get_tile(0, 0, 1, &cancel).await.unwrap().is_none());
    assert_eq!(upstream.hits(), 2);
    assert!(store.read_tile(0, 1, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_tms_proxy_requests_flipped_rows() {
    let upstream = Upstream::start(vec![((0, 0, 1), solid_png(RED))]).await;

    let source = Source::init(
        source_config(json!({ "id": "tms", "type": "tms", "location": upstream.template() })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let cancel = CancellationToken::new();

    // XYZ row 1 at zoom 1 is TMS row 0
    assert!(source.get_tile(0, 1, 1, &cancel).await.unwrap().is_some());
    assert!(source.get_tile(0, 0, 1, &cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn test_proxy_zoom_range_short_circuits() {
    let upstream = Upstream::start(vec![((0, 0, 0), solid_png(RED))]).await;

    let source = Source::init(
        source_config(json!({
            "id": "limited",
            "type": "xyz",
            "location": upstream.template(),
            "minZoom": 1,
            "maxZoom": 3,
        })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();
    let cancel = CancellationToken::new();

    assert!(source.get_tile(0, 0, 0, &cancel).await.unwrap().is_none());
    assert!(source.get_tile(0, 0, 4, &cancel).await.unwrap().is_none());
    assert_eq!(upstream.hits(), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_is_an_error() {
    // Bind then drop a listener to get a port nothing answers on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = Source::init(
        source_config(json!({
            "id": "down",
            "type": "xyz",
            "location": format!("http://{}/{{z}}/{{x}}/{{y}}.png", addr),
        })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap();

    let result = source.get_tile(0, 0, 0, &CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(tile_map_service::TileError::Upstream { .. })
    ));
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn test_registry_keeps_good_sources_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.mbtiles");
    create_mbtiles(&path, &[((0, 0, 0), solid_png(RED))]).await;
    let template = format!("{}/{{z}}/{{x}}/{{y}}.png", dir.path().display());

    let registry = registry(vec![
        source_config(json!({ "id": "b", "type": "file", "location": template })),
        source_config(json!({ "id": "missing", "type": "mbtiles", "location": "/nope.mbtiles" })),
        source_config(json!({ "id": "a", "type": "mbtiles", "location": path })),
        source_config(json!({ "id": "badurl", "type": "xyz", "location": "ftp://x/{z}/{x}/{y}" })),
    ])
    .await;

    let ids: Vec<String> = registry.layers().into_iter().map(|l| l.id).collect();
    assert_eq!(ids, vec!["b", "a"]);
    let failed: Vec<&str> = registry.failures().iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(failed, vec!["missing", "badurl"]);
}
