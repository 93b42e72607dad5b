//! GeoTIFF source integration tests.
//!
//! Tests verify:
//! - Bounds derived from the tie point and pixel scale
//! - Web tiles cut from a Web-Mercator raster on disk
//! - Layer bounds from a WGS84 raster
//! - Rejection of unreadable rasters at registry load

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tile_map_service::format::TileFormat;
use tile_map_service::geo::Srid;
use tile_map_service::source::{Source, TileSource};

use super::test_utils::{
    create_geotiff, decode, is_valid_png, mercator_geokeys, registry, source_config,
    wgs84_geokeys,
};

async fn open_raster(dir: &TempDir, name: &str, bytes: Vec<u8>) -> Source {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    Source::init(
        source_config(json!({ "id": name, "type": "geotiff", "location": path })),
        &reqwest::Client::new(),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_mercator_raster_tiles() {
    let dir = TempDir::new().unwrap();
    let bytes = create_geotiff(
        512,
        512,
        [255, 0, 0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [10.0, 10.0, 0.0],
        &mercator_geokeys(),
    );
    let source = open_raster(&dir, "red.tif", bytes).await;

    let Source::GeoTiff(raster) = &source else {
        panic!("expected a GeoTIFF source");
    };
    let props = raster.extractor().properties();
    assert_eq!(props.srid, Srid::Epsg3857);
    assert_eq!(props.extent.left, 0.0);
    assert_eq!(props.extent.top, 0.0);

    let config = source.configuration();
    assert_eq!(config.format(), TileFormat::Png);
    assert!(!config.tms());

    let cancel = CancellationToken::new();
    let tile = source.get_tile(4096, 4096, 13, &cancel).await.unwrap().unwrap();
    assert!(is_valid_png(&tile));
    let image = decode(&tile);
    assert_eq!(image.dimensions(), (256, 256));
    assert_eq!(image.get_pixel(10, 10).0, [255, 0, 0, 255]);
    assert!(source.get_tile(4000, 4000, 13, &cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn test_wgs84_raster_bounds() {
    let dir = TempDir::new().unwrap();
    let bytes = create_geotiff(
        360,
        170,
        [0, 255, 0],
        [0.0, 0.0, 0.0, -180.0, 85.0, 0.0],
        [1.0, 1.0, 0.0],
        &wgs84_geokeys(),
    );
    let source = open_raster(&dir, "green.tif", bytes).await;

    let layer = source.configuration().layer();
    assert_eq!(layer.bounds.min_lon, -180.0);
    assert_eq!(layer.bounds.max_lon, 180.0);
    assert_eq!(layer.bounds.max_lat, 85.0);
    assert_eq!(layer.bounds.min_lat, -85.0);

    let tile = source
        .get_tile(0, 0, 0, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decode(&tile).get_pixel(128, 128).0, [0, 255, 0, 255]);
}

#[tokio::test]
async fn test_bad_rasters_are_skipped() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("garbage.tif");
    std::fs::write(&garbage, b"definitely not a tiff").unwrap();
    let utm = dir.path().join("utm.tif");
    std::fs::write(
        &utm,
        create_geotiff(
            256,
            256,
            [0, 0, 0],
            [0.0; 6],
            [1.0, 1.0, 0.0],
            &[1, 1, 0, 1, 3072, 0, 1, 32633],
        ),
    )
    .unwrap();

    let registry = registry(vec![
        source_config(json!({ "id": "garbage", "type": "geotiff", "location": garbage })),
        source_config(json!({ "id": "utm", "type": "geotiff", "location": utm })),
        source_config(json!({ "id": "gone", "type": "geotiff", "location": "/no/such.tif" })),
    ])
    .await;

    assert!(registry.is_empty());
    assert_eq!(registry.failures().len(), 3);
}
