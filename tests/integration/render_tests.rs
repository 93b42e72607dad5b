//! Map rendering integration tests.
//!
//! Tests verify:
//! - Full-world GetMap over a single-tile source
//! - Layer stacking in request order
//! - Transparent output and JPEG encoding
//! - Rejection of unknown and vector layers

use image::Rgba;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use tile_map_service::format::TileFormat;
use tile_map_service::geo::{flip_y, ProjectedBounds, Srid};
use tile_map_service::render::MapRequest;
use tile_map_service::tile::TileService;
use tile_map_service::TileError;

use super::test_utils::{
    create_mbtiles, decode, is_valid_jpeg, solid_png, source_config, tile_service,
    write_tile_tree, BLUE, RED,
};

const WORLD: f64 = 20037508.342789244;
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn world_request(layers: &[&str], size: u32) -> MapRequest {
    MapRequest {
        layers: layers.iter().map(|l| l.to_string()).collect(),
        srs: Srid::Epsg3857,
        bbox: ProjectedBounds::new(-WORLD, -WORLD, WORLD, WORLD),
        width: size,
        height: size,
        background: Rgba(WHITE),
        transparent: false,
        format: TileFormat::Png,
    }
}

/// One red tile at XYZ (1, 1, 2), stored in an MBTiles file.
async fn single_tile_service(dir: &TempDir) -> TileService {
    let path = dir.path().join("single.mbtiles");
    create_mbtiles(&path, &[((1, flip_y(1, 2), 2), solid_png(RED))]).await;
    tile_service(vec![source_config(json!({
        "id": "single",
        "type": "mbtiles",
        "location": path,
    }))])
    .await
}

#[tokio::test]
async fn test_world_map_from_single_tile() {
    let dir = TempDir::new().unwrap();
    let service = single_tile_service(&dir).await;

    let map = service
        .get_map(world_request(&["single"], 1024), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(map.content_type, "image/png");

    let image = decode(&map.data);
    assert_eq!(image.dimensions(), (1024, 1024));
    assert_eq!(image.get_pixel(0, 0).0, WHITE);
    assert_eq!(image.get_pixel(1000, 1000).0, WHITE);
    assert_eq!(image.get_pixel(384, 384).0, RED);
}

#[tokio::test]
async fn test_world_map_beyond_mercator_limit() {
    let dir = TempDir::new().unwrap();
    let service = single_tile_service(&dir).await;

    // Taller than the Mercator square and slightly narrower than the world
    let mut request = world_request(&["single"], 1024);
    request.bbox = ProjectedBounds::new(
        -20026376.39,
        -20048966.10,
        20026376.39,
        20048966.10,
    );
    let map = service
        .get_map(request, &CancellationToken::new())
        .await
        .unwrap();

    let image = decode(&map.data);
    assert_eq!(image.dimensions(), (1024, 1024));
    assert_eq!(image.get_pixel(0, 0).0, WHITE);
    assert_eq!(image.get_pixel(1000, 1000).0, WHITE);
    assert_eq!(image.get_pixel(384, 384).0, RED);
}

#[tokio::test]
async fn test_scaled_world_map() {
    let dir = TempDir::new().unwrap();
    let service = single_tile_service(&dir).await;

    // 512 px selects zoom 1, so the zoom-2 tile is not drawn
    let map = service
        .get_map(world_request(&["single"], 512), &CancellationToken::new())
        .await
        .unwrap();
    let image = decode(&map.data);
    assert_eq!(image.dimensions(), (512, 512));
    assert_eq!(image.get_pixel(192, 192).0, WHITE);
}

#[tokio::test]
async fn test_layers_stack_in_request_order() {
    let dir = TempDir::new().unwrap();
    let red_dir = dir.path().join("red");
    let blue_dir = dir.path().join("blue");
    write_tile_tree(&red_dir, &[((0, 0, 0), solid_png(RED))]);
    write_tile_tree(&blue_dir, &[((0, 0, 0), solid_png(BLUE))]);

    let service = tile_service(vec![
        source_config(json!({
            "id": "red",
            "type": "file",
            "location": format!("{}/{{z}}/{{x}}/{{y}}.png", red_dir.display()),
            "maxZoom": 0,
        })),
        source_config(json!({
            "id": "blue",
            "type": "file",
            "location": format!("{}/{{z}}/{{x}}/{{y}}.png", blue_dir.display()),
            "maxZoom": 0,
        })),
    ])
    .await;
    let cancel = CancellationToken::new();

    let map = service
        .get_map(world_request(&["red", "blue"], 256), &cancel)
        .await
        .unwrap();
    assert_eq!(decode(&map.data).get_pixel(128, 128).0, BLUE);

    let map = service
        .get_map(world_request(&["blue", "red"], 256), &cancel)
        .await
        .unwrap();
    assert_eq!(decode(&map.data).get_pixel(128, 128).0, RED);
}

#[tokio::test]
async fn test_transparent_and_jpeg_output() {
    let dir = TempDir::new().unwrap();
    let service = single_tile_service(&dir).await;
    let cancel = CancellationToken::new();

    let mut request = world_request(&["single"], 1024);
    request.transparent = true;
    let map = service.get_map(request, &cancel).await.unwrap();
    let image = decode(&map.data);
    assert_eq!(image.get_pixel(0, 0).0[3], 0);
    assert_eq!(image.get_pixel(384, 384).0, RED);

    let mut request = world_request(&["single"], 1024);
    request.format = TileFormat::Jpeg;
    let map = service.get_map(request, &cancel).await.unwrap();
    assert_eq!(map.content_type, "image/jpeg");
    assert!(is_valid_jpeg(&map.data));
}

#[tokio::test]
async fn test_rejected_requests() {
    let dir = TempDir::new().unwrap();
    let service = single_tile_service(&dir).await;
    let cancel = CancellationToken::new();

    assert!(matches!(
        service
            .get_map(world_request(&["nope"], 256), &cancel)
            .await,
        Err(TileError::SourceNotFound { .. })
    ));

    let mut request = world_request(&["single"], 256);
    request.srs = Srid::Epsg4326;
    assert!(matches!(
        service.get_map(request, &cancel).await,
        Err(TileError::InvalidRequest { .. })
    ));

    assert!(matches!(
        service
            .get_map(world_request(&["single"], 5000), &cancel)
            .await,
        Err(TileError::InvalidRequest { .. })
    ));

    let mut request = world_request(&["single"], 256);
    request.bbox = ProjectedBounds::new(-1e300, -1.0, 1e300, 1.0);
    assert!(matches!(
        service.get_map(request, &cancel).await,
        Err(TileError::InvalidRequest { .. })
    ));

    let mut request = world_request(&["single"], 256);
    request.bbox = ProjectedBounds::new(-WORLD, -WORLD, f64::INFINITY, WORLD);
    assert!(matches!(
        service.get_map(request, &cancel).await,
        Err(TileError::InvalidRequest { .. })
    ));

    let mut request = world_request(&["single"], 256);
    request.format = TileFormat::Webp;
    assert!(matches!(
        service.get_map(request, &cancel).await,
        Err(TileError::UnsupportedFormat { .. })
    ));
}
