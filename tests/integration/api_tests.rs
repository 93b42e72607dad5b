//! API integration tests for the HTTP protocol layer.
//!
//! Tests verify:
//! - Health and layer listing
//! - XYZ, TMS and WMTS tile retrieval with row conventions and conversion
//! - WMS GetMap rendering
//! - HTTP status codes, headers and the error document of each protocol

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

use tile_map_service::geo::flip_y;
use tile_map_service::{create_router, RouterConfig};

use super::test_utils::{
    create_mbtiles, decode, is_valid_jpeg, is_valid_png, solid_png, source_config, tile_service,
    write_tile_tree, BLUE, RED,
};

/// Router over two layers:
/// - `base`: file tree with one blue tile at (0, 0, 0)
/// - `world`: MBTiles with one red tile at XYZ (1, 1, 2)
async fn test_router(dir: &TempDir) -> Router {
    let tree = dir.path().join("tree");
    write_tile_tree(&tree, &[((0, 0, 0), solid_png(BLUE))]);
    let db = dir.path().join("world.mbtiles");
    create_mbtiles(&db, &[((1, flip_y(1, 2), 2), solid_png(RED))]).await;

    let service = tile_service(vec![
        source_config(json!({
            "id": "base",
            "type": "file",
            "title": "Base map",
            "location": format!("{}/{{z}}/{{x}}/{{y}}.png", tree.display()),
        })),
        source_config(json!({ "id": "world", "type": "mbtiles", "location": db })),
    ])
    .await;

    create_router(service, RouterConfig::new().with_tracing(false))
}

async fn get(router: Router, uri: &str) -> (StatusCode, String, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, body.to_vec())
}

// =============================================================================
// Plain Endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (status, content_type, body) = get(test_router(&dir).await, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json");
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_layers() {
    let dir = TempDir::new().unwrap();
    let (status, _, body) = get(test_router(&dir).await, "/layers").await;

    assert_eq!(status, StatusCode::OK);
    let layers: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let layers = layers.as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0]["id"], "base");
    assert_eq!(layers[0]["title"], "Base map");
    assert_eq!(layers[0]["contentType"], "image/png");
    assert_eq!(layers[1]["id"], "world");
    assert_eq!(layers[1]["minZoom"], 2);
}

// =============================================================================
// XYZ
// =============================================================================

#[tokio::test]
async fn test_xyz_tile() {
    let dir = TempDir::new().unwrap();
    let request = Request::builder()
        .uri("/xyz/world/2/1/1.png")
        .body(Body::empty())
        .unwrap();
    let response = test_router(&dir).await.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(decode(&body).get_pixel(0, 0).0, RED);
}

#[tokio::test]
async fn test_xyz_tile_conversion_and_bare_row() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir).await;

    let (status, content_type, body) = get(router.clone(), "/xyz/base/0/0/0.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/jpeg");
    assert!(is_valid_jpeg(&body));

    let (status, content_type, body) = get(router, "/xyz/base/0/0/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/png");
    assert!(is_valid_png(&body));
}

#[tokio::test]
async fn test_xyz_errors() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir).await;

    let (status, content_type, body) = get(router.clone(), "/xyz/world/2/1/2.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(content_type, "application/json");
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "not_found");

    let (status, _, body) = get(router.clone(), "/xyz/missing/0/0/0.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(error["message"].as_str().unwrap().contains("missing"));

    let (status, _, body) = get(router.clone(), "/xyz/base/0/0/0.gif").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "invalid_request");

    let (status, _, _) = get(router, "/xyz/base/0/0/0.pbf").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// TMS
// =============================================================================

#[tokio::test]
async fn test_tms_tile_uses_bottom_rows() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir).await;

    // XYZ (1, 1, 2) is TMS row 2
    let (status, _, body) = get(router.clone(), "/tms/1.0.0/world/2/1/2.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decode(&body).get_pixel(0, 0).0, RED);

    let (status, content_type, body) = get(router, "/tms/1.0.0/world/2/1/1.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(content_type, "application/xml");
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("<TileMapServerError>"));
}

#[tokio::test]
async fn test_tms_out_of_range_and_unknown_layer() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir).await;

    let (status, _, _) = get(router.clone(), "/tms/1.0.0/world/2/9/0.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, content_type, body) = get(router, "/tms/1.0.0/nope/0/0/0.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(content_type, "application/xml");
    assert!(String::from_utf8(body).unwrap().contains("Layer not found: nope"));
}

// =============================================================================
// WMTS
// =============================================================================

#[tokio::test]
async fn test_wmts_get_tile() {
    let dir = TempDir::new().unwrap();
    let (status, content_type, body) = get(
        test_router(&dir).await,
        "/wmts?service=WMTS&request=GetTile&layer=world&tilematrixset=GoogleMapsCompatible\
         &tilematrix=EPSG:3857:2&tilerow=1&tilecol=1&format=image/png",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/png");
    assert_eq!(decode(&body).get_pixel(0, 0).0, RED);
}

#[tokio::test]
async fn test_wmts_errors() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir).await;

    let (status, content_type, body) = get(
        router.clone(),
        "/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=world&TILEMATRIX=2&TILECOL=1",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(content_type, "application/xml");
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("<ExceptionReport"));
    assert!(body.contains("exceptionCode=\"MissingParameterValue\""));
    assert!(body.contains("locator=\"TILEROW\""));

    let (status, _, body) = get(router.clone(), "/wmts?SERVICE=WMTS&REQUEST=GetCapabilities").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body)
        .unwrap()
        .contains("OperationNotSupported"));

    let (status, _, body) = get(
        router,
        "/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=world&TILEMATRIX=2&TILEROW=1&TILECOL=1\
         &FORMAT=image/gif",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("InvalidFormat"));
}

// =============================================================================
// WMS
// =============================================================================

const WORLD_BBOX: &str = "-20037508.342789244,-20037508.342789244,20037508.342789244,20037508.342789244";

#[tokio::test]
async fn test_wms_get_map() {
    let dir = TempDir::new().unwrap();
    let uri = format!(
        "/wms?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetMap&LAYERS=world&STYLES=\
         &SRS=EPSG:3857&BBOX={}&WIDTH=1024&HEIGHT=1024&FORMAT=image/png&BGCOLOR=0x0000FF",
        WORLD_BBOX
    );
    let (status, content_type, body) = get(test_router(&dir).await, &uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "image/png");
    let image = decode(&body);
    assert_eq!(image.dimensions(), (1024, 1024));
    assert_eq!(image.get_pixel(0, 0).0, BLUE);
    assert_eq!(image.get_pixel(384, 384).0, RED);
}

#[tokio::test]
async fn test_wms_errors() {
    let dir = TempDir::new().unwrap();
    let router = test_router(&dir).await;

    let uri = format!(
        "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=nope&BBOX={}&WIDTH=256&HEIGHT=256",
        WORLD_BBOX
    );
    let (status, content_type, body) = get(router.clone(), &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(content_type, "application/vnd.ogc.se_xml");
    let body = String::from_utf8(body).unwrap();
    assert!(body.contains("<ServiceExceptionReport"));
    assert!(body.contains("code=\"LayerNotDefined\""));

    let (status, _, body) = get(
        router.clone(),
        "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=world&BBOX=1,2,3&WIDTH=256&HEIGHT=256",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("InvalidParameterValue"));

    let uri = format!(
        "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=world&BBOX={}&WIDTH=99999&HEIGHT=256",
        WORLD_BBOX
    );
    let (status, _, _) = get(router.clone(), &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(
        router.clone(),
        "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=world&BBOX=-1e300,-1,1e300,1&WIDTH=256&HEIGHT=256",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = get(
        router.clone(),
        "/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=world&BBOX=0,0,inf,1&WIDTH=256&HEIGHT=256",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = get(router, "/wms?SERVICE=WFS&REQUEST=GetMap").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("Unsupported service"));
}
