//! HTTP request handlers.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /layers` - Layer listing
//! - `GET /xyz/{layer}/{z}/{x}/{y}.{ext}` - XYZ tile
//! - `GET /tms/1.0.0/{layer}/{z}/{x}/{y}.{ext}` - TMS tile (row 0 at the bottom)
//! - `GET /wmts?REQUEST=GetTile&...` - WMTS KVP tile
//! - `GET /wms?REQUEST=GetMap&...` - WMS map rendering
//!
//! Every handler owns a cancellation token whose drop guard fires when the
//! client goes away and axum drops the handler future, which aborts
//! in-flight upstream fetches.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use image::Rgba;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TileError;
use crate::format::TileFormat;
use crate::geo::{flip_y, ProjectedBounds, Srid, TileCoordinate};
use crate::render::MapRequest;
use crate::source::Layer;
use crate::tile::{TileResponse, TileService};

use super::exceptions::{ErrorDetails, Protocol, ProtocolError};

/// Default Cache-Control max-age for images, in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Application State
// =============================================================================

/// Shared state of all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl AppState {
    pub fn new(tile_service: TileService) -> Self {
        Self::with_cache_max_age(tile_service, DEFAULT_CACHE_MAX_AGE)
    }

    pub fn with_cache_max_age(tile_service: TileService, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }

    fn image_response(&self, tile: TileResponse) -> Response {
        (
            [
                (header::CONTENT_TYPE, tile.content_type.to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", self.cache_max_age),
                ),
            ],
            tile.data,
        )
            .into_response()
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters of the XYZ and TMS tile endpoints.
///
/// `filename` is the row with an optional extension selecting the output
/// format: `5` or `5.png`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer: String,
    pub z: u8,
    pub x: u32,
    pub filename: String,
}

impl TilePathParams {
    /// Row and requested format.
    pub fn row_and_format(&self) -> Result<(u32, Option<TileFormat>), TileError> {
        let (row, format) = match self.filename.split_once('.') {
            Some((row, extension)) => {
                let format = TileFormat::parse(extension).ok_or_else(|| {
                    TileError::invalid_request(format!("unknown tile extension '{}'", extension))
                })?;
                (row, Some(format))
            }
            None => (self.filename.as_str(), None),
        };
        let row = row
            .parse()
            .map_err(|_| TileError::invalid_request(format!("invalid tile row '{}'", row)))?;
        Ok((row, format))
    }
}

/// Query parameters of an OGC KVP request. Keys are case-insensitive.
#[derive(Debug, Default)]
pub struct KvpParams(HashMap<String, String>);

impl KvpParams {
    pub fn new(raw: HashMap<String, String>) -> Self {
        Self(
            raw.into_iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn require(&self, protocol: Protocol, key: &'static str) -> Result<&str, ProtocolError> {
        self.get(key)
            .ok_or_else(|| ProtocolError::missing(protocol, key))
    }

    fn parse<T: std::str::FromStr>(
        &self,
        protocol: Protocol,
        key: &'static str,
    ) -> Result<T, ProtocolError> {
        let value = self.require(protocol, key)?;
        value.trim().parse().map_err(|_| {
            ProtocolError::parameter(protocol, key, format!("Invalid {} '{}'", key, value))
        })
    }

    /// Check `SERVICE` (when given) and that `REQUEST` is `operation`.
    fn expect_operation(
        &self,
        protocol: Protocol,
        service: &str,
        operation: &str,
    ) -> Result<(), ProtocolError> {
        if let Some(value) = self.get("SERVICE") {
            if !value.eq_ignore_ascii_case(service) {
                return Err(ProtocolError::parameter(
                    protocol,
                    "SERVICE",
                    format!("Unsupported service '{}'", value),
                ));
            }
        }
        let request = self.require(protocol, "REQUEST")?;
        if !request.eq_ignore_ascii_case(operation) {
            return Err(ProtocolError::unsupported_operation(protocol, request));
        }
        Ok(())
    }

    fn format(&self, protocol: Protocol) -> Result<Option<TileFormat>, ProtocolError> {
        match self.get("FORMAT") {
            None => Ok(None),
            Some(value) => TileFormat::parse(value).map(Some).ok_or_else(|| {
                let mut err = ProtocolError::parameter(
                    protocol,
                    "FORMAT",
                    format!("Unsupported format '{}'", value),
                );
                err.details.ogc_code = "InvalidFormat";
                err
            }),
        }
    }
}

/// Parse a `0xRRGGBB` color.
fn parse_color(value: &str) -> Option<Rgba<u8>> {
    let hex_digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .or_else(|| value.strip_prefix('#'))
        .unwrap_or(value);
    let bytes = hex::decode(hex_digits).ok()?;
    match bytes.as_slice() {
        &[r, g, b] => Some(Rgba([r, g, b, 255])),
        _ => None,
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /layers`: every initialized source, in configuration order.
pub async fn layers_handler(State(state): State<AppState>) -> Json<Vec<Layer>> {
    Json(state.tile_service.registry().layers())
}

/// `GET /xyz/{layer}/{z}/{x}/{y}.{ext}`
///
/// - `200 OK`: tile image
/// - `404 Not Found`: unknown layer or absent tile
/// - `400 Bad Request`: malformed row or extension, impossible conversion
pub async fn xyz_tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, TileError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let (y, format) = params.row_and_format()?;
    let tile = state
        .tile_service
        .get_tile(&params.layer, params.x, y, params.z, format, &cancel)
        .await?;

    Ok(match tile {
        Some(tile) => state.image_response(tile),
        None => ErrorDetails::tile_not_found().into_response(),
    })
}

/// `GET /tms/1.0.0/{layer}/{z}/{x}/{y}.{ext}`
///
/// Rows count from the bottom. Errors are `TileMapServerError` documents.
pub async fn tms_tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, ProtocolError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let (tms_y, format) = params
        .row_and_format()
        .map_err(|e| ProtocolError::new(Protocol::Tms, e))?;
    if !TileCoordinate::new(params.x, tms_y, params.z).is_valid() {
        return Err(ProtocolError::tile_not_found(Protocol::Tms));
    }

    let tile = state
        .tile_service
        .get_tile(
            &params.layer,
            params.x,
            flip_y(tms_y, params.z),
            params.z,
            format,
            &cancel,
        )
        .await
        .map_err(|e| ProtocolError::new(Protocol::Tms, e))?;

    tile.map(|tile| state.image_response(tile))
        .ok_or_else(|| ProtocolError::tile_not_found(Protocol::Tms))
}

/// `GET /wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=..&TILEMATRIX=..&TILEROW=..&TILECOL=..`
///
/// `TILEMATRIX` is the zoom, optionally prefixed (`EPSG:3857:5`). Rows
/// count from the top. Errors are OWS `ExceptionReport` documents.
pub async fn wmts_handler(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Response, ProtocolError> {
    const P: Protocol = Protocol::Wmts;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let kvp = KvpParams::new(raw);
    kvp.expect_operation(P, "WMTS", "GetTile")?;

    let layer = kvp.require(P, "LAYER")?.to_string();
    let matrix = kvp.require(P, "TILEMATRIX")?;
    let z: u8 = matrix
        .rsplit(':')
        .next()
        .and_then(|z| z.trim().parse().ok())
        .ok_or_else(|| {
            ProtocolError::parameter(P, "TILEMATRIX", format!("Invalid TILEMATRIX '{}'", matrix))
        })?;
    let y: u32 = kvp.parse(P, "TILEROW")?;
    let x: u32 = kvp.parse(P, "TILECOL")?;
    let format = kvp.format(P)?;

    if !TileCoordinate::new(x, y, z).is_valid() {
        return Err(ProtocolError::tile_not_found(P));
    }

    let tile = state
        .tile_service
        .get_tile(&layer, x, y, z, format, &cancel)
        .await
        .map_err(|e| ProtocolError::new(P, e))?;

    tile.map(|tile| state.image_response(tile))
        .ok_or_else(|| ProtocolError::tile_not_found(P))
}

/// `GET /wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=..&BBOX=..&WIDTH=..&HEIGHT=..`
///
/// Optional: `FORMAT` (default PNG), `SRS`/`CRS` (default EPSG:3857),
/// `BGCOLOR` (`0xRRGGBB`, default white), `TRANSPARENT`. Errors are
/// `ServiceExceptionReport` documents.
pub async fn wms_handler(
    State(state): State<AppState>,
    Query(raw): Query<HashMap<String, String>>,
) -> Result<Response, ProtocolError> {
    const P: Protocol = Protocol::Wms;
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let kvp = KvpParams::new(raw);
    kvp.expect_operation(P, "WMS", "GetMap")?;

    let request = map_request(&kvp)?;
    let map = state
        .tile_service
        .get_map(request, &cancel)
        .await
        .map_err(|e| ProtocolError::new(P, e))?;

    Ok(state.image_response(map))
}

fn map_request(kvp: &KvpParams) -> Result<MapRequest, ProtocolError> {
    const P: Protocol = Protocol::Wms;

    let layers: Vec<String> = kvp
        .require(P, "LAYERS")?
        .split(',')
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let bbox_value = kvp.require(P, "BBOX")?;
    let bbox: Vec<f64> = bbox_value
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ProtocolError::parameter(P, "BBOX", format!("Invalid BBOX '{}'", bbox_value)))?;
    let &[left, bottom, right, top] = bbox.as_slice() else {
        return Err(ProtocolError::parameter(
            P,
            "BBOX",
            "BBOX needs four comma-separated numbers",
        ));
    };

    let srs = match kvp.get("SRS").or_else(|| kvp.get("CRS")) {
        None => Srid::Epsg3857,
        Some(value) => Srid::parse(value).ok_or_else(|| {
            let mut err =
                ProtocolError::parameter(P, "SRS", format!("Unsupported SRS '{}'", value));
            err.details.ogc_code = "InvalidSRS";
            err
        })?,
    };

    let background = match kvp.get("BGCOLOR") {
        None => Rgba([255, 255, 255, 255]),
        Some(value) => parse_color(value).ok_or_else(|| {
            ProtocolError::parameter(P, "BGCOLOR", format!("Invalid BGCOLOR '{}'", value))
        })?,
    };

    Ok(MapRequest {
        layers,
        srs,
        bbox: ProjectedBounds::new(left, bottom, right, top),
        width: kvp.parse(P, "WIDTH")?,
        height: kvp.parse(P, "HEIGHT")?,
        background,
        transparent: kvp.get("TRANSPARENT").map(parse_bool).unwrap_or(false),
        format: kvp.format(P)?.unwrap_or(TileFormat::Png),
    })
}
