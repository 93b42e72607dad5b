//! # Tile Map Service
//!
//! A map tile server. It serves Web-Mercator tiles from a configurable set
//! of sources and renders arbitrary map images by stitching those tiles.
//!
//! ## Features
//!
//! - **Sources**: local tile trees, MBTiles databases, upstream XYZ / TMS /
//!   WMTS / WMS servers, PostGIS tables (vector tiles) and tiled GeoTIFFs
//! - **Caching**: upstream tiles are kept in a deduplicated MBTiles store
//! - **Protocols**: XYZ, TMS, WMTS KVP `GetTile` and WMS `GetMap`
//! - **Map rendering**: multi-layer compositing, scaling and re-encoding
//!
//! ## Architecture
//!
//! - [`geo`] - Web-Mercator coordinate engine
//! - [`io`] - Positional readers for raster files
//! - [`mod@format`] - Tile formats, GeoTIFF and JPEG parsing
//! - [`raster`] - Tile extraction from georeferenced rasters
//! - [`store`] - MBTiles tile store
//! - [`source`] - Tile sources and the source registry
//! - [`render`] - WMS map compositor
//! - [`tile`] - Tile service and encoding
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and service file
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tile_map_service::{create_router, RouterConfig, ServiceFile, SourceRegistry, TileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let file = ServiceFile::load("service.json".as_ref()).unwrap();
//!     let registry =
//!         SourceRegistry::init(file.service, file.sources, &reqwest::Client::new()).await;
//!     let router = create_router(TileService::new(Arc::new(registry)), RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod geo;
pub mod io;
pub mod raster;
pub mod render;
pub mod server;
pub mod source;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ServeConfig, ServiceFile};
pub use error::{IoError, SourceError, StoreError, TiffError, TileError};
pub use format::TileFormat;
pub use geo::{flip_y, GeographicBounds, ProjectedBounds, Srid, TileCoordinate};
pub use raster::{RasterExtractor, RasterProperties};
pub use render::{MapCompositor, MapRequest};
pub use server::{create_router, AppState, ErrorResponse, Protocol, ProtocolError, RouterConfig};
pub use source::{
    BackendConfiguration, Layer, ServiceProperties, Source, SourceConfiguration, SourceRegistry,
    TileSource,
};
pub use store::{MetadataItem, TileStore};
pub use tile::{TileEncoder, TileResponse, TileService};
