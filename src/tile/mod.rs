//! Tile service layer.
//!
//! Sits between the protocol handlers and the sources:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         HTTP Handlers (server)          │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ TileEncoder  │  │  MapCompositor  │  │
//! │  │ (PNG / JPEG) │  │  (GetMap)       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             SourceRegistry              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: tile and map requests
//! - [`TileEncoder`]: PNG/JPEG decoding, encoding and format conversion
//! - [`canvas`]: stitching and scaling helpers shared with the raster module

pub mod canvas;
mod encoder;
mod service;

pub use encoder::{
    clamp_quality, is_valid_quality, TileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use service::{TileResponse, TileService};
