//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      /xyz  /tms/1.0.0  /wmts  /wms  /layers  /health            │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │ exceptions  │  │        routes           │  │
//! │  │ (requests)  │  │ (JSON, XML) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod exceptions;
pub mod handlers;
pub mod routes;

pub use exceptions::{ErrorDetails, ErrorResponse, Protocol, ProtocolError};
pub use handlers::{
    health_handler, layers_handler, tms_tile_handler, wms_handler, wmts_handler,
    xyz_tile_handler, AppState, HealthResponse, KvpParams, TilePathParams,
};
pub use routes::{create_router, RouterConfig};
