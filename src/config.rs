//! Configuration management.
//!
//! Two layers:
//! - Command-line arguments via clap, each overridable by an environment
//!   variable with the `TMS_` prefix
//! - A JSON service file describing the service and its sources
//!
//! # Environment Variables
//!
//! - `TMS_HOST` - Server bind address (default: 0.0.0.0)
//! - `TMS_PORT` - Server port (default: 8080)
//! - `TMS_CONFIG` - Path of the service file (default: service.json)
//! - `TMS_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `TMS_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `TMS_UPSTREAM_TIMEOUT` - Upstream request timeout seconds (default: 30)
//!
//! # Service File
//!
//! ```json
//! {
//!   "service": { "title": "My tiles", "jpegQuality": 85 },
//!   "sources": [
//!     { "id": "world", "type": "mbtiles", "location": "/data/world.mbtiles" },
//!     { "id": "osm", "type": "xyz",
//!       "location": "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
//!       "cache": { "dbFile": "/var/cache/osm.mbtiles" } }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing::warn;

use crate::server::handlers::DEFAULT_CACHE_MAX_AGE;
use crate::source::{ServiceProperties, SourceConfiguration, DEFAULT_UPSTREAM_TIMEOUT};
use crate::tile::is_valid_quality;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default service file path.
pub const DEFAULT_CONFIG_PATH: &str = "service.json";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Map Service - serves raster and vector map tiles over XYZ, TMS,
/// WMTS and WMS.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-map-service")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server.
    Serve(ServeConfig),

    /// Initialize every configured source and report its status.
    Check(CheckConfig),
}

/// Arguments of the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TMS_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TMS_PORT")]
    pub port: u16,

    /// Path of the JSON service file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "TMS_CONFIG")]
    pub config: PathBuf,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TMS_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TMS_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Timeout of requests to upstream tile servers, in seconds.
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT.as_secs(), env = "TMS_UPSTREAM_TIMEOUT")]
    pub upstream_timeout: u64,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("host must not be empty".to_string());
        }
        if self.upstream_timeout == 0 {
            return Err("upstream_timeout must be greater than 0".to_string());
        }
        if self.config.as_os_str().is_empty() {
            return Err("Service file path is required. Set --config or TMS_CONFIG".to_string());
        }
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }
}

/// Arguments of the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    /// Path of the JSON service file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "TMS_CONFIG")]
    pub config: PathBuf,

    /// Timeout of requests to upstream tile servers, in seconds.
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT.as_secs(), env = "TMS_UPSTREAM_TIMEOUT")]
    pub upstream_timeout: u64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Service File
// =============================================================================

/// Contents of the JSON service file.
#[derive(Debug, Clone, Default)]
pub struct ServiceFile {
    pub service: ServiceProperties,
    pub sources: Vec<SourceConfiguration>,
}

#[derive(Deserialize)]
struct RawServiceFile {
    #[serde(default)]
    service: ServiceProperties,
    #[serde(default)]
    sources: Vec<serde_json::Value>,
}

impl ServiceFile {
    /// Read and parse a service file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::parse(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }

    /// Parse service file JSON.
    ///
    /// Each source entry is parsed on its own: an entry with an unknown
    /// `type` or malformed fields is logged and skipped instead of failing
    /// the whole file.
    pub fn parse(text: &str) -> Result<Self, String> {
        let raw: RawServiceFile =
            serde_json::from_str(text).map_err(|e| format!("Invalid service file: {}", e))?;

        if !is_valid_quality(raw.service.jpeg_quality) {
            return Err(format!(
                "jpegQuality must be between 1 and 100, got {}",
                raw.service.jpeg_quality
            ));
        }

        let mut sources = Vec::with_capacity(raw.sources.len());
        for (position, entry) in raw.sources.into_iter().enumerate() {
            let id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            match serde_json::from_value::<SourceConfiguration>(entry) {
                Ok(source) => sources.push(source),
                Err(e) => warn!(
                    source_id = %id,
                    position,
                    error = %e,
                    "Skipping unparseable source entry"
                ),
            }
        }

        Ok(Self {
            service: raw.service,
            sources,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
