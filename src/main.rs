//! Tile Map Service - serves map tiles over XYZ, TMS, WMTS and WMS.
//!
//! This binary loads the service file, initializes the sources and starts
//! the HTTP server.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_map_service::{
    config::{CheckConfig, Cli, Command, ServeConfig, ServiceFile},
    server::{create_router, RouterConfig},
    source::SourceRegistry,
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let service_file = match ServiceFile::load(&config.config) {
        Ok(file) => file,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Tile Map Service v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Service file: {}", config.config.display());
    info!("  Title: {}", service_file.service.title);
    info!("  Sources configured: {}", service_file.sources.len());
    info!("  Upstream timeout: {}s", config.upstream_timeout);

    let http = match build_http_client(config.upstream_timeout()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry =
        SourceRegistry::init(service_file.service, service_file.sources, &http).await;
    if registry.is_empty() {
        warn!("No source initialized; every tile request will answer 404");
    }
    for layer in registry.layers() {
        info!(
            "  Layer {} ({}, zoom {}-{})",
            layer.id, layer.format, layer.min_zoom, layer.max_zoom
        );
    }

    let tile_service = TileService::new(Arc::new(registry));
    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/layers", addr);
    info!("    curl http://{}/xyz/<layer>/0/0/0.png", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_map_service=debug,tower_http=debug"
    } else {
        "tile_map_service=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Shared client for every upstream source.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tile-map-service/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Build RouterConfig from the ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Tile Map Service Configuration Check");
    println!("═════════════════════════════════════");
    println!();

    let service_file = match ServiceFile::load(&config.config) {
        Ok(file) => {
            println!("✓ Service file: {}", config.config.display());
            file
        }
        Err(e) => {
            println!("✗ Service file: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("  Title: {}", service_file.service.title);
    println!("  Sources configured: {}", service_file.sources.len());
    println!();

    let http = match build_http_client(Duration::from_secs(config.upstream_timeout)) {
        Ok(client) => client,
        Err(e) => {
            println!("✗ HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let kinds: Vec<(String, &'static str)> = service_file
        .sources
        .iter()
        .map(|s| (s.id.clone(), s.backend.type_name()))
        .collect();

    println!("Initializing sources...");
    let registry =
        SourceRegistry::init(service_file.service, service_file.sources, &http).await;

    println!();
    println!("{:<24} {:<8} {:<6} {:<8} STATUS", "ID", "TYPE", "FORMAT", "ZOOM");
    println!("{}", "─".repeat(64));
    for layer in registry.layers() {
        let kind = kinds
            .iter()
            .find(|(id, _)| *id == layer.id)
            .map(|(_, kind)| *kind)
            .unwrap_or("?");
        println!(
            "{:<24} {:<8} {:<6} {:<8} ✓ ok",
            layer.id,
            kind,
            layer.format.to_string(),
            format!("{}-{}", layer.min_zoom, layer.max_zoom)
        );
    }
    for (id, message) in registry.failures() {
        let kind = kinds
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, kind)| *kind)
            .unwrap_or("?");
        println!("{:<24} {:<8} {:<6} {:<8} ✗ {}", id, kind, "-", "-", message);
    }

    println!();
    println!("═════════════════════════════════════");
    if registry.failures().is_empty() {
        println!("✓ All {} source(s) initialized", registry.len());
        ExitCode::SUCCESS
    } else {
        println!(
            "✗ {} of {} source(s) failed",
            registry.failures().len(),
            registry.len() + registry.failures().len()
        );
        ExitCode::FAILURE
    }
}
