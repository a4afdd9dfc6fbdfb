//! DPT Streamer - a tile server for DPTWSI whole-slide containers.
//!
//! This binary parses the configuration, wires the slide registry, tile
//! service and router together and serves HTTP.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dpt_streamer::{
    config::Config,
    server::{create_router, RouterConfig},
    slide::{LocalSlideSource, SlideRegistry, SlideSource},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("DPT Streamer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Slides dir: {}", config.slides_dir.display());
    info!(
        "  Tiles: {}px, JPEG quality {}",
        config.tile_size, config.jpeg_quality
    );
    info!(
        "  Cache: {} slides, {}MB / {} tiles",
        config.cache_slides,
        config.cache_tiles / (1024 * 1024),
        config.cache_tile_entries
    );

    let source = LocalSlideSource::new(&config.slides_dir);
    match source.list_slides().await {
        Ok(slides) if slides.is_empty() => {
            warn!("  No *.dpt slides found in {}", config.slides_dir.display());
        }
        Ok(slides) => info!("  Found {} slide(s)", slides.len()),
        Err(e) => {
            error!("Cannot read slides directory: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let registry = Arc::new(SlideRegistry::with_capacity(source, config.cache_slides));
    let tile_service = TileService::with_options(registry, config.tile_service_options());
    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Server listening on http://{}", addr);
    info!("  curl http://{}/slides", addr);
    info!("  curl http://{}/tiles/<slide_id>/0/0/0.jpg", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing subscriber; `RUST_LOG` overrides the default filter.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "dpt_streamer=debug,tower_http=debug"
    } else {
        "dpt_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
