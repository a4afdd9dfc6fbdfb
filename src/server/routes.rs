//! Router configuration.
//!
//! # Route Structure
//!
//! ```text
//! /health                                      - Health check
//! /slides                                      - List slides
//! /slides/{slide_id}                           - Slide metadata
//! /tiles/{slide_id}/{layer}/{col}/{row}.jpg    - Tile endpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dpt_streamer::server::{create_router, RouterConfig};
//! use dpt_streamer::slide::{LocalSlideSource, SlideRegistry};
//! use dpt_streamer::tile::TileService;
//!
//! let registry = SlideRegistry::new(LocalSlideSource::new("/data/slides"));
//! let tile_service = TileService::new(registry);
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://viewer.example.com".to_string()]);
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_handler, slide_metadata_handler, slides_handler, tile_handler, AppState,
};
use crate::slide::SlideSource;
use crate::tile::TileService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default CORS allows any origin, cache max-age is one hour and
    /// request tracing is enabled.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// An empty list disallows all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
pub fn create_router<S>(tile_service: TileService<S>, config: RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let app_state = AppState::with_cache_max_age(tile_service, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // {filename} captures both "{row}" and "{row}.jpg"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/slides", get(slides_handler::<S>))
        .route("/slides/{slide_id}", get(slide_metadata_handler::<S>))
        .route(
            "/tiles/{slide_id}/{layer}/{col}/{filename}",
            get(tile_handler::<S>),
        )
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
