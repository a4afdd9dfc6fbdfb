//! HTTP server layer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        GET /tiles/{slide_id}/{layer}/{col}/{row}.jpg            │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌────────────────────────────┐   │
//! │  │        handlers          │  │          routes            │   │
//! │  │ (requests, error JSON)   │  │ (router, CORS, tracing)    │   │
//! │  └──────────────────────────┘  └────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, slide_metadata_handler, slides_handler, tile_handler, AppState, ErrorResponse,
    HealthResponse, LayerMetadataResponse, SlideMetadataResponse, SlidesResponse, TilePathParams,
    CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig};
