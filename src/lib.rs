//! # DPT Streamer
//!
//! A tile server for DPTWSI whole-slide containers.
//!
//! A DPTWSI container stores a scanned slide as a pyramid of overlapping,
//! independently JPEG-encoded tiles at three pre-stored layers (downsample
//! 1, 4 and 16). This crate reads arbitrary pixel regions from such a
//! container and returns them as seamless composites: neighboring tiles are
//! blended across their overlap bands with a sigmoid ramp, and the result
//! is color calibrated with a fixed 3x3 matrix.
//!
//! ## Architecture
//!
//! - [`io`] - Positional range reads over local files
//! - [`mod@format`] - Container header and tile directory, JPEG payloads
//! - [`region`] - Region planning, compositing, seam fusion, color correction
//! - [`slide`] - Slide sources and the registry of opened slides
//! - [`tile`] - Output tile rendering, encoding and caching
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use dpt_streamer::{LocalSlideSource, RegionRequest, SlideRegistry, TileRequest, TileService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dpt_streamer::TileError> {
//!     let registry = SlideRegistry::new(LocalSlideSource::new("/data/slides"));
//!     let service = TileService::new(registry);
//!
//!     // A 1024x1024 region at layer 1, origin in full-resolution pixels
//!     let region = service
//!         .read_region("case-17.dpt", RegionRequest::new(8192, 4096, 1024, 1024, 1))
//!         .await?;
//!     println!("{}x{}, {} placeholders", region.width(), region.height(), region.placeholders);
//!
//!     // An encoded 512px tile
//!     let tile = service.get_tile(TileRequest::new("case-17.dpt", 0, 3, 5)).await?;
//!     println!("{} bytes, cache hit: {}", tile.data.len(), tile.cache_hit);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod region;
pub mod server;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::Config;
pub use error::{ContainerError, FetchError, IoError, TileError};
pub use format::{ContainerIndex, Header, TileKey, TileRecord};
pub use io::{LocalFileReader, RangeReader};
pub use region::{
    color_correct, fuse_tile, fuse_tile_bands, plan_region, read_region, ColorMatrix, Edges, Region,
    RegionPlan, RegionRequest, SeamBands, SlideGeometry, DEFAULT_CCM, MAX_LAYER, PLACEHOLDER_COLOR,
};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use slide::{LayerInfo, LocalSlideSource, Slide, SlideRegistry, SlideSource};
pub use tile::{
    JpegTileEncoder, TileCache, TileCacheKey, TileRequest, TileResponse, TileService,
    TileServiceOptions, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY, DEFAULT_TILE_SIZE,
};
