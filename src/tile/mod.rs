//! Tile service layer.
//!
//! Output tiles are rendered from stitched regions, color corrected, encoded
//! as JPEG and cached.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  JPEG Encoder   │  │
//! │  │  (encoded    │  │  (composite →   │  │
//! │  │   JPEGs)     │  │   JPEG)         │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     SlideRegistry → Region Compositor   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use dpt_streamer::tile::{TileCache, TileCacheKey};
//! use dpt_streamer::TileError;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache: TileCache<TileError> = TileCache::with_capacity(50 * 1024 * 1024);
//!     let key = TileCacheKey::new("slides/sample.dpt", 0, 1, 2);
//!
//!     let (tile, cache_hit) = cache
//!         .get_or_try_insert_with(key, || async { Ok(Bytes::from_static(b"jpeg")) })
//!         .await
//!         .unwrap();
//!     assert!(!cache_hit);
//!     assert_eq!(tile.len(), 4);
//! }
//! ```

mod cache;
mod encoder;
mod service;

pub use cache::{TileCache, TileCacheKey, DEFAULT_MAX_ENTRIES, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use service::{
    TileRequest, TileResponse, TileService, TileServiceOptions, DEFAULT_TILE_SIZE,
};
