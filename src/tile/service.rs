//! Tile Service: the public read entrypoint.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  get_tile()                                                     │
//! │  1. Validate layer      4. Read region T×T at layer             │
//! │  2. Cache lookup        5. Color correct, pad to T×T            │
//! │  3. Get slide           6. Encode, cache & return               │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │ SlideRegistry│    │ JpegTileEncoder  │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Output tiles are addressed by `(layer, row, col)` in units of the
//! service's tile size `T`. Tile `(row, col)` at `layer` covers
//! full-resolution origin `(col·T·4^layer, row·T·4^layer)`.

use std::sync::Arc;

use bytes::Bytes;
use image::{imageops, DynamicImage, RgbImage};
use tracing::debug;

use crate::error::TileError;
use crate::region::{
    color_correct, layer_factor, validate_layer, ColorMatrix, Region, RegionRequest,
    DEFAULT_CCM, PLACEHOLDER_COLOR,
};
use crate::slide::{SlideRegistry, SlideSource};

use super::cache::{TileCache, TileCacheKey, DEFAULT_MAX_ENTRIES, DEFAULT_TILE_CACHE_CAPACITY};
use super::encoder::{JpegTileEncoder, DEFAULT_JPEG_QUALITY};

/// Default output tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

// =============================================================================
// Tile Request / Response
// =============================================================================

/// A request for an output tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    pub slide_id: String,

    /// Pyramid layer (0 = full resolution)
    pub layer: u32,

    /// Tile row (0-indexed from top)
    pub row: u32,

    /// Tile column (0-indexed from left)
    pub col: u32,
}

impl TileRequest {
    pub fn new(slide_id: impl Into<String>, layer: u32, row: u32, col: u32) -> Self {
        Self {
            slide_id: slide_id.into(),
            layer,
            row,
            col,
        }
    }
}

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The encoded JPEG tile data
    pub data: Bytes,

    /// Whether this tile was served from cache
    pub cache_hit: bool,
}

// =============================================================================
// Options
// =============================================================================

/// Tunables of a [`TileService`].
#[derive(Debug, Clone)]
pub struct TileServiceOptions {
    /// Output tile edge length in pixels
    pub tile_size: u32,
    pub jpeg_quality: u8,
    /// Tile cache capacity in bytes
    pub cache_capacity: usize,
    pub cache_max_entries: usize,
    pub color_matrix: ColorMatrix,
}

impl Default for TileServiceOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
            color_matrix: DEFAULT_CCM,
        }
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for generating and caching output tiles.
pub struct TileService<S: SlideSource> {
    registry: Arc<SlideRegistry<S>>,

    /// Cache for encoded tiles
    cache: TileCache,

    encoder: JpegTileEncoder,

    tile_size: u32,

    color_matrix: ColorMatrix,
}

impl<S: SlideSource> TileService<S> {
    /// Create a new tile service with default settings.
    pub fn new(registry: SlideRegistry<S>) -> Self {
        Self::with_options(Arc::new(registry), TileServiceOptions::default())
    }

    /// Create a new tile service with custom cache capacity in bytes.
    pub fn with_cache_capacity(registry: SlideRegistry<S>, cache_capacity: usize) -> Self {
        Self::with_options(
            Arc::new(registry),
            TileServiceOptions {
                cache_capacity,
                ..TileServiceOptions::default()
            },
        )
    }

    /// Create a tile service over a shared registry.
    pub fn with_options(registry: Arc<SlideRegistry<S>>, options: TileServiceOptions) -> Self {
        Self {
            registry,
            cache: TileCache::with_capacity_and_entries(
                options.cache_capacity,
                options.cache_max_entries,
            ),
            encoder: JpegTileEncoder::new(options.jpeg_quality),
            tile_size: options.tile_size.max(1),
            color_matrix: options.color_matrix,
        }
    }

    /// Get a tile, using the cache when available.
    ///
    /// A cache hit never touches the container. Concurrent misses for the
    /// same tile are rendered once.
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        validate_layer(request.layer)?;

        let key = TileCacheKey::new(
            request.slide_id.as_str(),
            request.layer,
            request.row,
            request.col,
        );

        let (data, cache_hit) = self
            .cache
            .get_or_try_insert_with(key, || self.generate_tile(&request))
            .await?;

        Ok(TileResponse { data, cache_hit })
    }

    /// Render a tile without consulting the cache.
    pub async fn generate_tile(&self, request: &TileRequest) -> Result<Bytes, TileError> {
        validate_layer(request.layer)?;

        let (x, y) = self.tile_origin(request)?;
        let region = self
            .read_region(
                &request.slide_id,
                RegionRequest::new(x, y, self.tile_size, self.tile_size, request.layer),
            )
            .await?;

        debug!(
            slide_id = %request.slide_id,
            layer = request.layer,
            row = request.row,
            col = request.col,
            width = region.width(),
            height = region.height(),
            tiles = region.tiles,
            placeholders = region.placeholders,
            "Rendered tile"
        );

        let tile_size = self.tile_size;
        let matrix = self.color_matrix;
        let encoder = self.encoder;
        tokio::task::spawn_blocking(move || {
            let corrected = color_correct(&DynamicImage::ImageRgb8(region.image), &matrix)?;
            let mut canvas = RgbImage::from_pixel(tile_size, tile_size, PLACEHOLDER_COLOR);
            imageops::replace(&mut canvas, &corrected, 0, 0);
            encoder.encode(&canvas)
        })
        .await
        .map_err(|e| TileError::EncodeError {
            message: e.to_string(),
        })?
    }

    /// Full-resolution origin of an output tile.
    fn tile_origin(&self, request: &TileRequest) -> Result<(u32, u32), TileError> {
        let span = self.tile_size as u64 * layer_factor(request.layer) as u64;
        let x = request.col as u64 * span;
        let y = request.row as u64 * span;
        match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => Ok((x, y)),
            _ => Err(TileError::InvalidArgument(format!(
                "tile row {} col {} is beyond addressable coordinates",
                request.row, request.col
            ))),
        }
    }

    /// Read a stitched region of a slide, without color correction.
    pub async fn read_region(
        &self,
        slide_id: &str,
        request: RegionRequest,
    ) -> Result<Region, TileError> {
        validate_layer(request.layer)?;
        let slide = self.registry.get_slide(slide_id).await?;
        slide.read_region(request).await
    }

    /// Get tile cache statistics.
    ///
    /// Returns `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let size = self.cache.size().await;
        let capacity = self.cache.capacity();
        let count = self.cache.len().await;
        (size, capacity, count)
    }

    /// Clear the tile cache.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Output tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn quality(&self) -> u8 {
        self.encoder.quality()
    }

    pub fn registry(&self) -> &Arc<SlideRegistry<S>> {
        &self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================
