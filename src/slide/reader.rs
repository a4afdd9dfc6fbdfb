//! An opened DPTWSI slide.
//!
//! A [`Slide`] pairs the read-only [`ContainerIndex`] with the range reader
//! its payloads are fetched through. Both are reference counted, so region
//! reads can run concurrently without holding any lock on the slide.

use std::sync::Arc;

use crate::error::{ContainerError, TileError};
use crate::format::ContainerIndex;
use crate::io::RangeReader;
use crate::region::{self, layer_factor, Region, RegionRequest, SlideGeometry, MAX_LAYER};

// =============================================================================
// Layer Information
// =============================================================================

/// Information about one pre-stored layer, as served in tiles of a given size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerInfo {
    /// Width of this layer in pixels
    pub width: u32,

    /// Height of this layer in pixels
    pub height: u32,

    /// Width of each served tile in pixels
    pub tile_width: u32,

    /// Height of each served tile in pixels
    pub tile_height: u32,

    /// Number of served tiles in X direction
    pub tiles_x: u32,

    /// Number of served tiles in Y direction
    pub tiles_y: u32,

    /// Downsample factor relative to full resolution (`4^layer`)
    pub downsample: f64,
}

// =============================================================================
// Slide
// =============================================================================

/// An opened container ready for region reads.
pub struct Slide<R: RangeReader + 'static> {
    index: Arc<ContainerIndex>,
    reader: Arc<R>,
}

impl<R: RangeReader + 'static> Slide<R> {
    /// Open a container through `reader`.
    pub async fn open(reader: R) -> Result<Self, ContainerError> {
        let index = ContainerIndex::open(&reader).await?;
        Ok(Self::from_parts(Arc::new(index), Arc::new(reader)))
    }

    pub fn from_parts(index: Arc<ContainerIndex>, reader: Arc<R>) -> Self {
        Self { index, reader }
    }

    pub fn index(&self) -> &ContainerIndex {
        &self.index
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Derived full-resolution extent.
    pub fn dimensions(&self) -> (u32, u32) {
        self.index.extent()
    }

    pub fn geometry(&self) -> SlideGeometry {
        SlideGeometry::from(self.index.as_ref())
    }

    /// Number of supported layers.
    pub fn layer_count(&self) -> usize {
        MAX_LAYER as usize + 1
    }

    /// Layer metadata for tiles of `tile_size` pixels, or `None` for an
    /// unsupported layer.
    pub fn layer_info(&self, layer: u32, tile_size: u32) -> Option<LayerInfo> {
        if layer > MAX_LAYER || tile_size == 0 {
            return None;
        }
        let (width, height) = self.geometry().layer_extent(layer);
        Some(LayerInfo {
            width,
            height,
            tile_width: tile_size,
            tile_height: tile_size,
            tiles_x: width.div_ceil(tile_size),
            tiles_y: height.div_ceil(tile_size),
            downsample: layer_factor(layer) as f64,
        })
    }

    /// Read and stitch a region of this slide.
    pub async fn read_region(&self, request: RegionRequest) -> Result<Region, TileError> {
        region::read_region(Arc::clone(&self.reader), Arc::clone(&self.index), request).await
    }
}
