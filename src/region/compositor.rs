//! Region compositor: stitches stored tiles into one pixel region.
//!
//! # Coordinate Model
//!
//! Tile keys carry full-resolution corners. Layer `l` is a pre-stored
//! pyramid level downsampled by `f = 4^l`; every full-resolution to layer
//! conversion is an integer floor division by `f`, and nothing is ever
//! scaled back up. With stride `S = tile - overlap`, tile `i` along an axis
//! has its full-resolution corner at `i * S` and is placed on the layer
//! canvas at `floor(i * S / f)`. Seam bands are measured between these
//! rounded placements, not derived from `overlap / f`.
//!
//! # Pipeline
//!
//! ```text
//! plan_region ──► fetch (tokio task per tile, positional reads)
//!                   │
//!                   ▼
//!             decode ─► normalize ─► fuse   (blocking pool)
//!                   │
//!                   ▼
//!     join all ─► sort by key ─► per-row parallel sum ─► round to u8
//!                                 (blocking pool)
//! ```
//!
//! Tiles that cannot be fetched or decoded are replaced by a placeholder
//! and counted; they never fail the region.

use std::sync::Arc;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{FetchError, TileError};
use crate::format::{decode_tile, ContainerIndex, TileKey};
use crate::io::RangeReader;

use super::fusion::{fuse_tile_bands, layer_steepness, Edges, FusedTile, SeamBands};

/// Highest pre-stored layer. Supported layers are `0..=MAX_LAYER`.
pub const MAX_LAYER: u32 = 2;

/// Fill color of placeholder tiles and tile padding.
pub const PLACEHOLDER_COLOR: Rgb<u8> = Rgb([251, 251, 251]);

/// Downsample factor of a layer (`4^layer`).
#[inline]
pub fn layer_factor(layer: u32) -> u32 {
    1u32 << (2 * layer)
}

/// Reject layers outside the supported closed set.
pub fn validate_layer(layer: u32) -> Result<(), TileError> {
    if layer > MAX_LAYER {
        return Err(TileError::InvalidLayer {
            layer,
            max_layer: MAX_LAYER,
        });
    }
    Ok(())
}

// =============================================================================
// Geometry and Planning
// =============================================================================

/// Slide geometry needed for planning, at full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideGeometry {
    pub extent: (u32, u32),
    pub tile_size: (u32, u32),
    pub overlap: u32,
}

impl From<&ContainerIndex> for SlideGeometry {
    fn from(index: &ContainerIndex) -> Self {
        Self {
            extent: index.extent(),
            tile_size: index.tile_size(),
            overlap: index.overlap(),
        }
    }
}

impl SlideGeometry {
    /// Slide size at `layer`.
    pub fn layer_extent(&self, layer: u32) -> (u32, u32) {
        let f = layer_factor(layer);
        (self.extent.0 / f, self.extent.1 / f)
    }

    /// Stored tile size at `layer`.
    pub fn layer_tile_size(&self, layer: u32) -> (u32, u32) {
        let f = layer_factor(layer);
        (self.tile_size.0 / f, self.tile_size.1 / f)
    }

    /// Overlap band width at `layer`.
    pub fn layer_overlap(&self, layer: u32) -> u32 {
        self.overlap / layer_factor(layer)
    }
}

/// A region read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRequest {
    /// Full-resolution origin X
    pub x: u32,
    /// Full-resolution origin Y
    pub y: u32,
    /// Width in layer pixels
    pub width: u32,
    /// Height in layer pixels
    pub height: u32,
    pub layer: u32,
    pub z: u8,
}

impl RegionRequest {
    pub fn new(x: u32, y: u32, width: u32, height: u32, layer: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            layer,
            z: 0,
        }
    }

    pub fn with_z(mut self, z: u8) -> Self {
        self.z = z;
        self
    }
}

/// One stored tile needed by a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub key: TileKey,
    /// Top-left corner on the layer canvas
    pub origin: (u32, u32),
    /// Edges shared with a real neighbor
    pub edges: Edges,
    /// Band width shared with the neighbor on each edge, in layer pixels
    pub bands: SeamBands,
}

/// The clipped region and the tiles covering it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlan {
    pub layer: u32,
    /// Clipped region origin in layer pixels
    pub origin: (u32, u32),
    /// Clipped region size in layer pixels (zero when outside the slide)
    pub width: u32,
    pub height: u32,
    /// Stored tile size at this layer
    pub tile_size: (u32, u32),
    /// Overlap band at this layer
    pub overlap: u32,
    pub tiles: Vec<TilePlacement>,
}

impl RegionPlan {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Clipped inclusive range `[start, end]` of a request along one axis,
/// or `None` if it misses the slide.
fn clip_axis(origin: u32, len: u32, extent: u32) -> Option<(u32, u32)> {
    if len == 0 || origin >= extent {
        return None;
    }
    let end = (origin as u64 + len as u64 - 1).min(extent as u64 - 1) as u32;
    Some((origin, end))
}

/// Inclusive range of grid indices whose tile footprint intersects `[start, end]`.
///
/// Tile `i` covers `[floor(i*S/f), floor(i*S/f) + tile_len)` on the layer.
fn grid_range(start: u32, end: u32, tile_len: u32, stride: u32, f: u32) -> (u32, u32) {
    let (start, end, tile_len, stride, f) = (
        start as i64,
        end as i64,
        tile_len as i64,
        stride as i64,
        f as i64,
    );
    let first_placement = start + 1 - tile_len;
    let lo = if first_placement <= 0 {
        0
    } else {
        (first_placement * f + stride - 1) / stride
    };
    let hi = ((end + 1) * f - 1) / stride;
    (lo as u32, hi as u32)
}

/// Bands tile `i` shares with tile `i - 1` (`lead`) and tile `i + 1`
/// (`trail`) along one axis.
///
/// Widths come from the rounded layer placements of the neighbors, which
/// differ from `overlap / f` whenever the stride is not a multiple of `f`.
fn shared_bands(i: u32, stride: u32, f: u32, tile_len: u32, lead: bool, trail: bool) -> (u32, u32) {
    let place = |j: u32| (j as u64 * stride as u64 / f as u64) as u32;
    let origin = place(i);
    let lead_band = match i.checked_sub(1) {
        Some(prev) if lead => (place(prev) + tile_len).saturating_sub(origin),
        _ => 0,
    };
    let trail_band = if trail {
        (origin + tile_len).saturating_sub(place(i + 1))
    } else {
        0
    };
    (lead_band, trail_band)
}

/// Map a region request onto the tile grid.
pub fn plan_region(geometry: &SlideGeometry, request: &RegionRequest) -> Result<RegionPlan, TileError> {
    validate_layer(request.layer)?;

    let layer = request.layer;
    let f = layer_factor(layer);
    let (layer_w, layer_h) = geometry.layer_extent(layer);
    let tile_size = geometry.layer_tile_size(layer);
    let overlap = geometry.layer_overlap(layer);

    let mut plan = RegionPlan {
        layer,
        origin: (request.x / f, request.y / f),
        width: 0,
        height: 0,
        tile_size,
        overlap,
        tiles: Vec::new(),
    };

    let (Some((x0, x1)), Some((y0, y1))) = (
        clip_axis(plan.origin.0, request.width, layer_w),
        clip_axis(plan.origin.1, request.height, layer_h),
    ) else {
        return Ok(plan);
    };
    plan.width = x1 - x0 + 1;
    plan.height = y1 - y0 + 1;

    if tile_size.0 == 0 || tile_size.1 == 0 {
        return Ok(plan);
    }

    let (tile_w, tile_h) = geometry.tile_size;
    let (extent_w, extent_h) = geometry.extent;
    let stride_x = tile_w - geometry.overlap;
    let stride_y = tile_h - geometry.overlap;

    let (left, right) = grid_range(x0, x1, tile_size.0, stride_x, f);
    let (top, bottom) = grid_range(y0, y1, tile_size.1, stride_y, f);

    let z = request.z;
    plan.tiles = (left..=right)
        .into_par_iter()
        .flat_map_iter(|col| {
            (top..=bottom).filter_map(move |row| {
                let x = col as u64 * stride_x as u64;
                let y = row as u64 * stride_y as u64;
                // No tile exists past the last complete row or column
                if x + tile_w as u64 > extent_w as u64 || y + tile_h as u64 > extent_h as u64 {
                    return None;
                }
                let (x, y) = (x as u32, y as u32);
                let edges = Edges {
                    top: y != 0,
                    bottom: y + tile_h != extent_h,
                    left: x != 0,
                    right: x + tile_w != extent_w,
                };
                let (band_left, band_right) =
                    shared_bands(col, stride_x, f, tile_size.0, edges.left, edges.right);
                let (band_top, band_bottom) =
                    shared_bands(row, stride_y, f, tile_size.1, edges.top, edges.bottom);
                Some(TilePlacement {
                    key: TileKey::new(layer as i8, x, y, z),
                    origin: (x / f, y / f),
                    edges,
                    bands: SeamBands {
                        top: band_top,
                        bottom: band_bottom,
                        left: band_left,
                        right: band_right,
                    },
                })
            })
        })
        .collect();

    Ok(plan)
}

// =============================================================================
// Fetch and Prepare
// =============================================================================

/// A composited region.
#[derive(Debug, Clone)]
pub struct Region {
    pub image: RgbImage,
    /// Number of stored tiles that contributed
    pub tiles: usize,
    /// Number of tiles replaced by a placeholder
    pub placeholders: usize,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

struct PreparedTile {
    key: TileKey,
    origin: (u32, u32),
    fused: FusedTile,
    placeholder: bool,
}

#[derive(Debug, Clone, Copy)]
struct PrepareParams {
    tile_size: (u32, u32),
    steepness: f32,
}

/// Read the encoded payload of a tile.
pub async fn fetch_payload<R: RangeReader + ?Sized>(
    reader: &R,
    index: &ContainerIndex,
    key: &TileKey,
) -> Result<Bytes, FetchError> {
    let record = index.lookup(key).ok_or(FetchError::MissingEntry {
        layer: key.layer,
        x: key.x,
        y: key.y,
        z: key.z,
    })?;

    if record.length < 0 || record.offset < 0 {
        return Err(FetchError::InvalidRecord {
            length: record.length,
            offset: record.offset,
        });
    }

    Ok(reader
        .read_exact_at(record.offset as u64, record.length as usize)
        .await?)
}

fn placeholder_tile(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, PLACEHOLDER_COLOR)
}

/// Decode, normalize and fuse one tile; failures yield a fused placeholder.
fn prepare_tile(
    payload: Result<Bytes, FetchError>,
    placement: &TilePlacement,
    params: &PrepareParams,
) -> PreparedTile {
    let (width, height) = params.tile_size;
    let decoded = payload.and_then(|data| decode_tile(&data));

    let (pixels, placeholder) = match decoded {
        Ok(img) if img.dimensions() == (width, height) => (img, false),
        Ok(img) => {
            debug!(
                key = ?placement.key,
                from = ?img.dimensions(),
                to = ?(width, height),
                "Resizing tile to layer tile size"
            );
            (imageops::resize(&img, width, height, FilterType::Triangle), false)
        }
        Err(e) => {
            warn!(key = ?placement.key, error = %e, "Tile fetch failed, using placeholder");
            (placeholder_tile(width, height), true)
        }
    };

    PreparedTile {
        key: placement.key,
        origin: placement.origin,
        fused: fuse_tile_bands(&pixels, placement.bands, params.steepness),
        placeholder,
    }
}

// =============================================================================
// Region Read
// =============================================================================

/// Read and stitch a region.
///
/// Each tile is fetched by its own task through positional reads, then
/// decoded and fused on the blocking pool. All tasks are joined before the
/// canvas is reduced, so the result does not depend on scheduling order.
pub async fn read_region<R: RangeReader + 'static>(
    reader: Arc<R>,
    index: Arc<ContainerIndex>,
    request: RegionRequest,
) -> Result<Region, TileError> {
    let geometry = SlideGeometry::from(index.as_ref());
    let plan = plan_region(&geometry, &request)?;

    if plan.is_empty() {
        return Ok(Region {
            image: RgbImage::new(0, 0),
            tiles: 0,
            placeholders: 0,
        });
    }

    let params = PrepareParams {
        tile_size: plan.tile_size,
        steepness: layer_steepness(plan.layer),
    };

    let handles: Vec<_> = plan
        .tiles
        .iter()
        .map(|placement| {
            let reader = Arc::clone(&reader);
            let index = Arc::clone(&index);
            let placement = *placement;
            let handle = tokio::spawn(async move {
                let payload = fetch_payload(reader.as_ref(), &index, &placement.key).await;
                tokio::task::spawn_blocking(move || prepare_tile(payload, &placement, &params))
                    .await
            });
            (placement, handle)
        })
        .collect();

    let mut prepared = Vec::with_capacity(handles.len());
    for (placement, handle) in handles {
        let tile = match handle.await {
            Ok(Ok(tile)) => tile,
            Ok(Err(e)) | Err(e) => {
                prepare_tile(Err(FetchError::Join(e.to_string())), &placement, &params)
            }
        };
        prepared.push(tile);
    }

    prepared.sort_by_key(|t| t.key);
    let placeholders = prepared.iter().filter(|t| t.placeholder).count();
    if placeholders > 0 {
        warn!(
            layer = plan.layer,
            x = request.x,
            y = request.y,
            placeholders,
            total = prepared.len(),
            "Region composited with placeholder tiles"
        );
    }

    let tiles = prepared.len();
    let image = tokio::task::spawn_blocking(move || stitch(&plan, &prepared))
        .await
        .map_err(|e| TileError::Task(e.to_string()))??;

    Ok(Region {
        image,
        tiles,
        placeholders,
    })
}

/// Sum fused tiles onto a zeroed canvas.
///
/// Rows are reduced in parallel; within a row tiles are added in key order.
fn stitch(plan: &RegionPlan, tiles: &[PreparedTile]) -> Result<RgbImage, TileError> {
    let (width, height) = (plan.width, plan.height);
    let (rx, ry) = plan.origin;
    let stride = width as usize * 3;
    let mut canvas = vec![0.0f32; stride * height as usize];

    canvas
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(row, line)| {
            let cy = ry + row as u32;
            for tile in tiles {
                let (ox, oy) = tile.origin;
                if cy < oy || cy >= oy + tile.fused.height() {
                    continue;
                }
                let start = rx.max(ox);
                let end = (rx + width).min(ox + tile.fused.width());
                if start >= end {
                    continue;
                }

                let src = tile.fused.row(cy - oy);
                let src = &src[(start - ox) as usize * 3..(end - ox) as usize * 3];
                let dst = &mut line[(start - rx) as usize * 3..(end - rx) as usize * 3];
                for (d, s) in dst.iter_mut().zip(src) {
                    *d += *s;
                }
            }
        });

    let pixels: Vec<u8> = canvas
        .par_iter()
        .map(|v| v.round().clamp(0.0, 255.0) as u8)
        .collect();

    RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
        TileError::InvalidArgument(format!("canvas buffer does not match {}x{}", width, height))
    })
}
