//! Seam fusion for overlapping tiles.
//!
//! Adjacent stored tiles share an `overlap`-pixel band. Before stitching,
//! every tile is faded out across each band it shares with a real
//! neighbor: the leading edge (top/left) is scaled by a sigmoid ramp and the
//! trailing edge (bottom/right) by its complement. When two tiles are summed
//! on the canvas their weights add up to one at every pixel of the band.
//!
//! On downsampled layers the band two neighbors actually share depends on
//! where each was placed after rounding, so bands are given per edge
//! ([`SeamBands`]) rather than as one overlap width.
//!
//! Weights are separable: a pixel's weight is `wx(x) * wy(y)`, so corner
//! pixels covered by two active edges get one combined weight, and the four
//! tiles meeting at a corner still sum to one.

use image::RgbImage;
use rayon::prelude::*;

/// Sigmoid steepness at full resolution.
pub const BASE_STEEPNESS: f32 = 0.15;

/// Logistic function `1 / (1 + e^(-k * value))`.
#[inline]
pub fn sigmoid(value: f32, k: f32) -> f32 {
    1.0 / (1.0 + (-k * value).exp())
}

/// Steepness for a layer: the ramp sharpens by 4x per layer, matching the
/// 4x narrower overlap band.
#[inline]
pub fn layer_steepness(layer: u32) -> f32 {
    BASE_STEEPNESS * 4f32.powi(layer as i32)
}

/// One edge of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Set of tile edges that have a real neighbor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Edges {
    pub top: bool,
    pub bottom: bool,
    pub left: bool,
    pub right: bool,
}

impl Edges {
    pub const NONE: Edges = Edges {
        top: false,
        bottom: false,
        left: false,
        right: false,
    };

    pub const ALL: Edges = Edges {
        top: true,
        bottom: true,
        left: true,
        right: true,
    };

    pub fn contains(&self, edge: Edge) -> bool {
        match edge {
            Edge::Top => self.top,
            Edge::Bottom => self.bottom,
            Edge::Left => self.left,
            Edge::Right => self.right,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Edges::NONE
    }
}

/// Weight of a pixel `offset` pixels into the strip along `edge`.
///
/// `offset` is measured from the strip's outer side for top/left and from
/// its inner side for bottom/right, i.e. always in increasing canvas
/// coordinates. A bottom strip at offset `i` therefore lines up with the
/// neighbor's top strip at offset `i`, and the two weights are complementary.
pub fn edge_weight(edge: Edge, offset: u32, overlap: u32, k: f32) -> f32 {
    let center = (overlap as f32 - 1.0) / 2.0;
    let w = sigmoid(offset as f32 - center, k);
    match edge {
        Edge::Top | Edge::Left => w,
        Edge::Bottom | Edge::Right => 1.0 - w,
    }
}

/// Blend band width along each edge of a tile, in layer pixels.
///
/// A zero width leaves that edge unblended. Neighbors must agree on the width
/// of the band they share for their weights to be complementary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeamBands {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl SeamBands {
    /// The same `overlap` on every edge in `edges`.
    pub fn uniform(overlap: u32, edges: Edges) -> Self {
        let band = |edge| if edges.contains(edge) { overlap } else { 0 };
        Self {
            top: band(Edge::Top),
            bottom: band(Edge::Bottom),
            left: band(Edge::Left),
            right: band(Edge::Right),
        }
    }

    pub fn width(&self, edge: Edge) -> u32 {
        match edge {
            Edge::Top => self.top,
            Edge::Bottom => self.bottom,
            Edge::Left => self.left,
            Edge::Right => self.right,
        }
    }
}

/// Per-position weights along one axis of length `len`.
fn axis_weights(len: u32, lead: Edge, trail: Edge, bands: SeamBands, k: f32) -> Vec<f32> {
    let mut weights = vec![1.0f32; len as usize];

    let band = bands.width(lead).min(len);
    for i in 0..band {
        weights[i as usize] *= edge_weight(lead, i, band, k);
    }

    let band = bands.width(trail).min(len);
    let start = len - band;
    for i in 0..band {
        weights[(start + i) as usize] *= edge_weight(trail, i, band, k);
    }
    weights
}

/// An RGB tile with floating-point samples, ready to be summed onto a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedTile {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl FusedTile {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved RGB samples of row `y`.
    pub fn row(&self, y: u32) -> &[f32] {
        let stride = self.width as usize * 3;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// RGB samples of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }
}

/// Apply seam fusion to a tile with one `overlap` band on each active edge.
///
/// The source image is left untouched; the weighted copy is returned.
pub fn fuse_tile(tile: &RgbImage, overlap: u32, edges: Edges, k: f32) -> FusedTile {
    fuse_tile_bands(tile, SeamBands::uniform(overlap, edges), k)
}

/// Apply seam fusion with an individual band width per edge.
pub fn fuse_tile_bands(tile: &RgbImage, bands: SeamBands, k: f32) -> FusedTile {
    let (width, height) = tile.dimensions();
    let wx = axis_weights(width, Edge::Left, Edge::Right, bands, k);
    let wy = axis_weights(height, Edge::Top, Edge::Bottom, bands, k);

    let stride = width as usize * 3;
    let src = tile.as_raw();
    let mut data = vec![0.0f32; stride * height as usize];

    if stride > 0 {
        data.par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| {
                let src_row = &src[y * stride..(y + 1) * stride];
                let row_weight = wy[y];
                for x in 0..width as usize {
                    let w = wx[x] * row_weight;
                    for c in 0..3 {
                        row[x * 3 + c] = src_row[x * 3 + c] as f32 * w;
                    }
                }
            });
    }

    FusedTile {
        width,
        height,
        data,
    }
}
