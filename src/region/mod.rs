//! Region reading: tile selection, seam fusion and color calibration.
//!
//! - [`compositor`] maps a region onto the tile grid, fetches the tiles
//!   concurrently and sums them onto a canvas
//! - [`fusion`] weights each tile's overlap bands with a sigmoid ramp so
//!   that neighbors blend without a visible seam
//! - [`color`] applies a 3x3 color correction matrix to finished pixels

pub mod color;
pub mod compositor;
pub mod fusion;

pub use color::{color_correct, correct_rgb, ColorMatrix, DEFAULT_CCM};
pub use compositor::{
    fetch_payload, layer_factor, plan_region, read_region, validate_layer, Region, RegionPlan,
    RegionRequest, SlideGeometry, TilePlacement, MAX_LAYER, PLACEHOLDER_COLOR,
};
pub use fusion::{
    edge_weight, fuse_tile, fuse_tile_bands, layer_steepness, sigmoid, Edge, Edges, FusedTile,
    SeamBands,
};
