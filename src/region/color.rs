//! Sensor color calibration.
//!
//! The scanner's color response is corrected with a fixed 3x3 linear
//! transform applied to each RGB pixel of a finished composite:
//! `out[i] = clamp(round(sum_j in[j] * m[i][j]), 0, 255)`.

use image::{DynamicImage, RgbImage};
use rayon::prelude::*;

use crate::error::TileError;

/// 3x3 color correction matrix, row-major: row `i` produces output channel `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix([[f32; 3]; 3]);

/// Calibration matrix for the DPT scanner sensor.
#[allow(clippy::excessive_precision)]
pub const DEFAULT_CCM: ColorMatrix = ColorMatrix([
    [1.5359419584274292, -0.4762600064277649, -0.06893599778413773],
    [-0.453308999, 1.7416930198, -0.31106099486351013],
    [-0.050136998295784, -0.5789409875869751, 1.590363979],
]);

impl ColorMatrix {
    pub const IDENTITY: ColorMatrix =
        ColorMatrix([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    pub const fn new(rows: [[f32; 3]; 3]) -> Self {
        Self(rows)
    }

    /// Build a matrix from dynamically sized rows.
    ///
    /// Returns `TileError::InvalidArgument` unless there are exactly three
    /// rows of three values.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, TileError> {
        if rows.len() != 3 {
            return Err(TileError::InvalidArgument(format!(
                "color matrix must have 3 rows, got {}",
                rows.len()
            )));
        }

        let mut m = [[0.0f32; 3]; 3];
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != 3 {
                return Err(TileError::InvalidArgument(format!(
                    "color matrix row {} must have 3 columns, got {}",
                    i,
                    row.len()
                )));
            }
            m[i].copy_from_slice(row);
        }
        Ok(Self(m))
    }

    pub fn rows(&self) -> &[[f32; 3]; 3] {
        &self.0
    }

    /// Transform a single RGB pixel.
    #[inline]
    pub fn apply(&self, px: [u8; 3]) -> [u8; 3] {
        let input = [px[0] as f32, px[1] as f32, px[2] as f32];
        let mut out = [0u8; 3];
        for (o, row) in out.iter_mut().zip(self.0.iter()) {
            let v = input[0] * row[0] + input[1] * row[1] + input[2] * row[2];
            *o = v.round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}

/// Color-correct an image.
///
/// Only 8-bit, 3-channel images are accepted; anything else is an
/// invalid-argument failure.
pub fn color_correct(image: &DynamicImage, matrix: &ColorMatrix) -> Result<RgbImage, TileError> {
    match image {
        DynamicImage::ImageRgb8(rgb) => Ok(correct_rgb(rgb, matrix)),
        other => Err(TileError::InvalidArgument(format!(
            "color correction needs an 8-bit 3-channel image, got {:?} ({} channels)",
            other.color(),
            other.color().channel_count()
        ))),
    }
}

/// Color-correct an RGB8 image, processing rows in parallel.
pub fn correct_rgb(image: &RgbImage, matrix: &ColorMatrix) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    let stride = width as usize * 3;
    if stride == 0 || height == 0 {
        return out;
    }

    let buf: &mut [u8] = &mut out;
    buf.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(3) {
            let corrected = matrix.apply([px[0], px[1], px[2]]);
            px.copy_from_slice(&corrected);
        }
    });
    out
}
