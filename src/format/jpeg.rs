//! JPEG payload handling for container tiles.
//!
//! Tile payloads are complete baseline JPEG streams. Before decoding, the
//! leading bytes are checked against the SOI marker so that a directory
//! entry pointing at garbage is reported as a signature failure rather than
//! an opaque decoder error.

use std::io::Cursor;

use image::{ImageFormat, ImageReader, RgbImage};

use crate::error::FetchError;

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Check whether `data` starts with the JPEG SOI marker.
#[inline]
pub fn has_jpeg_signature(data: &[u8]) -> bool {
    data.len() >= 2 && data[0..2] == SOI
}

/// Verify the signature and decode a tile payload to RGB8.
///
/// Grayscale and other color types are converted to RGB so every decoded
/// tile shares the canvas channel order.
pub fn decode_tile(data: &[u8]) -> Result<RgbImage, FetchError> {
    if !has_jpeg_signature(data) {
        let prefix = data.iter().take(2).copied().collect();
        return Err(FetchError::BadSignature(prefix));
    }

    let reader = ImageReader::with_format(Cursor::new(data), ImageFormat::Jpeg);
    let img = reader
        .decode()
        .map_err(|e| FetchError::Decode(e.to_string()))?;

    Ok(img.into_rgb8())
}
