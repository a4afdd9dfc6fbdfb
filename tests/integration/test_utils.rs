//! Test utilities for integration tests.
//!
//! Provides a container writer, mock readers and sources with request
//! tracking, and JPEG helpers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use dpt_streamer::error::IoError;
use dpt_streamer::format::{TileKey, HEADER_SIZE, MAGIC, RECORD_SIZE};
use dpt_streamer::io::RangeReader;
use dpt_streamer::slide::SlideSource;

// =============================================================================
// Container Writer
// =============================================================================

/// Writes DPTWSI container images.
pub struct DptBuilder {
    tile_width: i16,
    tile_height: i16,
    overlap: u32,
    mpp: f32,
    tiles: Vec<(TileKey, Vec<u8>)>,
}

impl DptBuilder {
    pub fn new(tile_width: i16, tile_height: i16, overlap: u32) -> Self {
        Self {
            tile_width,
            tile_height,
            overlap,
            mpp: 0.25,
            tiles: Vec::new(),
        }
    }

    pub fn tile(mut self, key: TileKey, payload: Vec<u8>) -> Self {
        self.tiles.push((key, payload));
        self
    }

    /// Add a full `cols x rows` layer-0 grid plus the matching layer 1 and 2
    /// tiles, each rendered by `pixel(layer, x, y)` in that layer's pixels.
    pub fn grid<F>(mut self, cols: u32, rows: u32, pixel: F) -> Self
    where
        F: Fn(u32, u32, u32) -> Rgb<u8>,
    {
        let stride_x = (self.tile_width as u32) - self.overlap;
        let stride_y = (self.tile_height as u32) - self.overlap;
        for layer in 0..3u32 {
            let f = 1u32 << (2 * layer);
            let (w, h) = (self.tile_width as u32 / f, self.tile_height as u32 / f);
            if w == 0 || h == 0 {
                continue;
            }
            for row in 0..rows {
                for col in 0..cols {
                    let (x, y) = (col * stride_x, row * stride_y);
                    let (ox, oy) = (x / f, y / f);
                    let img = RgbImage::from_fn(w, h, |px, py| pixel(layer, ox + px, oy + py));
                    self.tiles
                        .push((TileKey::new(layer as i8, x, y, 0), encode_jpeg(&img, 95)));
                }
            }
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.tiles.len() as u32).to_le_bytes());
        out.push(1);
        out.extend_from_slice(&self.tile_width.to_le_bytes());
        out.extend_from_slice(&self.tile_height.to_le_bytes());
        out.push(0);
        // Header width/height are informational only
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&self.mpp.to_le_bytes());
        out.extend_from_slice(&self.overlap.to_le_bytes());
        assert_eq!(out.len(), HEADER_SIZE);

        let mut offset = (HEADER_SIZE + RECORD_SIZE * self.tiles.len()) as i64;
        for (key, payload) in &self.tiles {
            out.push(key.layer as u8);
            out.extend_from_slice(&key.x.to_le_bytes());
            out.extend_from_slice(&key.y.to_le_bytes());
            out.push(key.z);
            out.extend_from_slice(&(payload.len() as i32).to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            offset += payload.len() as i64;
        }
        for (_, payload) in &self.tiles {
            out.extend_from_slice(payload);
        }
        out
    }

    /// Write the container to `dir/name`.
    pub fn write_to(&self, dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.build()).unwrap();
    }
}

/// Flat-colored 2x2 grid of 64px tiles with a 16px overlap (extent 112x112).
pub fn flat_slide(color: [u8; 3]) -> Vec<u8> {
    DptBuilder::new(64, 64, 16)
        .grid(2, 2, |_, _, _| Rgb(color))
        .build()
}

/// A smooth diagonal gradient over a 3x3 grid of 128px tiles, overlap 32.
pub fn gradient_slide() -> Vec<u8> {
    DptBuilder::new(128, 128, 32)
        .grid(3, 3, |layer, x, y| {
            let f = 1u32 << (2 * layer);
            let (x, y) = (x * f, y * f);
            Rgb([(x / 2) as u8, (y / 2) as u8, ((x + y) / 4) as u8])
        })
        .build()
}

// =============================================================================
// JPEG Helpers
// =============================================================================

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .unwrap();
    buf
}

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4
        && data[0..2] == [0xFF, 0xD8]
        && data[data.len() - 2..] == [0xFF, 0xD9]
}

pub fn decode_jpeg(data: &[u8]) -> RgbImage {
    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .unwrap()
        .into_rgb8()
}

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// A range reader over memory that counts reads.
#[derive(Clone)]
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeReader for TrackingMockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Mock Slide Source
// =============================================================================

/// Serves pre-configured slides and shares one read counter across them.
pub struct MockSlideSource {
    slides: HashMap<String, Bytes>,
    reads: Arc<AtomicUsize>,
}

impl MockSlideSource {
    pub fn new() -> Self {
        Self {
            slides: HashMap::new(),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_slide(mut self, slide_id: impl Into<String>, data: Vec<u8>) -> Self {
        self.slides.insert(slide_id.into(), Bytes::from(data));
        self
    }

    /// Shared counter of range reads issued against every slide.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl Default for MockSlideSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SlideSource for MockSlideSource {
    type Reader = TrackingMockReader;

    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError> {
        let data = self
            .slides
            .get(slide_id)
            .ok_or_else(|| IoError::NotFound(slide_id.to_string()))?;
        Ok(TrackingMockReader {
            data: data.clone(),
            identifier: format!("mock://{}", slide_id),
            request_count: Arc::clone(&self.reads),
        })
    }

    async fn list_slides(&self) -> Result<Vec<String>, IoError> {
        let mut ids: Vec<_> = self.slides.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
