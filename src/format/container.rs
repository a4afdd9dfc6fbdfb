//! DPTWSI container header and tile directory.
//!
//! # Layout
//!
//! All integers are little-endian.
//!
//! ```text
//! offset  size  field
//! ------  ----  ------------------------------------
//!      0     6  magic "DPTWSI"
//!      6     4  tile count (u32)
//!     10     1  z-stack count (i8)
//!     11     2  base tile width (i16)
//!     13     2  base tile height (i16)
//!     15     1  reserved
//!     16     4  slide width (u32)
//!     20     4  slide height (u32)
//!     24     4  microns per pixel (f32)
//!     28     4  overlap in pixels (u32)
//!     32   22n  directory records
//! ```
//!
//! Each 22-byte directory record is `layer (i8)`, `x (u32)`, `y (u32)`,
//! `z (u8)`, `length (i32)`, `offset (i64)`. Tile coordinates are the
//! full-resolution top-left corner of the tile, whatever its layer.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::ContainerError;
use crate::io::{read_f32_le, read_u16_le, read_u32_le, read_u64_le, RangeReader};

/// Container magic signature.
pub const MAGIC: &[u8; 6] = b"DPTWSI";

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Size of one directory record in bytes.
pub const RECORD_SIZE: usize = 22;

// =============================================================================
// Header
// =============================================================================

/// Fixed container header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Header {
    pub tile_count: u32,
    pub z_stacks: i8,
    pub tile_width: i16,
    pub tile_height: i16,
    /// Declared slide width in pixels
    pub width: u32,
    /// Declared slide height in pixels
    pub height: u32,
    pub mpp: f32,
    pub overlap: u32,
}

impl Header {
    /// Parse and validate the 32-byte header.
    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ContainerError::Truncated {
                required: HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        if &bytes[0..6] != MAGIC {
            let mut found = [0u8; 6];
            found.copy_from_slice(&bytes[0..6]);
            return Err(ContainerError::InvalidMagic(found));
        }

        let header = Self {
            tile_count: read_u32_le(&bytes[6..]),
            z_stacks: bytes[10] as i8,
            tile_width: read_u16_le(&bytes[11..]) as i16,
            tile_height: read_u16_le(&bytes[13..]) as i16,
            width: read_u32_le(&bytes[16..]),
            height: read_u32_le(&bytes[20..]),
            mpp: read_f32_le(&bytes[24..]),
            overlap: read_u32_le(&bytes[28..]),
        };

        header.validate()?;
        Ok(header)
    }

    fn validate(&self) -> Result<(), ContainerError> {
        if self.tile_width <= 0 || self.tile_height <= 0 {
            return Err(ContainerError::InvalidHeader(format!(
                "tile size must be positive, got {}x{}",
                self.tile_width, self.tile_height
            )));
        }

        let min_side = self.tile_width.min(self.tile_height) as u32;
        if self.overlap >= min_side {
            return Err(ContainerError::InvalidHeader(format!(
                "overlap {} must be smaller than tile size {}x{}",
                self.overlap, self.tile_width, self.tile_height
            )));
        }

        Ok(())
    }

    /// Total directory size in bytes.
    pub fn directory_len(&self) -> u64 {
        self.tile_count as u64 * RECORD_SIZE as u64
    }
}

// =============================================================================
// Directory Records
// =============================================================================

/// Identity of one stored tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub layer: i8,
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileKey {
    pub fn new(layer: i8, x: u32, y: u32, z: u8) -> Self {
        Self { layer, x, y, z }
    }
}

/// Location of a tile's encoded payload inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRecord {
    pub length: i32,
    pub offset: i64,
}

fn parse_record(bytes: &[u8]) -> (TileKey, TileRecord) {
    let key = TileKey {
        layer: bytes[0] as i8,
        x: read_u32_le(&bytes[1..]),
        y: read_u32_le(&bytes[5..]),
        z: bytes[9],
    };
    let record = TileRecord {
        length: read_u32_le(&bytes[10..]) as i32,
        offset: read_u64_le(&bytes[14..]) as i64,
    };
    (key, record)
}

// =============================================================================
// Container Index
// =============================================================================

/// Read-only index over an opened container.
///
/// Built once by [`ContainerIndex::open`]; safe to share across threads
/// without locking.
#[derive(Debug, Clone)]
pub struct ContainerIndex {
    header: Header,
    tiles: HashMap<TileKey, TileRecord>,
    extent: (u32, u32),
}

impl ContainerIndex {
    /// Read the header and directory and build the index.
    ///
    /// Fails with a [`ContainerError`] on bad magic, truncated input or an
    /// unreadable container. Never returns a partially built index.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, ContainerError> {
        let size = reader.size();
        if size < HEADER_SIZE as u64 {
            return Err(ContainerError::Truncated {
                required: HEADER_SIZE as u64,
                actual: size,
            });
        }

        let header_bytes = reader.read_exact_at(0, HEADER_SIZE).await?;
        let header = Header::parse(&header_bytes)?;

        let required = HEADER_SIZE as u64 + header.directory_len();
        if size < required {
            return Err(ContainerError::Truncated {
                required,
                actual: size,
            });
        }

        let directory = reader
            .read_exact_at(HEADER_SIZE as u64, header.directory_len() as usize)
            .await?;

        let index = tokio::task::spawn_blocking(move || Self::from_directory(header, &directory))
            .await
            .map_err(|e| ContainerError::Task(e.to_string()))??;
        debug!(
            source = reader.identifier(),
            tiles = index.tiles.len(),
            width = index.extent.0,
            height = index.extent.1,
            "Indexed container"
        );
        Ok(index)
    }

    /// Build the index from an already read directory.
    ///
    /// Records are parsed in parallel; the first record wins when a key
    /// appears more than once.
    pub fn from_directory(header: Header, directory: &[u8]) -> Result<Self, ContainerError> {
        if header.tile_count == 0 {
            return Err(ContainerError::EmptyDirectory);
        }
        if (directory.len() as u64) < header.directory_len() {
            return Err(ContainerError::Truncated {
                required: HEADER_SIZE as u64 + header.directory_len(),
                actual: HEADER_SIZE as u64 + directory.len() as u64,
            });
        }

        let directory = &directory[..header.directory_len() as usize];

        let entries: Vec<(TileKey, TileRecord)> = directory
            .par_chunks_exact(RECORD_SIZE)
            .map(parse_record)
            .collect();

        let (max_x, max_y) = entries
            .par_iter()
            .map(|(key, _)| (key.x, key.y))
            .reduce(|| (0, 0), |a, b| (a.0.max(b.0), a.1.max(b.1)));

        let mut tiles = HashMap::with_capacity(entries.len());
        let mut duplicates = 0usize;
        for (key, record) in entries {
            if tiles.contains_key(&key) {
                duplicates += 1;
                continue;
            }
            tiles.insert(key, record);
        }
        if duplicates > 0 {
            warn!(duplicates, "Container directory has duplicate tile keys");
        }

        let extent = (
            max_x.saturating_add(header.tile_width as u32),
            max_y.saturating_add(header.tile_height as u32),
        );

        Ok(Self {
            header,
            tiles,
            extent,
        })
    }

    /// Look up the payload location of a tile.
    pub fn lookup(&self, key: &TileKey) -> Option<TileRecord> {
        self.tiles.get(key).copied()
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Base tile size `(width, height)` at full resolution.
    pub fn tile_size(&self) -> (u32, u32) {
        (
            self.header.tile_width as u32,
            self.header.tile_height as u32,
        )
    }

    pub fn overlap(&self) -> u32 {
        self.header.overlap
    }

    pub fn mpp(&self) -> f32 {
        self.header.mpp
    }

    pub fn z_stacks(&self) -> i8 {
        self.header.z_stacks
    }

    /// Slide extent derived from the directory: the furthest tile corner
    /// plus one base tile, per axis.
    pub fn extent(&self) -> (u32, u32) {
        self.extent
    }

    /// Number of distinct tiles in the index.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

// =============================================================================
// Test Support
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
