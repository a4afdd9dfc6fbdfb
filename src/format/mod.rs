//! Parsers for the DPTWSI container format.
//!
//! - [`container`]: fixed header, tile directory and the read-only
//!   [`ContainerIndex`] built from them
//! - [`jpeg`]: signature check and decoding of tile payloads

pub mod container;
pub mod jpeg;

pub use container::{
    ContainerIndex, Header, TileKey, TileRecord, HEADER_SIZE, MAGIC, RECORD_SIZE,
};
pub use jpeg::{decode_tile, has_jpeg_signature, EOI, SOI};
