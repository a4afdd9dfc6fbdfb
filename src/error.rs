use thiserror::Error;

/// I/O errors that can occur when reading slide bytes
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Fatal errors raised while opening a DPTWSI container.
///
/// Opening either yields a complete index or one of these; no partially
/// parsed container is ever returned.
#[derive(Debug, Clone, Error)]
pub enum ContainerError {
    /// I/O error while reading the header or directory
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// First six bytes are not "DPTWSI"
    #[error("Invalid container magic: expected \"DPTWSI\", got {0:02X?}")]
    InvalidMagic([u8; 6]),

    /// File ends before the header or directory is complete
    #[error("Truncated container: need {required} bytes, file has {actual}")]
    Truncated { required: u64, actual: u64 },

    /// Header fields are inconsistent
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Directory holds no tile records
    #[error("Container directory is empty")]
    EmptyDirectory,

    /// The blocking task indexing the directory did not complete
    #[error("Indexing task failed: {0}")]
    Task(String),
}

/// Recoverable failures for a single source tile.
///
/// The compositor replaces the tile with a placeholder when one of these
/// occurs; they never abort a region read.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// No directory entry for the requested tile
    #[error("No directory entry for tile layer={layer} x={x} y={y} z={z}")]
    MissingEntry { layer: i8, x: u32, y: u32, z: u8 },

    /// Directory entry has a negative offset or length
    #[error("Invalid tile record: length {length}, offset {offset}")]
    InvalidRecord { length: i32, offset: i64 },

    /// Reading the payload failed
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Payload does not start with the JPEG SOI marker
    #[error("Bad image signature: {0:02X?}")]
    BadSignature(Vec<u8>),

    /// JPEG decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// The worker task processing the tile did not complete
    #[error("Tile task failed: {0}")]
    Join(String),
}

/// Errors surfaced to callers of region and tile reads.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Layer outside the supported closed set
    #[error("Invalid layer: {layer} (supported layers: 0-{max_layer})")]
    InvalidLayer { layer: u32, max_layer: u32 },

    /// Contract violation on an argument (channel count, matrix shape, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Slide does not exist in the source
    #[error("Slide not found: {slide_id}")]
    SlideNotFound { slide_id: String },

    /// Slide exists but could not be opened
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// I/O error outside of a single-tile fetch
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Failed to encode the output tile
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },

    /// A blocking worker task did not complete
    #[error("Worker task failed: {0}")]
    Task(String),
}
