use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// Every read opens its own file handle, so concurrent tile fetches never
/// contend on a shared cursor. The file size is captured once on creation.
#[derive(Debug, Clone)]
pub struct LocalFileReader {
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Create a reader for the file at `path`.
    ///
    /// Returns `IoError::NotFound` if the file does not exist or is not a
    /// regular file.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, IoError> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(path.display().to_string())
            } else {
                IoError::File(format!("{}: {}", path.display(), e))
            }
        })?;

        if !metadata.is_file() {
            return Err(IoError::NotFound(path.display().to_string()));
        }

        let identifier = path.display().to_string();
        Ok(Self {
            path,
            size: metadata.len(),
            identifier,
        })
    }

    /// Get the path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let io_err = |e: std::io::Error| IoError::File(format!("{}: {}", self.identifier, e));

        let mut file = File::open(&self.path).await.map_err(io_err)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await.map_err(io_err)?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
