//! Slide sources: where slide bytes come from.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::IoError;
use crate::io::{LocalFileReader, RangeReader};

/// File extension of DPTWSI containers.
pub const SLIDE_EXTENSION: &str = "dpt";

/// Trait for creating range readers from slide identifiers.
///
/// This abstraction allows the registry to work with different storage
/// backends without being tied to a specific implementation.
#[async_trait]
pub trait SlideSource: Send + Sync {
    /// The type of range reader this source creates.
    type Reader: RangeReader + 'static;

    /// Create a range reader for the given slide identifier.
    ///
    /// Returns `IoError::NotFound` when no such slide exists.
    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError>;

    /// List the identifiers of all available slides, sorted.
    async fn list_slides(&self) -> Result<Vec<String>, IoError>;
}

// =============================================================================
// LocalSlideSource
// =============================================================================

/// Slides stored as `*.dpt` files below a root directory.
///
/// A slide id is the file's path relative to the root, using `/` as
/// separator. Ids that are absolute or contain `..` are treated as not found.
#[derive(Debug, Clone)]
pub struct LocalSlideSource {
    root: PathBuf,
}

impl LocalSlideSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a slide id to a path inside the root.
    fn resolve(&self, slide_id: &str) -> Option<PathBuf> {
        let relative = Path::new(slide_id);
        if slide_id.is_empty() {
            return None;
        }
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }
}

fn is_slide_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(SLIDE_EXTENSION))
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    type Reader = LocalFileReader;

    async fn create_reader(&self, slide_id: &str) -> Result<Self::Reader, IoError> {
        let path = self
            .resolve(slide_id)
            .ok_or_else(|| IoError::NotFound(slide_id.to_string()))?;
        debug!(slide_id, path = %path.display(), "Opening local slide");
        LocalFileReader::new(path).await
    }

    async fn list_slides(&self) -> Result<Vec<String>, IoError> {
        let io_err = |e: std::io::Error| IoError::File(format!("{}: {}", self.root.display(), e));

        let mut slides = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(io_err)?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && is_slide_file(&path) {
                    if let Ok(relative) = path.strip_prefix(&self.root) {
                        let id: Vec<_> = relative
                            .components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect();
                        slides.push(id.join("/"));
                    }
                }
            }
        }

        slides.sort();
        Ok(slides)
    }
}
