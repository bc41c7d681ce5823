use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::chunked::detect_content_type;

/// Fallback content type for files with an unknown extension.
const OCTET_STREAM: &str = "application/octet-stream";

/// A half-open byte range `[start, end)` of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// The range that follows `committed`: `[committed, min(committed + chunk_size, total))`.
    pub fn following(committed: u64, chunk_size: u64, total: u64) -> Self {
        let start = committed.min(total);
        let end = start.saturating_add(chunk_size).min(total);
        Self { start, end }
    }

    /// Number of bytes covered by the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `Content-Range` header value for this range of a `total` byte object.
    ///
    /// The empty range of a zero-byte object is written as `bytes */0`.
    pub fn content_range(&self, total: u64) -> String {
        if self.is_empty() {
            format!("bytes */{total}")
        } else {
            format!("bytes {}-{}/{}", self.start, self.end - 1, total)
        }
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// One chunk ready to be sent: its range, the bytes, and what the
/// destination needs to place them.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub range: ChunkRange,
    /// Size of the whole file the chunk belongs to.
    pub total_size: u64,
    pub content_type: String,
    pub data: Bytes,
}

/// Reference to a local file selected for upload.
///
/// Immutable once created: the size is captured at selection time and
/// bounds every range computed for the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    path: PathBuf,
    size: u64,
    content_type: String,
}

impl FileHandle {
    /// Creates a handle for `path` with a known size.
    ///
    /// The display name is the final path component and the content type
    /// is derived from the extension.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = detect_content_type(&name)
            .unwrap_or(OCTET_STREAM)
            .to_string();
        Self {
            name,
            path,
            size,
            content_type,
        }
    }

    /// Stats `path` and creates a handle for it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        Ok(Self::new(path, metadata.len()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}
