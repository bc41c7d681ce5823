use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::types::ChunkRange;
use crate::{TransferError, validate_file_name};

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads byte ranges of a local file for upload.
///
/// Sequential reads avoid a seek; a range that does not start at the
/// current offset (resume after pause or failure) seeks first.
pub struct ChunkReader {
    file: tokio::fs::File,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for range reads.
    pub async fn open(path: &Path) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self {
            file,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to the given byte offset.
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.offset = offset;
        Ok(())
    }

    /// Reads exactly the bytes of `range`.
    ///
    /// Fails with [`TransferError::InvalidRange`] if the range extends past
    /// the end of the file as it is on disk now.
    pub async fn read_range(&mut self, range: ChunkRange) -> Result<Bytes, TransferError> {
        if range.end > self.file_size {
            return Err(TransferError::InvalidRange {
                start: range.start,
                end: range.end,
                total: self.file_size,
            });
        }
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        if self.offset != range.start {
            self.seek_to(range.start).await?;
        }

        let mut buf = vec![0u8; range.len() as usize];
        self.file.read_exact(&mut buf).await?;
        self.offset = range.end;
        Ok(Bytes::from(buf))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// File size in bytes at open time.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

// ---------------------------------------------------------------------------
// Download target
// ---------------------------------------------------------------------------

/// Writes a downloaded object to `dir/<file_name>` and returns the path.
///
/// The name must be a single path component; parent directories of `dir`
/// are created as needed.
pub async fn save_object(
    dir: &Path,
    file_name: &str,
    data: &[u8],
) -> Result<PathBuf, TransferError> {
    validate_file_name(file_name)?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Content type
// ---------------------------------------------------------------------------

/// Detects a MIME content type from a file name extension.
pub fn detect_content_type(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        Some("mp4") => Some("video/mp4"),
        Some("mov") => Some("video/quicktime"),
        Some("mkv") => Some("video/x-matroska"),
        Some("mp3") => Some("audio/mpeg"),
        Some("pdf") => Some("application/pdf"),
        Some("zip") => Some("application/zip"),
        Some("gz") => Some("application/gzip"),
        Some("tar") => Some("application/x-tar"),
        Some("json") => Some("application/json"),
        Some("txt" | "log") => Some("text/plain"),
        Some("csv") => Some("text/csv"),
        _ => None,
    }
}
