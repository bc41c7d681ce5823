//! Chunked file transfer primitives.
//!
//! Byte ranges, range reads from local files, and the cancellable
//! [`ChunkTransport`] that writes one range to the destination.

mod body;
mod chunked;
mod http;
mod progress;
mod transport;
mod types;
mod validation;

pub use body::ProgressStream;
pub use chunked::{ChunkReader, detect_content_type, save_object};
pub use http::{HttpChunkTransport, destination_for};
pub use progress::SpeedCalculator;
pub use transport::{ChunkTransport, ProgressFn, TransferFuture};
pub use types::{Chunk, ChunkRange, FileHandle};
pub use validation::validate_file_name;

/// Default chunk size: 5 MiB.
///
/// Fixed for the life of an upload; ranges are never resized by file size
/// or network conditions.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was aborted through its cancellation token.
    #[error("cancelled")]
    Cancelled,

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid range {start}..{end} for a {total} byte file")]
    InvalidRange { start: u64, end: u64, total: u64 },
}

impl TransferError {
    /// Returns `true` for the cancellation outcome, which is not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
