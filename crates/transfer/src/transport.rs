use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::TransferError;
use crate::types::Chunk;

/// Progress callback for one chunk: receives the cumulative number of
/// bytes of *this* chunk sent so far.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Boxed future returned by [`ChunkTransport`] operations.
pub type TransferFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Writes byte ranges to a remote destination.
///
/// Using a trait keeps the upload loop decoupled from HTTP and testable
/// with scripted transports.
pub trait ChunkTransport: Send + Sync {
    /// Sends exactly `chunk.range` to `destination`.
    ///
    /// Resolves with the new high-water mark (`chunk.range.end`) on success.
    /// Cancelling `cancel` aborts the network operation and resolves with
    /// [`TransferError::Cancelled`]; `progress` is not invoked after that.
    fn send_chunk<'a>(
        &'a self,
        destination: &'a str,
        chunk: Chunk,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> TransferFuture<'a, u64>;

    /// Fetches the whole object stored at `destination`.
    fn fetch<'a>(&'a self, destination: &'a str) -> TransferFuture<'a, Bytes>;
}
