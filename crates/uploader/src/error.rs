//! Upload error types.

use crate::types::SessionId;

/// Errors produced by registry operations that report to the caller.
///
/// Control actions (pause, resume, cancel, start) never fail: acting on an
/// unknown session is a no-op.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("transfer error: {0}")]
    Transfer(#[from] chunkup_transfer::TransferError),
}
