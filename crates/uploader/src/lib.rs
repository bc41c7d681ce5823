//! Pausable, resumable chunked uploads.
//!
//! Each selected file becomes an [`UploadSession`] owned by a
//! [`SessionRegistry`]. Starting a session spawns an upload loop that sends
//! the file as fixed-size chunks, one at a time, through a
//! [`ChunkTransport`](chunkup_transfer::ChunkTransport).
//!
//! # Control
//!
//! - **Pause** cancels the in-flight chunk; committed bytes stay at the last
//!   acknowledged chunk boundary.
//! - **Resume** continues from the committed offset.
//! - **Cancel** aborts the in-flight chunk and forgets the session.
//!
//! A transport failure stops the loop with the session in `Failed` state; a
//! new start retries from the committed offset. There is no automatic retry.

pub mod config;
pub mod error;
pub mod registry;
pub mod reporter;
pub mod session;
pub mod types;
mod upload_loop;

#[cfg(test)]
mod testing;

// Re-export primary types for convenience.
pub use config::UploaderConfig;
pub use error::UploadError;
pub use registry::SessionRegistry;
pub use reporter::{ProgressReporter, SnapshotCallback};
pub use session::{CancelHandle, UploadSession};
pub use types::{LoopOutcome, Progress, SessionId, SessionSnapshot, UploadEvent, UploadState};
