//! Data types shared by the session, the registry and the loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of an upload session.
///
/// Generated per selection; two files with the same name get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Upload state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Selected, no loop has run yet (or a resume is waiting to start).
    #[default]
    Idle,
    /// A loop is sending chunks.
    Running,
    /// Stopped by pause; resumable from the committed offset.
    Paused,
    /// Every byte acknowledged.
    Completed,
    /// Stopped by a transport failure; resumable from the committed offset.
    Failed,
}

/// Byte-level progress of one session.
///
/// An unknown session reports `Progress::default()` (all zeros).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Acknowledged high-water mark: the resume point.
    pub committed_bytes: u64,
    /// Bytes of the in-flight chunk sent so far, for display only.
    pub in_flight_bytes: u64,
    pub total_bytes: u64,
}

impl Progress {
    /// Committed plus in-flight bytes, capped at the total.
    pub fn uploaded_bytes(&self) -> u64 {
        self.committed_bytes
            .saturating_add(self.in_flight_bytes)
            .min(self.total_bytes)
    }

    /// Fraction uploaded in `[0.0, 1.0]`; 0.0 for an empty total.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.uploaded_bytes() as f64 / self.total_bytes as f64
    }
}

/// Read-only view of a session for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub name: String,
    pub destination: String,
    pub state: UploadState,
    pub paused: bool,
    pub progress: Progress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub loop_active: bool,
}

impl SessionSnapshot {
    /// Percentage for a progress bar; a completed empty file shows 100.
    pub fn percent(&self) -> f64 {
        if self.state == UploadState::Completed {
            return 100.0;
        }
        (self.progress.fraction() * 100.0).min(100.0)
    }
}

/// Event emitted while sessions upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A loop started driving the session.
    Started { id: SessionId },
    /// Bytes uploaded so far (committed plus in flight).
    Progress {
        id: SessionId,
        uploaded: u64,
        total: u64,
    },
    /// The loop stopped because the session was paused.
    Paused { id: SessionId },
    Completed { id: SessionId },
    /// The loop stopped on a transport failure; the session is resumable.
    Failed { id: SessionId, error: String },
    /// The session was cancelled and removed.
    Cancelled { id: SessionId },
}

/// How one run of the upload loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed,
    Paused,
    Failed,
    /// The session left the registry (cancelled) while the loop ran.
    Removed,
}
