//! State of one file's upload.
//!
//! `UploadSession` holds no locks itself: the registry owns every session
//! behind its mutex and applies each transition as a whole.

use chunkup_transfer::{ChunkRange, FileHandle};
use tokio_util::sync::CancellationToken;

use crate::types::{LoopOutcome, Progress, SessionId, SessionSnapshot, UploadState};

/// Cancellation capability for one chunk attempt.
///
/// Each chunk gets a fresh handle; cancelling a handle whose chunk already
/// resolved has no effect on later chunks.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    attempt: u64,
    token: CancellationToken,
}

impl CancelHandle {
    fn new(attempt: u64) -> Self {
        Self {
            attempt,
            token: CancellationToken::new(),
        }
    }

    /// Sequence number of the chunk attempt this handle belongs to.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Aborts the chunk transport of this attempt.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// What the loop does next.
#[derive(Debug)]
pub(crate) enum NextStep {
    Send {
        range: ChunkRange,
        handle: CancelHandle,
    },
    Stop(LoopOutcome),
}

/// Upload state of one selected file.
#[derive(Debug)]
pub struct UploadSession {
    id: SessionId,
    file: FileHandle,
    destination: String,
    committed_bytes: u64,
    in_flight_bytes: u64,
    paused: bool,
    state: UploadState,
    last_error: Option<String>,
    cancel_handle: Option<CancelHandle>,
    attempts: u64,
    loop_active: bool,
}

impl UploadSession {
    /// Creates an idle session with nothing committed.
    pub fn new(file: FileHandle, destination: String) -> Self {
        Self {
            id: SessionId::new(),
            file,
            destination,
            committed_bytes: 0,
            in_flight_bytes: 0,
            paused: false,
            state: UploadState::Idle,
            last_error: None,
            cancel_handle: None,
            attempts: 0,
            loop_active: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn committed_bytes(&self) -> u64 {
        self.committed_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.file.size()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns `true` while an upload loop drives this session.
    pub fn is_loop_active(&self) -> bool {
        self.loop_active
    }

    /// Handle of the chunk currently in flight, if any.
    pub fn cancel_handle(&self) -> Option<&CancelHandle> {
        self.cancel_handle.as_ref()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            committed_bytes: self.committed_bytes,
            in_flight_bytes: self.in_flight_bytes,
            total_bytes: self.total_bytes(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            name: self.name().to_string(),
            destination: self.destination.clone(),
            state: self.state,
            paused: self.paused,
            progress: self.progress(),
            last_error: self.last_error.clone(),
            loop_active: self.loop_active,
        }
    }

    // -----------------------------------------------------------------------
    // Loop transitions
    // -----------------------------------------------------------------------

    /// Marks a loop as driving this session.
    ///
    /// Returns `false` if a loop is already active or nothing is left to send.
    pub(crate) fn claim_loop(&mut self) -> bool {
        if self.loop_active || self.state == UploadState::Completed {
            return false;
        }
        self.loop_active = true;
        self.state = UploadState::Running;
        self.last_error = None;
        true
    }

    /// Clears the loop flag when a loop exits.
    fn release_loop(&mut self) {
        self.loop_active = false;
        self.cancel_handle = None;
        self.in_flight_bytes = 0;
        if self.state == UploadState::Running {
            self.state = UploadState::Idle;
        }
    }

    /// Decides the next chunk, or why the loop stops.
    ///
    /// Stopping releases the loop in the same step, so a resume applied
    /// right after always finds the session free to start again. A
    /// zero-byte file gets one empty chunk so the object is created at the
    /// destination.
    pub(crate) fn next_step(&mut self, chunk_size: u64) -> NextStep {
        let total = self.total_bytes();
        if self.state != UploadState::Completed && total > 0 && self.committed_bytes >= total {
            self.complete();
        }
        if self.state == UploadState::Completed {
            self.release_loop();
            return NextStep::Stop(LoopOutcome::Completed);
        }
        if self.paused {
            self.state = UploadState::Paused;
            self.release_loop();
            return NextStep::Stop(LoopOutcome::Paused);
        }

        let range = ChunkRange::following(self.committed_bytes, chunk_size, total);
        self.attempts += 1;
        let handle = CancelHandle::new(self.attempts);
        self.cancel_handle = Some(handle.clone());
        self.in_flight_bytes = 0;
        self.state = UploadState::Running;
        NextStep::Send { range, handle }
    }

    /// Records in-flight progress of `attempt`.
    ///
    /// Ignored once the attempt is stale or cancelled, so no progress moves
    /// after a pause or cancel has been applied.
    pub(crate) fn record_progress(&mut self, attempt: u64, sent: u64) -> bool {
        let Some(handle) = self.current_handle(attempt) else {
            return false;
        };
        if handle.is_cancelled() {
            return false;
        }
        let room = self.total_bytes() - self.committed_bytes;
        let sent = sent.min(room);
        if sent <= self.in_flight_bytes {
            return false;
        }
        self.in_flight_bytes = sent;
        true
    }

    /// Commits the acknowledged high-water mark of `attempt`.
    pub(crate) fn commit(&mut self, attempt: u64, end: u64) -> bool {
        if self.current_handle(attempt).is_none() {
            return false;
        }
        self.cancel_handle = None;
        self.in_flight_bytes = 0;
        self.committed_bytes = end.clamp(self.committed_bytes, self.total_bytes());
        if self.committed_bytes >= self.total_bytes() {
            self.complete();
        }
        true
    }

    /// Drops the handle of a cancelled attempt without advancing.
    pub(crate) fn chunk_cancelled(&mut self, attempt: u64) -> bool {
        if self.current_handle(attempt).is_none() {
            return false;
        }
        self.cancel_handle = None;
        self.in_flight_bytes = 0;
        true
    }

    /// Records a failed attempt and releases the loop.
    ///
    /// Committed bytes stay at the last acknowledged boundary. A stale
    /// attempt only releases the loop.
    pub(crate) fn chunk_failed(&mut self, attempt: u64, error: String) -> bool {
        let current = self.current_handle(attempt).is_some();
        if current {
            self.state = UploadState::Failed;
            self.last_error = Some(error);
        }
        self.release_loop();
        current
    }

    fn complete(&mut self) {
        self.committed_bytes = self.total_bytes();
        self.in_flight_bytes = 0;
        self.cancel_handle = None;
        self.state = UploadState::Completed;
    }

    fn current_handle(&self, attempt: u64) -> Option<&CancelHandle> {
        self.cancel_handle
            .as_ref()
            .filter(|handle| handle.attempt == attempt)
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Cancels the in-flight chunk and marks the session paused.
    ///
    /// Returns `false` (and changes nothing) when no chunk is in flight.
    pub(crate) fn pause(&mut self) -> bool {
        let Some(handle) = &self.cancel_handle else {
            return false;
        };
        handle.cancel();
        self.paused = true;
        self.in_flight_bytes = 0;
        self.state = UploadState::Paused;
        true
    }

    /// Clears the pause flag.
    pub(crate) fn resume(&mut self) {
        self.paused = false;
        if self.state == UploadState::Paused {
            self.state = if self.loop_active {
                UploadState::Running
            } else {
                UploadState::Idle
            };
        }
    }

    /// Cancels the in-flight chunk, if any.
    pub(crate) fn cancel_in_flight(&mut self) {
        if let Some(handle) = self.cancel_handle.take() {
            handle.cancel();
        }
    }
}
