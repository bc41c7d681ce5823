use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chunkup_transfer::{ChunkTransport, FileHandle, ProgressFn, destination_for, save_object};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::UploadError;
use crate::config::UploaderConfig;
use crate::session::{CancelHandle, UploadSession};
use crate::types::{LoopOutcome, Progress, SessionId, SessionSnapshot, UploadEvent};
use crate::upload_loop::UploadLoop;

/// State shared between the registry handle and its upload loops.
pub(crate) struct Shared {
    sessions: Mutex<HashMap<SessionId, UploadSession>>,
    pub(crate) transport: Arc<dyn ChunkTransport>,
    pub(crate) config: UploaderConfig,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
    events_taken: AtomicBool,
}

impl Shared {
    /// Locks the session map.
    ///
    /// Every critical section leaves the map consistent, so a poisoned lock
    /// is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, UploadSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reads one session under the lock.
    pub(crate) fn with_session<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&UploadSession) -> R,
    ) -> Option<R> {
        self.lock().get(&id).map(f)
    }

    /// Applies one transition under the lock; `None` if the session is gone.
    pub(crate) fn with_session_mut<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut UploadSession) -> R,
    ) -> Option<R> {
        self.lock().get_mut(&id).map(f)
    }

    /// Sends a progress event without waiting; dropped if the consumer lags.
    pub(crate) fn emit_progress(&self, event: UploadEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            tracing::trace!("progress event dropped: {e}");
        }
    }

    /// Sends a lifecycle event, waiting for room while a consumer holds the
    /// receiver. Without a consumer the event is dropped.
    pub(crate) async fn deliver(&self, event: UploadEvent) {
        if !self.events_taken.load(Ordering::Acquire) {
            let _ = self.events_tx.try_send(event);
            return;
        }
        if self.events_tx.send(event).await.is_err() {
            tracing::trace!("event receiver dropped");
        }
    }

    /// [`deliver`](Self::deliver) from synchronous code: a full channel hands
    /// the send to a task of the current runtime.
    fn deliver_detached(&self, event: UploadEvent) {
        let event = match self.events_tx.try_send(event) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Closed(_)) => return,
            Err(mpsc::error::TrySendError::Full(event)) => event,
        };
        if !self.events_taken.load(Ordering::Acquire) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tx = self.events_tx.clone();
                handle.spawn(async move {
                    let _ = tx.send(event).await;
                });
            }
            Err(_) => tracing::warn!(?event, "event dropped: channel full outside a runtime"),
        }
    }

    /// Progress callback for one chunk attempt of `id`.
    pub(crate) fn progress_fn(self: &Arc<Self>, id: SessionId, attempt: u64) -> ProgressFn {
        let shared = Arc::clone(self);
        Arc::new(move |sent| {
            let progress = shared
                .with_session_mut(id, |s| s.record_progress(attempt, sent).then(|| s.progress()))
                .flatten();
            if let Some(progress) = progress {
                shared.emit_progress(UploadEvent::Progress {
                    id,
                    uploaded: progress.uploaded_bytes(),
                    total: progress.total_bytes,
                });
            }
        })
    }
}

/// Owns every upload session and is the only entry point that mutates them.
///
/// Cloning is cheap; clones share the same sessions. Operations that start
/// a loop spawn a tokio task and must be called from within a runtime.
#[derive(Clone)]
pub struct SessionRegistry {
    shared: Arc<Shared>,
}

impl SessionRegistry {
    pub fn new(transport: Arc<dyn ChunkTransport>, config: UploaderConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                sessions: Mutex::new(HashMap::new()),
                transport,
                config,
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                events_taken: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.shared.config
    }

    /// Creates one idle session per file and returns their ids in order.
    ///
    /// Nothing is uploaded until [`start_upload`](Self::start_upload).
    pub fn select(&self, files: impl IntoIterator<Item = FileHandle>) -> Vec<SessionId> {
        let template = &self.shared.config.destination;
        let mut sessions = self.shared.lock();
        files
            .into_iter()
            .map(|file| {
                let destination = destination_for(template, file.name());
                let session = UploadSession::new(file, destination);
                let id = session.id();
                tracing::debug!(
                    session = %id,
                    name = %session.name(),
                    size = session.total_bytes(),
                    "file selected"
                );
                sessions.insert(id, session);
                id
            })
            .collect()
    }

    /// Selects `files` and starts uploading each of them.
    pub fn upload(&self, files: impl IntoIterator<Item = FileHandle>) -> Vec<SessionId> {
        let ids = self.select(files);
        for id in &ids {
            self.start_upload(*id);
        }
        ids
    }

    /// Starts the upload loop of `id` as its own task.
    ///
    /// Returns `None` (and does nothing) if the session does not exist, is
    /// completed, or already has a loop running.
    pub fn start_upload(&self, id: SessionId) -> Option<JoinHandle<LoopOutcome>> {
        let claimed = self
            .shared
            .with_session_mut(id, |s| s.claim_loop())
            .unwrap_or(false);
        if !claimed {
            tracing::trace!(session = %id, "start ignored");
            return None;
        }
        let upload = UploadLoop::new(Arc::clone(&self.shared), id);
        Some(tokio::spawn(upload.run()))
    }

    /// Pauses `id` by cancelling its in-flight chunk.
    ///
    /// Returns `false` if there is no such session or no chunk in flight;
    /// nothing changes in that case.
    pub fn pause(&self, id: SessionId) -> bool {
        let paused = self
            .shared
            .with_session_mut(id, |s| s.pause())
            .unwrap_or(false);
        if paused {
            tracing::debug!(session = %id, "pause requested");
        }
        paused
    }

    /// Clears the pause flag of `id` and starts its loop again.
    ///
    /// If the previous loop is still unwinding, that loop continues from the
    /// committed offset and `None` is returned.
    pub fn resume(&self, id: SessionId) -> Option<JoinHandle<LoopOutcome>> {
        self.shared.with_session_mut(id, |s| s.resume())?;
        tracing::debug!(session = %id, "resume requested");
        self.start_upload(id)
    }

    /// Cancels the in-flight chunk of `id` and removes the session.
    ///
    /// Returns `false` if the session did not exist.
    pub fn cancel(&self, id: SessionId) -> bool {
        let removed = self.shared.lock().remove(&id);
        let Some(mut session) = removed else {
            return false;
        };
        session.cancel_in_flight();
        tracing::info!(session = %id, name = %session.name(), "upload cancelled");
        self.shared.deliver_detached(UploadEvent::Cancelled { id });
        true
    }

    /// Progress of `id`; zero for an unknown session.
    pub fn progress_of(&self, id: SessionId) -> Progress {
        self.shared
            .with_session(id, UploadSession::progress)
            .unwrap_or_default()
    }

    pub fn snapshot(&self, id: SessionId) -> Option<SessionSnapshot> {
        self.shared.with_session(id, UploadSession::snapshot)
    }

    /// Snapshots of every session, ordered by name.
    pub fn sessions(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<_> = self
            .shared
            .lock()
            .values()
            .map(UploadSession::snapshot)
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Ids of every session whose display name is `name`.
    pub fn find_by_name(&self, name: &str) -> Vec<SessionId> {
        self.shared
            .lock()
            .values()
            .filter(|s| s.name() == name)
            .map(UploadSession::id)
            .collect()
    }

    /// Handle of the chunk currently in flight for `id`.
    pub fn in_flight_handle(&self, id: SessionId) -> Option<CancelHandle> {
        self.shared
            .with_session(id, |s| s.cancel_handle().cloned())
            .flatten()
    }

    /// Fetches the stored object of `id` and saves it as `dir/<name>`.
    pub async fn download(&self, id: SessionId, dir: &Path) -> Result<PathBuf, UploadError> {
        let (name, destination) = self
            .shared
            .with_session(id, |s| (s.name().to_string(), s.destination().to_string()))
            .ok_or(UploadError::SessionNotFound(id))?;

        let data = self.shared.transport.fetch(&destination).await?;
        let path = save_object(dir, &name, &data).await?;
        tracing::info!(session = %id, path = %path.display(), bytes = data.len(), "download saved");
        Ok(path)
    }

    /// Takes the receiver of the event stream; `None` after the first call.
    ///
    /// Progress events are dropped when the receiver lags; lifecycle events
    /// (started, paused, completed, failed, cancelled) are never dropped
    /// while the receiver is alive.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        let rx = self
            .shared
            .events_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if rx.is_some() {
            self.shared.events_taken.store(true, Ordering::Release);
        }
        rx
    }
}
