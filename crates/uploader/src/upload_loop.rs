use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chunkup_transfer::{Chunk, ChunkRange, ChunkReader, FileHandle, TransferError};

use crate::registry::Shared;
use crate::session::NextStep;
use crate::types::{LoopOutcome, SessionId, UploadEvent};

/// Sequential chunk sender for one session.
///
/// Chunk `N + 1` is never started before chunk `N` resolved. Every state
/// change goes through the registry lock; the lock is never held while
/// reading the file or waiting on the transport.
pub(crate) struct UploadLoop {
    shared: Arc<Shared>,
    id: SessionId,
}

impl UploadLoop {
    pub(crate) fn new(shared: Arc<Shared>, id: SessionId) -> Self {
        Self { shared, id }
    }

    pub(crate) async fn run(self) -> LoopOutcome {
        let id = self.id;
        let Some((file, destination)) = self
            .shared
            .with_session(id, |s| (s.file().clone(), s.destination().to_string()))
        else {
            return LoopOutcome::Removed;
        };

        tracing::info!(
            session = %id,
            name = %file.name(),
            size = file.size(),
            destination = %destination,
            "upload started"
        );
        self.shared.deliver(UploadEvent::Started { id }).await;

        let outcome = match self.drive(&file, &destination).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.shared.deliver(UploadEvent::Failed { id, error }).await;
                return LoopOutcome::Failed;
            }
        };

        match outcome {
            LoopOutcome::Completed => {
                tracing::info!(session = %id, name = %file.name(), "upload completed");
                self.shared.deliver(UploadEvent::Completed { id }).await;
            }
            LoopOutcome::Paused => {
                tracing::info!(session = %id, name = %file.name(), "upload paused");
                self.shared.deliver(UploadEvent::Paused { id }).await;
            }
            LoopOutcome::Removed => {
                tracing::debug!(session = %id, name = %file.name(), "session removed, loop exits");
            }
            LoopOutcome::Failed => unreachable!("failures return before this match"),
        }
        outcome
    }

    /// Sends chunks until the session completes, pauses, fails, or leaves
    /// the registry. A failure is returned as its message.
    async fn drive(&self, file: &FileHandle, destination: &str) -> Result<LoopOutcome, String> {
        let id = self.id;
        let chunk_size = self.shared.config.effective_chunk_size();
        let mut reader: Option<ChunkReader> = None;

        loop {
            let step = self
                .shared
                .with_session_mut(id, |s| s.next_step(chunk_size));
            let (range, handle) = match step {
                Some(NextStep::Send { range, handle }) => (range, handle),
                Some(NextStep::Stop(outcome)) => return Ok(outcome),
                None => return Ok(LoopOutcome::Removed),
            };
            let attempt = handle.attempt();

            let data = match read_range(&mut reader, file.path(), range).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        session = %id,
                        name = %file.name(),
                        start = range.start,
                        end = range.end,
                        "reading chunk failed: {e}"
                    );
                    return self.fail(attempt, e);
                }
            };

            let chunk = Chunk {
                range,
                total_size: file.size(),
                content_type: file.content_type().to_string(),
                data,
            };
            let progress = self.shared.progress_fn(id, attempt);
            let result = self
                .shared
                .transport
                .send_chunk(destination, chunk, progress, handle.token())
                .await;

            match result {
                Ok(high_water) if high_water != range.end => {
                    tracing::warn!(
                        session = %id,
                        name = %file.name(),
                        start = range.start,
                        end = range.end,
                        acknowledged = high_water,
                        "chunk acknowledged short"
                    );
                    let error = TransferError::TransportFailure(format!(
                        "acknowledged {high_water} bytes, expected {}",
                        range.end
                    ));
                    return self.fail(attempt, error);
                }
                Ok(high_water) => {
                    let committed = self.shared.with_session_mut(id, |s| {
                        s.commit(attempt, high_water).then(|| s.progress())
                    });
                    match committed {
                        None => return Ok(LoopOutcome::Removed),
                        Some(None) => continue,
                        Some(Some(progress)) => {
                            tracing::debug!(
                                session = %id,
                                start = range.start,
                                end = range.end,
                                committed = progress.committed_bytes,
                                "chunk committed"
                            );
                            self.shared.emit_progress(UploadEvent::Progress {
                                id,
                                uploaded: progress.uploaded_bytes(),
                                total: progress.total_bytes,
                            });
                        }
                    }
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(
                        session = %id,
                        start = range.start,
                        end = range.end,
                        "chunk cancelled"
                    );
                    if self
                        .shared
                        .with_session_mut(id, |s| s.chunk_cancelled(attempt))
                        .is_none()
                    {
                        return Ok(LoopOutcome::Removed);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        session = %id,
                        name = %file.name(),
                        start = range.start,
                        end = range.end,
                        "chunk transport failed: {e}"
                    );
                    return self.fail(attempt, e);
                }
            }
        }
    }

    fn fail(&self, attempt: u64, error: TransferError) -> Result<LoopOutcome, String> {
        let message = error.to_string();
        match self
            .shared
            .with_session_mut(self.id, |s| s.chunk_failed(attempt, message.clone()))
        {
            Some(_) => Err(message),
            None => Ok(LoopOutcome::Removed),
        }
    }
}

/// Reads `range`, opening the file on first use.
async fn read_range(
    reader: &mut Option<ChunkReader>,
    path: &Path,
    range: ChunkRange,
) -> Result<Bytes, TransferError> {
    let reader = match reader {
        Some(reader) => reader,
        None => reader.insert(ChunkReader::open(path).await?),
    };
    reader.read_range(range).await
}
