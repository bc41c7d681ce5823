//! Scripted in-memory transport for loop and registry tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chunkup_transfer::{
    Chunk, ChunkRange, ChunkTransport, ProgressFn, TransferError, TransferFuture,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// What the transport does with the next chunk.
pub(crate) enum Step {
    /// Reports the whole chunk and acknowledges it.
    Succeed,
    /// Fails with a transport error.
    Fail(&'static str),
    /// Reports the whole chunk but acknowledges only up to the given offset.
    Acknowledge(u64),
    /// Reports half the chunk, then blocks until cancelled. A late progress
    /// call for the whole chunk is made after the cancel.
    Hang,
    /// Blocks until the notify fires (then succeeds) or the token is cancelled.
    Hold(Arc<Notify>),
}

/// Transport that follows a script; an exhausted script succeeds.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<ChunkRange>>,
    fetched: Mutex<Option<Bytes>>,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub(crate) fn with_object(data: &'static [u8]) -> Arc<Self> {
        let transport = Self::default();
        *transport.fetched.lock().unwrap() = Some(Bytes::from_static(data));
        Arc::new(transport)
    }

    /// Every range handed to the transport, in call order.
    pub(crate) fn calls(&self) -> Vec<ChunkRange> {
        self.calls.lock().unwrap().clone()
    }

    /// Waits until at least `n` chunks were handed to the transport.
    pub(crate) async fn wait_for_calls(&self, n: usize) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {n} transport calls");
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Succeed)
    }
}

impl ChunkTransport for ScriptedTransport {
    fn send_chunk<'a>(
        &'a self,
        _destination: &'a str,
        chunk: Chunk,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> TransferFuture<'a, u64> {
        self.calls.lock().unwrap().push(chunk.range);
        let step = self.next_step();
        let len = chunk.range.len();
        assert_eq!(chunk.data.len() as u64, len);

        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            match step {
                Step::Succeed => {
                    progress(len);
                    Ok(chunk.range.end)
                }
                Step::Fail(message) => Err(TransferError::TransportFailure(message.into())),
                Step::Acknowledge(end) => {
                    progress(len);
                    Ok(end)
                }
                Step::Hang => {
                    progress(len / 2);
                    cancel.cancelled().await;
                    progress(len);
                    Err(TransferError::Cancelled)
                }
                Step::Hold(release) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(TransferError::Cancelled),
                        _ = release.notified() => {
                            progress(len);
                            Ok(chunk.range.end)
                        }
                    }
                }
            }
        })
    }

    fn fetch<'a>(&'a self, destination: &'a str) -> TransferFuture<'a, Bytes> {
        let fetched = self.fetched.lock().unwrap().clone();
        Box::pin(async move {
            fetched.ok_or_else(|| {
                TransferError::TransportFailure(format!("GET {destination}: HTTP 404 Not Found"))
            })
        })
    }
}
