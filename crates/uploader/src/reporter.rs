use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::registry::SessionRegistry;
use crate::types::{SessionId, SessionSnapshot};

/// Callback invoked with a session snapshot.
pub type SnapshotCallback = Box<dyn Fn(&SessionSnapshot) + Send + Sync>;

/// Periodically reports the progress of sessions with a running loop.
pub struct ProgressReporter {
    registry: SessionRegistry,
    callbacks: Arc<RwLock<Vec<SnapshotCallback>>>,
    interval: Duration,
    stop: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl ProgressReporter {
    /// Creates a reporter using the registry's configured interval.
    pub fn new(registry: SessionRegistry) -> Self {
        let interval = registry.config().progress_interval();
        Self::with_interval(registry, interval)
    }

    pub fn with_interval(registry: SessionRegistry, interval: Duration) -> Self {
        Self {
            registry,
            callbacks: Arc::new(RwLock::new(Vec::new())),
            interval,
            stop: Mutex::new(None),
        }
    }

    /// Registers a callback.
    pub fn on_progress(&self, callback: SnapshotCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    /// Reports `id` once, whatever its state. Unknown sessions are ignored.
    pub fn notify_now(&self, id: SessionId) {
        if let Some(snapshot) = self.registry.snapshot(id) {
            notify(&self.callbacks, &snapshot);
        }
    }

    /// Starts the periodic task, replacing a running one.
    ///
    /// Call [`stop`](Self::stop) to end it.
    pub fn start(&self) {
        let (tx, mut rx) = tokio::sync::oneshot::channel();
        {
            let mut stop = self.stop.lock().unwrap_or_else(|e| e.into_inner());
            // Dropping the previous sender ends the previous task.
            *stop = Some(tx);
        }

        let registry = self.registry.clone();
        let callbacks = Arc::clone(&self.callbacks);
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for snapshot in registry.sessions().iter().filter(|s| s.loop_active) {
                            notify(&callbacks, snapshot);
                        }
                    }
                    _ = &mut rx => break,
                }
            }
        });
    }

    /// Stops the periodic task.
    pub fn stop(&self) {
        self.stop.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn notify(callbacks: &RwLock<Vec<SnapshotCallback>>, snapshot: &SessionSnapshot) {
    let callbacks = callbacks.read().unwrap_or_else(|e| e.into_inner());
    for cb in callbacks.iter() {
        cb(snapshot);
    }
}
