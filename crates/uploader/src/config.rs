//! Uploader configuration.

use std::time::Duration;

use chunkup_transfer::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};

/// Default capacity of the upload event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default interval of periodic progress reports.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Settings shared by every session of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Chunk size in bytes; 0 selects [`DEFAULT_CHUNK_SIZE`].
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Destination URL template; `{name}` is replaced by the file name.
    #[serde(default)]
    pub destination: String,

    /// Capacity of the event channel; events beyond it are dropped.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_MS
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            destination: String::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

impl UploaderConfig {
    /// Creates a config for `destination` with default sizes.
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            ..Self::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Chunk size to use, falling back to the default for 0.
    pub fn effective_chunk_size(&self) -> u64 {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}
