use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default time window for speed calculation.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Default maximum number of retained samples.
const DEFAULT_MAX_SAMPLES: usize = 100;

struct OffsetSample {
    offset: u64,
    timestamp: Instant,
}

/// Calculates upload speed from a sliding window of byte offsets.
///
/// Samples are absolute positions (bytes uploaded so far), not deltas.
/// A position lower than the previous one (in-flight progress discarded
/// after a pause or failure) restarts the window.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<OffsetSample>,
    max_samples: usize,
    window: Duration,
}

impl Default for SpeedCalculator {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(DEFAULT_MAX_SAMPLES).max(2),
                window: window.unwrap_or(DEFAULT_WINDOW),
            }),
        }
    }

    /// Records the current upload position.
    pub fn record(&self, offset: u64) {
        self.record_at(offset, Instant::now());
    }

    fn record_at(&self, offset: u64, now: Instant) {
        let mut s = self.lock();
        if s.samples.last().is_some_and(|last| offset < last.offset) {
            s.samples.clear();
        }
        s.samples.push(OffsetSample {
            offset,
            timestamp: now,
        });

        let window = s.window;
        s.samples
            .retain(|sample| now.duration_since(sample.timestamp) <= window);

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second over the window.
    ///
    /// Returns 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.lock();
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }
        (last.offset - first.offset) as f64 / elapsed.as_secs_f64()
    }

    /// Estimates the time needed for `remaining_bytes`.
    ///
    /// Returns `None` while the speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        self.lock().samples.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SpeedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
