//! Text rendering of upload progress.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chunkup_transfer::SpeedCalculator;
use chunkup_uploader::{SessionId, SessionSnapshot, UploadState};

const BAR_WIDTH: usize = 24;

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format a duration as mm:ss or hh:mm:ss.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{hours:02}:{mins:02}:{secs:02}")
    } else {
        format!("{mins:02}:{secs:02}")
    }
}

fn bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn state_label(snapshot: &SessionSnapshot) -> &'static str {
    match snapshot.state {
        UploadState::Idle if snapshot.paused => "paused",
        UploadState::Idle => "idle",
        UploadState::Running => "uploading",
        UploadState::Paused => "paused",
        UploadState::Completed => "done",
        UploadState::Failed => "failed",
    }
}

/// One line describing a session: name, bar, bytes, state.
pub fn status_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "{} {} {:5.1}% {}/{} {}",
        snapshot.name,
        bar(snapshot.percent()),
        snapshot.percent(),
        format_bytes(snapshot.progress.uploaded_bytes()),
        format_bytes(snapshot.progress.total_bytes),
        state_label(snapshot),
    );
    if let Some(error) = &snapshot.last_error {
        line.push_str(": ");
        line.push_str(error);
    }
    line
}

/// Progress lines with per-session throughput.
#[derive(Default)]
pub struct ProgressView {
    speeds: Mutex<HashMap<SessionId, SpeedCalculator>>,
}

impl ProgressView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the snapshot and returns its line with speed and ETA.
    pub fn line(&self, snapshot: &SessionSnapshot) -> String {
        let mut speeds = self.speeds.lock().unwrap_or_else(|e| e.into_inner());
        let calc = speeds.entry(snapshot.id).or_default();
        let uploaded = snapshot.progress.uploaded_bytes();
        calc.record(uploaded);

        let mut line = status_line(snapshot);
        let speed = calc.bytes_per_second();
        if speed > 0.0 {
            line.push_str(&format!(" {}/s", format_bytes(speed as u64)));
            let remaining = snapshot.progress.total_bytes.saturating_sub(uploaded);
            if let Some(eta) = calc.eta(remaining) {
                line.push_str(&format!(" eta {}", format_duration(eta)));
            }
        }
        line
    }

    /// Drops the throughput history of `id`.
    pub fn forget(&self, id: SessionId) {
        self.speeds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }
}
