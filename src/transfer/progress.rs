// Throttled transfer progress

use tokio::time::{Duration, Instant};

/// Minimum wall time between two periodic progress reports
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One progress report
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    /// Completed fraction in `[0, 1]`; 0 when the total is unknown
    pub fraction: f32,

    /// Average throughput, e.g. `"1.25 MB/s"`
    pub throughput: String,

    /// Estimated time remaining, e.g. `"2m5s"`
    pub eta: String,
}

/// Decides when a transfer should report progress.
///
/// Reports are emitted when at least [`PROGRESS_INTERVAL`] passed since the
/// previous one, when the transfer reaches its declared total, or when the
/// remaining bytes first fit in a single chunk. The last rule fires once per
/// transfer and still produces a near-complete report when the server never
/// signals the end explicitly.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    chunk_size: u64,
    started: Instant,
    last_emit: Instant,
    emitted_last: bool,
    near_complete_reported: bool,
}

impl ProgressTracker {
    pub fn new(total: u64, chunk_size: usize, started: Instant) -> Self {
        Self {
            total,
            chunk_size: chunk_size as u64,
            started,
            last_emit: started,
            emitted_last: false,
            near_complete_reported: false,
        }
    }

    /// Record `bytes_read` so far; returns a report when one is due
    pub fn observe(&mut self, bytes_read: u64, now: Instant) -> Option<TransferProgress> {
        let interval_elapsed = now.duration_since(self.last_emit) >= PROGRESS_INTERVAL;
        let complete = bytes_read == self.total;
        let last_chunk_pending = !self.near_complete_reported
            && self.total > bytes_read
            && self.total - bytes_read <= self.chunk_size;
        if last_chunk_pending {
            self.near_complete_reported = true;
        }

        self.emitted_last = interval_elapsed || complete || last_chunk_pending;
        if !self.emitted_last {
            return None;
        }

        self.last_emit = now;
        Some(self.snapshot(bytes_read, now))
    }

    /// Final report at end of stream, unless the last observation already
    /// produced one
    pub fn finish(&mut self, bytes_read: u64, now: Instant) -> Option<TransferProgress> {
        if self.emitted_last {
            return None;
        }
        self.emitted_last = true;
        self.last_emit = now;
        Some(self.snapshot(bytes_read, now))
    }

    pub fn snapshot(&self, bytes_read: u64, now: Instant) -> TransferProgress {
        let elapsed = now.duration_since(self.started).as_secs_f64();

        let fraction = if self.total > 0 {
            (bytes_read as f64 / self.total as f64).min(1.0) as f32
        } else {
            0.0
        };

        let eta_seconds = if bytes_read > 0 {
            ((elapsed / bytes_read as f64) * (self.total as f64 - bytes_read as f64)) as i64
        } else {
            0
        };

        TransferProgress {
            fraction,
            throughput: format_throughput(bytes_read, elapsed),
            eta: format_eta(eta_seconds),
        }
    }
}

/// Format average throughput in MB/s with two decimals
pub fn format_throughput(bytes: u64, elapsed_secs: f64) -> String {
    if elapsed_secs > 0.0 {
        format!("{:.2} MB/s", bytes as f64 / elapsed_secs / BYTES_PER_MB)
    } else {
        "0.00 MB/s".to_string()
    }
}

/// Format a remaining-time estimate as `"{m}m{s}s"` or `"{s}s"`
pub fn format_eta(total_seconds: i64) -> String {
    if total_seconds <= 0 {
        return "0s".to_string();
    }
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
