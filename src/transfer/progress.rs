//! Progress events, throttling, and display helpers.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Snapshot of one running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub elapsed: Duration,
}

impl ProgressEvent {
    /// Completion in percent, 0.0 -- 100.0. An empty transfer counts as done.
    pub fn percent(&self) -> f64 {
        if self.bytes_total == 0 {
            return 100.0;
        }
        (self.bytes_transferred as f64 / self.bytes_total as f64 * 100.0).min(100.0)
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_transferred >= self.bytes_total
    }

    /// Average throughput in bytes per second.
    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.bytes_transferred as f64 / secs
        }
    }
}

/// Sender for reporting transfer progress.
pub struct ProgressSender {
    callback: Box<dyn Fn(ProgressEvent) + Send + Sync>,
}

impl ProgressSender {
    pub fn new(callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// A sender that discards all events.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    pub fn send(&self, event: ProgressEvent) {
        (self.callback)(event);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// Decides which intermediate updates are worth emitting.
///
/// An update passes when `interval` has elapsed since the last emitted one,
/// or when progress moved by at least `min_percent`. Updates at 100% never
/// pass; the caller emits the completion event itself.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    min_percent: f64,
    last_at: Instant,
    last_percent: f64,
}

impl ProgressThrottle {
    pub fn new(interval: Duration, min_percent: f64, started: Instant) -> Self {
        Self {
            interval,
            min_percent,
            last_at: started,
            last_percent: 0.0,
        }
    }

    /// Returns true and records the emission if `event` should go out.
    pub fn should_emit(&mut self, event: &ProgressEvent, now: Instant) -> bool {
        if event.bytes_total == 0 || event.is_complete() {
            return false;
        }
        let percent = event.percent();
        let by_time = now.duration_since(self.last_at) >= self.interval;
        let by_step = self.min_percent > 0.0 && percent - self.last_percent >= self.min_percent;
        if by_time || by_step {
            self.last_at = now;
            self.last_percent = percent;
            true
        } else {
            false
        }
    }
}

/// Human-readable byte count, e.g. `"1.50 MB"`.
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Text progress bar of `width` cells.
pub fn progress_bar(percent: f64, width: usize) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * width as f64) as usize;
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(width - filled));
    bar
}

/// One-line status text for a transfer, as shown to the user.
pub fn describe(event: &ProgressEvent) -> String {
    format!(
        "[{}] {:.1}%\n{} of {} at {}/s",
        progress_bar(event.percent(), 20),
        event.percent(),
        format_bytes(event.bytes_transferred),
        format_bytes(event.bytes_total),
        format_bytes(event.speed() as u64),
    )
}
