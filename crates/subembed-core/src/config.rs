//! Application configuration types.
//!
//! The top-level [`Config`] carries every sub-config the session service
//! needs. Every section defaults sensibly so a completely empty file is
//! valid. Reading and parsing the file is left to the binary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub transfer: TransferConfig,
    pub mux: MuxConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.session.idle_timeout_secs == 0 {
            warnings.push("session.idle_timeout_secs is 0; sessions expire immediately".into());
        }
        if self.session.max_video_bytes == 0 {
            warnings.push("session.max_video_bytes is 0; every video will be rejected".into());
        }
        if self.session.max_subtitle_bytes == 0 {
            warnings.push("session.max_subtitle_bytes is 0; every subtitle will be rejected".into());
        }

        if self.transfer.max_attempts == 0 {
            warnings.push("transfer.max_attempts is 0; treated as 1".into());
        }
        if !(0.0..=100.0).contains(&self.transfer.progress_min_percent) {
            warnings.push(format!(
                "transfer.progress_min_percent {} is outside 0..=100",
                self.transfer.progress_min_percent
            ));
        }
        if self.transfer.buffer_size == 0 {
            warnings.push("transfer.buffer_size is 0; the default will be used".into());
        }

        if self.mux.max_concurrent == 0 {
            warnings.push("mux.max_concurrent is 0; no mux job could ever run, treated as 1".into());
        }
        if self.mux.deadline_secs == 0 {
            warnings.push("mux.deadline_secs is 0; every mux job would time out".into());
        }

        if self.storage.root.as_os_str().is_empty() {
            warnings.push("storage.root is empty; the current directory will be used".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Where session files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; each session gets `<root>/<user>/<session>/`.
    pub root: PathBuf,
    /// Refuse downloads that would leave less than this many bytes free.
    pub min_free_bytes: u64,
    /// Delete session directories left behind by a previous process at startup.
    pub sweep_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/sessions"),
            min_free_bytes: 256 * 1024 * 1024,
            sweep_on_start: true,
        }
    }
}

/// Session lifecycle limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity after which a non-idle session is cancelled.
    pub idle_timeout_secs: u64,
    pub max_video_bytes: u64,
    pub max_subtitle_bytes: u64,
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            max_video_bytes: 4 * 1024 * 1024 * 1024,
            max_subtitle_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Download / upload behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Minimum time between two progress events.
    pub progress_interval_ms: u64,
    /// Percent advance that triggers a progress event before the interval elapses.
    pub progress_min_percent: f64,
    pub max_attempts: u32,
    /// First retry waits this long; every further retry doubles it.
    pub backoff_base_ms: u64,
    pub buffer_size: usize,
}

impl TransferConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 10_000,
            progress_min_percent: 10.0,
            max_attempts: 3,
            backoff_base_ms: 500,
            buffer_size: 64 * 1024,
        }
    }
}

/// Which added subtitle track (if any) is flagged as default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultSubtitle {
    /// The first submitted track, unless the source already has a default subtitle.
    #[default]
    First,
    /// No added track is default.
    None,
}

/// Mux engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// System-wide cap on concurrently running mux processes.
    pub max_concurrent: usize,
    /// Wall-clock limit for a single mux process.
    pub deadline_secs: u64,
    /// Number of trailing stderr lines kept as the failure diagnostic.
    pub diagnostic_lines: usize,
    pub default_subtitle: DefaultSubtitle,
}

impl MuxConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            deadline_secs: 30 * 60,
            diagnostic_lines: 20,
            default_subtitle: DefaultSubtitle::First,
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}
