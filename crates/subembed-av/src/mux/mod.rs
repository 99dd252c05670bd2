//! Soft-subtitle muxing.
//!
//! [`MuxBackend`] is the seam between the session layer and whatever spawns
//! processes. [`FfmpegMuxer`] is the production backend; [`plan`] holds the
//! pure codec and argument logic it relies on.

mod ffmpeg;
pub mod plan;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use subembed_core::config::DefaultSubtitle;
use subembed_core::{Container, Result, StreamSummary, SubtitleFormat};
use tokio_util::sync::CancellationToken;

pub use ffmpeg::FfmpegMuxer;
pub use plan::{plan_subtitle_codec, SubtitleCodec};

/// One subtitle file to add as a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleInput {
    pub path: PathBuf,
    pub format: SubtitleFormat,
    /// ISO 639-2 language tag.
    pub language: String,
    /// Track title.
    pub title: String,
}

/// Everything needed to produce one output container.
#[derive(Debug, Clone)]
pub struct MuxRequest {
    pub video: PathBuf,
    pub container: Container,
    /// Probe result of `video`, used to place the new tracks.
    pub source: StreamSummary,
    /// New tracks, in output order.
    pub subtitles: Vec<SubtitleInput>,
    pub output: PathBuf,
    pub default_subtitle: DefaultSubtitle,
}

/// A successful mux.
#[derive(Debug, Clone)]
pub struct MuxOutcome {
    pub output: PathBuf,
    pub size: u64,
    pub elapsed: Duration,
}

/// Probes inputs and merges subtitles into a container.
#[async_trait]
pub trait MuxBackend: Send + Sync {
    /// Summarize the streams of a submitted video.
    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<StreamSummary>;

    /// Produce `request.output`. On any failure the partial output is deleted.
    async fn mux(&self, request: &MuxRequest, cancel: &CancellationToken) -> Result<MuxOutcome>;
}
