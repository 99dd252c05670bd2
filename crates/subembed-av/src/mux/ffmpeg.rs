//! ffmpeg-backed [`MuxBackend`].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use subembed_core::config::MuxConfig;
use subembed_core::{Error, Result, StreamSummary};
use tokio_util::sync::CancellationToken;

use super::plan::{build_ffmpeg_args, drops_data_streams};
use super::{MuxBackend, MuxOutcome, MuxRequest};
use crate::command::ToolCommand;
use crate::probe::FfprobeProber;
use crate::tools::ToolRegistry;
use crate::workspace::remove_file_if_exists;

/// Runs `ffmpeg` for muxing and `ffprobe` for probing.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
    prober: FfprobeProber,
    deadline: Duration,
    diagnostic_lines: usize,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: PathBuf, ffprobe_path: PathBuf, config: &MuxConfig) -> Self {
        Self {
            ffmpeg_path,
            prober: FfprobeProber::new(ffprobe_path),
            deadline: config.deadline(),
            diagnostic_lines: config.diagnostic_lines,
        }
    }

    /// Build a muxer from discovered tools. Fails if ffmpeg or ffprobe is missing.
    pub fn from_registry(tools: &ToolRegistry, config: &MuxConfig) -> Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?.path.clone();
        let ffprobe = tools.require("ffprobe")?.path.clone();
        Ok(Self::new(ffmpeg, ffprobe, config))
    }

    async fn run(&self, request: &MuxRequest, cancel: &CancellationToken) -> Result<MuxOutcome> {
        // Incompatible inputs fail here, before any process exists.
        let args = build_ffmpeg_args(request)?;
        if drops_data_streams(request) {
            tracing::warn!(
                container = %request.container,
                data_streams = request.source.data_streams,
                "dropping data streams the container cannot carry"
            );
        }

        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let started = Instant::now();
        let mut cmd = ToolCommand::new(self.ffmpeg_path.clone());
        cmd.args(args)
            .timeout(self.deadline)
            .cancel_on(cancel.clone())
            .diagnostic_lines(self.diagnostic_lines);

        cmd.execute().await.map_err(|e| match e {
            Error::Tool { message, .. } => Error::mux(message),
            other => other,
        })?;

        let size = match tokio::fs::metadata(&request.output).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => return Err(Error::mux("ffmpeg finished but produced no output")),
        };

        Ok(MuxOutcome {
            output: request.output.clone(),
            size,
            elapsed: started.elapsed(),
        })
    }
}

#[async_trait]
impl MuxBackend for FfmpegMuxer {
    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<StreamSummary> {
        self.prober.probe(path, cancel).await
    }

    async fn mux(&self, request: &MuxRequest, cancel: &CancellationToken) -> Result<MuxOutcome> {
        tracing::info!(
            video = %request.video.display(),
            container = %request.container,
            tracks = request.subtitles.len(),
            "muxing subtitles"
        );

        let result = self.run(request, cancel).await;
        match &result {
            Ok(outcome) => {
                tracing::info!(size = outcome.size, elapsed = ?outcome.elapsed, "mux finished");
            }
            Err(e) => {
                tracing::warn!(error = %e, "mux failed; removing partial output");
                if let Err(rm) = remove_file_if_exists(&request.output) {
                    tracing::warn!(error = %rm, "failed to remove partial output");
                }
            }
        }
        result
    }
}
