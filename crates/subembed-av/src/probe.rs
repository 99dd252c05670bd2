//! ffprobe-backed stream summaries.
//!
//! Shells out to `ffprobe -v error -print_format json -show_format
//! -show_streams -show_chapters` and maps the JSON into a
//! [`StreamSummary`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use subembed_core::{Container, Error, Result, StreamInfo, StreamKind, StreamSummary};
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Probe `path`. Failures are reported as [`Error::Probe`] so callers can
    /// treat an unreadable file as an ingestion problem.
    pub async fn probe(&self, path: &Path, cancel: &CancellationToken) -> Result<StreamSummary> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-show_chapters",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.timeout(PROBE_TIMEOUT).cancel_on(cancel.clone()).diagnostic_lines(3);

        let output = cmd.execute().await.map_err(|e| match e {
            Error::Tool { message, .. } => Error::Probe(message),
            other => other,
        })?;

        parse_ffprobe_json(path, &output.stdout)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    chapters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: Option<usize>,
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Map ffprobe JSON output for `path` into a [`StreamSummary`].
///
/// A file without a single video or audio stream is rejected.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<StreamSummary> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let container = output
        .format
        .as_ref()
        .and_then(|f| f.format_name.as_deref())
        .and_then(|name| Container::from_format_name(name, path))
        .or_else(|| Container::from_path(path));

    let streams: Vec<StreamInfo> = output
        .streams
        .into_iter()
        .enumerate()
        .map(|(i, s)| StreamInfo {
            index: s.index.unwrap_or(i),
            kind: StreamKind::from_codec_type(s.codec_type.as_deref().unwrap_or("")),
            codec: s.codec_name.unwrap_or_default(),
            language: s.tags.language,
            title: s.tags.title,
            default: s.disposition.default == 1,
        })
        .collect();

    let summary = StreamSummary::from_streams(container, streams, output.chapters.len());

    if summary.video_streams == 0 && summary.audio_streams == 0 {
        return Err(Error::Probe("no video or audio streams found".into()));
    }

    Ok(summary)
}
