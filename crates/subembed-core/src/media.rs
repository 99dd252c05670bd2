//! Media-domain enums for containers and subtitle formats, plus the stream
//! summary produced by probing.
//!
//! All enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Container formats a submitted video can arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mkv,
    Webm,
    Mp4,
    Mov,
    Avi,
    Flv,
    Wmv,
    Ts,
}

impl Container {
    /// Map a file extension (without the dot, any case) to a container.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mkv" => Some(Self::Mkv),
            "webm" => Some(Self::Webm),
            "mp4" | "m4v" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "avi" => Some(Self::Avi),
            "flv" => Some(Self::Flv),
            "wmv" => Some(Self::Wmv),
            "ts" => Some(Self::Ts),
            _ => None,
        }
    }

    /// Container of a path, judged by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Map an ffprobe `format_name` (e.g. `"matroska,webm"`) to a container.
    ///
    /// ffprobe reports the same demuxer name for MKV and WebM, and for MP4 and
    /// MOV, so the file extension is used to break the tie.
    pub fn from_format_name(format_name: &str, path: &Path) -> Option<Self> {
        let by_ext = Self::from_path(path);
        let lower = format_name.to_ascii_lowercase();
        if lower.contains("matroska") || lower.contains("webm") {
            return Some(match by_ext {
                Some(Self::Webm) => Self::Webm,
                _ => Self::Mkv,
            });
        }
        if lower.contains("mov") || lower.contains("mp4") {
            return Some(match by_ext {
                Some(Self::Mov) => Self::Mov,
                _ => Self::Mp4,
            });
        }
        if lower.contains("avi") {
            return Some(Self::Avi);
        }
        if lower.contains("flv") {
            return Some(Self::Flv);
        }
        if lower.contains("asf") {
            return Some(Self::Wmv);
        }
        if lower.contains("mpegts") {
            return Some(Self::Ts);
        }
        by_ext
    }

    /// Whether this container is part of the MP4/QuickTime family.
    pub fn is_mp4_family(&self) -> bool {
        matches!(self, Self::Mp4 | Self::Mov)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mkv => write!(f, "mkv"),
            Self::Webm => write!(f, "webm"),
            Self::Mp4 => write!(f, "mp4"),
            Self::Mov => write!(f, "mov"),
            Self::Avi => write!(f, "avi"),
            Self::Flv => write!(f, "flv"),
            Self::Wmv => write!(f, "wmv"),
            Self::Ts => write!(f, "ts"),
        }
    }
}

// ---------------------------------------------------------------------------
// SubtitleFormat
// ---------------------------------------------------------------------------

/// Text subtitle formats accepted at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    Srt,
    Ass,
    Ssa,
    Vtt,
    /// MicroDVD frame-based `.sub`.
    #[serde(rename = "microdvd")]
    MicroDvd,
}

impl SubtitleFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "srt" => Some(Self::Srt),
            "ass" => Some(Self::Ass),
            "ssa" => Some(Self::Ssa),
            "vtt" => Some(Self::Vtt),
            "sub" => Some(Self::MicroDvd),
            _ => None,
        }
    }

    /// Format of a path, judged by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for SubtitleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Srt => write!(f, "srt"),
            Self::Ass => write!(f, "ass"),
            Self::Ssa => write!(f, "ssa"),
            Self::Vtt => write!(f, "vtt"),
            Self::MicroDvd => write!(f, "microdvd"),
        }
    }
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Kind of an elementary stream inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Attachment,
    Data,
}

impl StreamKind {
    /// Map an ffprobe `codec_type` to a stream kind. Unknown types count as data.
    pub fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "subtitle" => Self::Subtitle,
            "attachment" => Self::Attachment,
            _ => Self::Data,
        }
    }
}

/// One probed stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: String,
    pub language: Option<String>,
    pub title: Option<String>,
    pub default: bool,
}

/// Which kinds of streams a probed container holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Container the probe identified.
    pub container: Option<Container>,
    pub video_streams: usize,
    pub audio_streams: usize,
    /// Subtitle streams already present in the source.
    pub subtitle_streams: usize,
    /// Attachment streams (fonts, cover art in Matroska).
    pub attachment_streams: usize,
    pub data_streams: usize,
    pub chapters: usize,
    /// Whether one of the existing subtitle streams is flagged default.
    pub has_default_subtitle: bool,
    /// Streams in container order.
    #[serde(default)]
    pub streams: Vec<StreamInfo>,
}

impl StreamSummary {
    /// Build a summary, deriving the per-kind counts from `streams`.
    pub fn from_streams(
        container: Option<Container>,
        streams: Vec<StreamInfo>,
        chapters: usize,
    ) -> Self {
        let count = |kind| streams.iter().filter(|s| s.kind == kind).count();
        Self {
            container,
            video_streams: count(StreamKind::Video),
            audio_streams: count(StreamKind::Audio),
            subtitle_streams: count(StreamKind::Subtitle),
            attachment_streams: count(StreamKind::Attachment),
            data_streams: count(StreamKind::Data),
            chapters,
            has_default_subtitle: streams
                .iter()
                .any(|s| s.kind == StreamKind::Subtitle && s.default),
            streams,
        }
    }

    /// Total number of streams in the container.
    pub fn total_streams(&self) -> usize {
        self.video_streams
            + self.audio_streams
            + self.subtitle_streams
            + self.attachment_streams
            + self.data_streams
    }

    /// Subtitle streams in container order.
    pub fn subtitles(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Subtitle)
    }
}
