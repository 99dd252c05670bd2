//! Session data model and the results handed back to the transport.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use subembed_core::{Container, JobId, SessionId, StreamSummary, SubtitleFormat, UserId};

use crate::collaborators::Delivery;

/// Where a session is in the collect-then-mux conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing collected yet.
    Idle,
    /// A video is stored; subtitles are being collected.
    AwaitingSubtitles,
    /// Finish was requested with at least one subtitle.
    Ready,
    /// A mux job is running or its result is being uploaded.
    Processing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingSubtitles => write!(f, "awaiting_subtitles"),
            Self::Ready => write!(f, "ready"),
            Self::Processing => write!(f, "processing"),
        }
    }
}

/// The session's video. Never modified once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoDescriptor {
    pub local_path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub container: Container,
    pub stream_summary: StreamSummary,
    /// Submitted as a generic document rather than as a playable video.
    pub as_document: bool,
}

/// One accepted subtitle file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleEntry {
    pub local_path: PathBuf,
    pub file_name: String,
    pub format: SubtitleFormat,
    /// ISO 639-2/B code, or `und`.
    pub language_code: String,
    pub display_name: String,
    /// 1-based; order of the output tracks.
    pub submission_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// A mux run for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MuxJob {
    pub job_id: JobId,
    pub session_id: SessionId,
    pub output_path: PathBuf,
    pub status: JobStatus,
    /// Failure summary, set when the job failed.
    pub diagnostic: Option<String>,
}

/// Reply to an accepted video.
#[derive(Debug, Clone, Serialize)]
pub struct VideoAccepted {
    pub session_id: SessionId,
    pub file_name: String,
    pub size: u64,
    pub container: Container,
    pub stream_summary: StreamSummary,
}

/// Reply to an accepted subtitle.
#[derive(Debug, Clone, Serialize)]
pub struct SubtitleAccepted {
    pub session_id: SessionId,
    pub file_name: String,
    pub format: SubtitleFormat,
    pub submission_index: u32,
    pub language_code: String,
    pub display_name: String,
    pub cue_count: usize,
    /// Subtitles collected so far, this one included.
    pub total_subtitles: usize,
}

/// Outcome of a document whose kind was decided by its extension.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    Video(VideoAccepted),
    Subtitle(SubtitleAccepted),
}

/// Reply to a successful finish request.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: MuxJob,
    /// What was sent to the output sink.
    pub delivery: Delivery,
    pub mux_elapsed: Duration,
}

/// Read-only view of a user's session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub state: SessionState,
    pub video: Option<VideoDescriptor>,
    pub subtitles: Vec<SubtitleEntry>,
    pub job: Option<MuxJob>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}
