//! # subembed-av
//!
//! External tool management, probing, and subtitle muxing for subembed.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with deadline
//!   and cancellation support for running external processes.
//! - **Session workspaces** ([`SessionWorkspace`]) -- per-session directories
//!   with exactly-once cleanup, plus [`sweep_orphans`] for startup.
//! - **Probing** ([`FfprobeProber`]) -- ffprobe JSON to [`subembed_core::StreamSummary`].
//! - **Muxing** ([`MuxBackend`], [`FfmpegMuxer`]) -- stream-copy a video and
//!   append subtitle tracks with language tags.

pub mod command;
pub mod mux;
pub mod probe;
pub mod tools;
pub mod workspace;

pub use command::{ToolCommand, ToolOutput};
pub use mux::{FfmpegMuxer, MuxBackend, MuxOutcome, MuxRequest, SubtitleCodec, SubtitleInput};
pub use probe::FfprobeProber;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use workspace::{sweep_orphans, SessionWorkspace};
