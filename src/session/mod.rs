//! Multi-turn embedding sessions.
//!
//! A session moves `Idle → AwaitingSubtitles → Ready → Processing` and back
//! to `Idle` once the result is delivered, the job fails, the user cancels,
//! or the session sits idle for too long. Each terminal transition removes
//! the session's workspace.

mod actor;
mod manager;
pub mod scheduler;
pub mod types;

pub use manager::{Collaborators, SessionManager};
pub use scheduler::MuxScheduler;
pub use types::{
    JobReport, JobStatus, MuxJob, SessionSnapshot, SessionState, SubtitleAccepted, SubtitleEntry,
    Submission, VideoAccepted, VideoDescriptor,
};
