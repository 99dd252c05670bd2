//! Unified error type for subembed.
//!
//! All crates funnel their failures into [`Error`]. Each variant belongs to
//! one [`ErrorKind`], which decides how the session reacts: input and
//! ingestion problems leave the session where it was, mux and internal
//! failures tear it down. [`Error::user_message`] gives the text the
//! transport shows to the user.

use std::fmt;

/// Failure class, used by the session state machine to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong state for the requested action, or a request that can never succeed.
    Input,
    /// Network or disk failure during a transfer, after retries ran out.
    TransientIo,
    /// A submitted file is unreadable or malformed.
    Ingestion,
    /// The mux step (or the external tool behind it) failed.
    Mux,
    /// Concurrency cap or disk space exceeded.
    ResourceExhausted,
    /// The user is not allowed to open a session.
    Forbidden,
    /// The operation was cancelled by the user or by an inactivity timeout.
    Cancelled,
    /// Anything unexpected.
    Internal,
}

/// Unified error type covering all failure modes in subembed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request does not fit the current session state.
    #[error("Input error: {0}")]
    Input(String),

    /// A transfer step kept failing after every retry.
    #[error("Transfer error [{step}] after {attempts} attempt(s): {source}")]
    TransientIo {
        /// The transfer step ("video download", "upload", ...).
        step: String,
        /// How many attempts were made.
        attempts: u32,
        /// The last underlying I/O error.
        source: std::io::Error,
    },

    /// A submitted file could not be ingested.
    #[error("Ingestion error [{file}]: {message}")]
    Ingestion {
        /// Name of the offending file.
        file: String,
        /// Human-readable error description.
        message: String,
    },

    /// Muxing failed; carries the diagnostic summary.
    #[error("Mux failure: {0}")]
    Mux(String),

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A shared resource is exhausted.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The caller lacks permission for the requested action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The operation was cancelled before it completed.
    #[error("Cancelled")]
    Cancelled,

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Input(_) => ErrorKind::Input,
            Error::TransientIo { .. } => ErrorKind::TransientIo,
            Error::Ingestion { .. } | Error::Probe(_) => ErrorKind::Ingestion,
            Error::Mux(_) | Error::Tool { .. } => ErrorKind::Mux,
            Error::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io { .. } | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Text suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            Error::Input(msg) => msg.clone(),
            Error::TransientIo { step, .. } => {
                format!("The {step} kept failing. Please try again.")
            }
            Error::Ingestion { file, message } => {
                format!("Could not use `{file}`: {message}")
            }
            Error::Mux(msg) => format!("Processing failed: {msg}"),
            Error::Tool { tool, .. } => format!("Processing failed ({tool} error)."),
            Error::ResourceExhausted(msg) => msg.clone(),
            Error::Forbidden(_) => "You are not allowed to use this service.".into(),
            Error::Cancelled => "Operation cancelled.".into(),
            Error::Probe(msg) => format!("Could not read the media file: {msg}"),
            Error::Io { .. } | Error::Internal(_) => {
                "Something went wrong on our side. Please try again.".into()
            }
        }
    }

    /// Convenience constructor for [`Error::Input`].
    pub fn input(message: impl Into<String>) -> Self {
        Error::Input(message.into())
    }

    /// Convenience constructor for [`Error::Ingestion`].
    pub fn ingestion(file: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Ingestion {
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Mux`].
    pub fn mux(message: impl Into<String>) -> Self {
        Error::Mux(message.into())
    }

    /// Convenience constructor for [`Error::TransientIo`].
    pub fn transient(step: impl Into<String>, attempts: u32, source: std::io::Error) -> Self {
        Error::TransientIo {
            step: step.into(),
            attempts,
            source,
        }
    }

    /// Whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
