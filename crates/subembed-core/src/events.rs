//! Session event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that a transport attaching late can catch
//! up on what happened to a user's session.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::{JobId, SessionId, UserId};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

/// Direction of a byte transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Download,
    Upload,
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionOpened {
        session_id: SessionId,
    },
    VideoAccepted {
        session_id: SessionId,
        file_name: String,
        size: u64,
    },
    SubtitleAccepted {
        session_id: SessionId,
        file_name: String,
        index: u32,
        language: String,
    },
    SubtitleRejected {
        session_id: SessionId,
        file_name: String,
        reason: String,
    },
    TransferProgress {
        session_id: SessionId,
        direction: TransferDirection,
        file_name: String,
        bytes_transferred: u64,
        bytes_total: u64,
        elapsed_ms: u64,
    },
    MuxQueued {
        session_id: SessionId,
        job_id: JobId,
    },
    MuxStarted {
        session_id: SessionId,
        job_id: JobId,
    },
    JobCompleted {
        session_id: SessionId,
        job_id: JobId,
        file_name: String,
        size: u64,
    },
    JobFailed {
        session_id: SessionId,
        job_id: JobId,
        error: String,
    },
    SessionCancelled {
        session_id: SessionId,
    },
    SessionExpired {
        session_id: SessionId,
    },
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event addressed to one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// The user whose session produced the event.
    pub user_id: UserId,
    pub payload: SessionEvent,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(user_id: UserId, payload: SessionEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn publish(&self, user_id: UserId, payload: SessionEvent) {
        let event = Event::new(user_id, payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(%user_id, receivers, "event published");
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }

    /// Recent events for one user, oldest first.
    pub fn recent_for_user(&self, user_id: UserId) -> Vec<Event> {
        let recent = self.recent.read();
        let mut events: Vec<Event> = recent
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        events.reverse();
        events
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
