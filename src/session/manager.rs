//! Entry point for the transport: one [`SessionManager`] serves every user.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use subembed_av::MuxBackend;
use subembed_core::config::Config;
use subembed_core::events::EventBus;
use subembed_core::paths::{classify, subtitle_extensions, FileKind};
use subembed_core::{Error, Result, UserId};
use tokio::sync::oneshot;

use super::actor::{Command, Envelope, SessionActor, SessionHandle};
use super::scheduler::MuxScheduler;
use super::types::{JobReport, SessionSnapshot, SubtitleAccepted, Submission, VideoAccepted};
use crate::collaborators::{
    AccessControl, AllowAll, FileSource, NoPreferences, OutputSink, PreferenceStore,
};
use crate::transfer::ProgressReporter;

/// Everything an actor needs besides its own session.
pub(crate) struct Services {
    pub(crate) config: Config,
    pub(crate) events: Arc<EventBus>,
    pub(crate) mux: Arc<dyn MuxBackend>,
    pub(crate) sink: Arc<dyn OutputSink>,
    pub(crate) preferences: Arc<dyn PreferenceStore>,
    pub(crate) reporter: ProgressReporter,
    pub(crate) scheduler: MuxScheduler,
}

/// Collaborators supplied by the embedding application.
#[derive(Clone)]
pub struct Collaborators {
    pub mux: Arc<dyn MuxBackend>,
    pub sink: Arc<dyn OutputSink>,
    pub access: Arc<dyn AccessControl>,
    pub preferences: Arc<dyn PreferenceStore>,
}

impl Collaborators {
    /// Everyone is allowed in and nobody has preferences.
    pub fn new(mux: Arc<dyn MuxBackend>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            mux,
            sink,
            access: Arc::new(AllowAll),
            preferences: Arc::new(NoPreferences),
        }
    }

    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = preferences;
        self
    }
}

struct Inner {
    services: Arc<Services>,
    access: Arc<dyn AccessControl>,
    sessions: Arc<DashMap<UserId, SessionHandle>>,
    next_actor_id: AtomicU64,
}

/// Per-user session store.
///
/// Every user with an open session has one actor task; requests for the same
/// user run in arrival order, requests for different users run independently.
/// Cloning is cheap. When the last clone is dropped the actors stop and their
/// workspaces are removed.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self::with_event_bus(config, collaborators, Arc::new(EventBus::default()))
    }

    pub fn with_event_bus(
        config: Config,
        collaborators: Collaborators,
        events: Arc<EventBus>,
    ) -> Self {
        let reporter = ProgressReporter::new(&config.transfer, &config.storage);
        let scheduler = MuxScheduler::new(config.mux.max_concurrent);
        let services = Services {
            config,
            events,
            mux: collaborators.mux,
            sink: collaborators.sink,
            preferences: collaborators.preferences,
            reporter,
            scheduler,
        };
        Self {
            inner: Arc::new(Inner {
                services: Arc::new(services),
                access: collaborators.access,
                sessions: Arc::new(DashMap::new()),
                next_actor_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.services.events
    }

    pub fn config(&self) -> &Config {
        &self.inner.services.config
    }

    /// Store `source` as the user's video, replacing any pending session.
    pub async fn submit_video(
        &self,
        user_id: UserId,
        source: Arc<dyn FileSource>,
    ) -> Result<VideoAccepted> {
        self.request(user_id, |reply| Command::Video {
            source,
            as_document: false,
            reply,
        })
        .await
    }

    /// Append `source` to the user's subtitles.
    pub async fn submit_subtitle(
        &self,
        user_id: UserId,
        source: Arc<dyn FileSource>,
    ) -> Result<SubtitleAccepted> {
        self.request(user_id, |reply| Command::Subtitle { source, reply })
            .await
    }

    /// Route a generic document by its extension.
    pub async fn submit_document(
        &self,
        user_id: UserId,
        source: Arc<dyn FileSource>,
    ) -> Result<Submission> {
        match classify(Path::new(source.file_name())) {
            FileKind::Video => {
                let accepted = self
                    .request(user_id, |reply| Command::Video {
                        source,
                        as_document: true,
                        reply,
                    })
                    .await?;
                Ok(Submission::Video(accepted))
            }
            FileKind::Subtitle => {
                let accepted = self.submit_subtitle(user_id, source).await?;
                Ok(Submission::Subtitle(accepted))
            }
            FileKind::Other => Err(Error::input(format!(
                "Unsupported file type. Please send a video or a subtitle file ({}).",
                subtitle_extensions().join(", ")
            ))),
        }
    }

    /// Mux the collected files and deliver the result.
    pub async fn request_finish(&self, user_id: UserId) -> Result<JobReport> {
        self.request(user_id, |reply| Command::Finish { reply })
            .await
    }

    /// Abort the user's session. Without a session this does nothing.
    pub async fn cancel(&self, user_id: UserId) -> Result<()> {
        let (reply, done) = oneshot::channel();
        {
            let Some(handle) = self.inner.sessions.get(&user_id) else {
                return Ok(());
            };
            let generation = handle.control.cancel();
            let envelope = Envelope {
                generation,
                command: Command::Cancel { reply },
            };
            if handle.tx.send(envelope).is_err() {
                return Ok(());
            }
        }
        done.await.unwrap_or(Ok(()))
    }

    pub fn snapshot(&self, user_id: UserId) -> Option<SessionSnapshot> {
        self.inner
            .sessions
            .get(&user_id)
            .map(|handle| handle.view.read().clone())
    }

    /// Number of users with a live session actor.
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    async fn request<T>(
        &self,
        user_id: UserId,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        let mut command = make(reply);

        loop {
            self.ensure_actor(user_id).await?;

            let stale = {
                let Some(handle) = self.inner.sessions.get(&user_id) else {
                    continue;
                };
                let envelope = Envelope {
                    generation: handle.control.generation(),
                    command,
                };
                match handle.tx.send(envelope) {
                    Ok(()) => break,
                    Err(rejected) => {
                        command = rejected.0.command;
                        handle.actor_id
                    }
                }
            };
            tracing::warn!(%user_id, actor_id = stale, "session actor is gone; restarting");
            self.inner
                .sessions
                .remove_if(&user_id, |_, h| h.actor_id == stale);
        }

        response
            .await
            .map_err(|_| Error::Internal("session actor stopped".into()))?
    }

    async fn ensure_actor(&self, user_id: UserId) -> Result<()> {
        if self.inner.sessions.contains_key(&user_id) {
            return Ok(());
        }
        if !self.inner.access.is_user_permitted(user_id).await {
            tracing::warn!(%user_id, "rejected request from user without access");
            return Err(Error::Forbidden(format!("user {user_id} is not permitted")));
        }

        self.inner.sessions.entry(user_id).or_insert_with(|| {
            let actor_id = self.inner.next_actor_id.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%user_id, actor_id, "starting session actor");
            SessionActor::spawn(
                user_id,
                actor_id,
                self.inner.services.clone(),
                Arc::downgrade(&self.inner.sessions),
            )
        });
        Ok(())
    }
}
