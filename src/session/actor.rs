//! Per-user session actor.
//!
//! Each active user gets one task that owns the [`Session`] and its
//! workspace. Requests arrive over an unbounded channel and run strictly in
//! order. Cancellation bypasses the queue: the manager bumps the generation
//! in [`Control`] and cancels the current token, so the in-flight step stops
//! and every request queued under the old generation completes with
//! [`Error::Cancelled`].

use std::path::Path;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use subembed_av::{MuxRequest, SessionWorkspace, SubtitleInput};
use subembed_core::events::{SessionEvent, TransferDirection};
use subembed_core::paths::{sanitize_file_name, subtitle_extensions};
use subembed_core::{Container, Error, ErrorKind, JobId, Result, SessionId, SubtitleFormat, UserId};
use subembed_parser::{detect_language, validate_subtitle};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::manager::Services;
use super::types::{
    JobReport, JobStatus, MuxJob, SessionSnapshot, SessionState, SubtitleAccepted, SubtitleEntry,
    VideoAccepted, VideoDescriptor,
};
use crate::caption::render_caption;
use crate::collaborators::{Delivery, FileSource, TrackSummary};
use crate::transfer::{format_bytes, ProgressSender};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

pub(crate) enum Command {
    Video {
        source: Arc<dyn FileSource>,
        as_document: bool,
        reply: oneshot::Sender<Result<VideoAccepted>>,
    },
    Subtitle {
        source: Arc<dyn FileSource>,
        reply: oneshot::Sender<Result<SubtitleAccepted>>,
    },
    Finish {
        reply: oneshot::Sender<Result<JobReport>>,
    },
    Cancel {
        reply: oneshot::Sender<Result<()>>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Video { .. } => "video",
            Self::Subtitle { .. } => "subtitle",
            Self::Finish { .. } => "finish",
            Self::Cancel { .. } => "cancel",
        }
    }

    fn reject_cancelled(self) {
        match self {
            Self::Video { reply, .. } => {
                let _ = reply.send(Err(Error::Cancelled));
            }
            Self::Subtitle { reply, .. } => {
                let _ = reply.send(Err(Error::Cancelled));
            }
            Self::Finish { reply } => {
                let _ = reply.send(Err(Error::Cancelled));
            }
            Self::Cancel { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

/// A command stamped with the cancel generation it was sent under.
pub(crate) struct Envelope {
    pub(crate) generation: u64,
    pub(crate) command: Command,
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ControlState {
    generation: u64,
    token: CancellationToken,
}

/// Cancellation state shared between the manager and one actor.
#[derive(Debug)]
pub(crate) struct Control {
    state: Mutex<ControlState>,
}

impl Control {
    fn new() -> Self {
        Self {
            state: Mutex::new(ControlState {
                generation: 0,
                token: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Cancel whatever is running and start a new generation. Returns it.
    pub(crate) fn cancel(&self) -> u64 {
        let mut state = self.state.lock();
        state.token.cancel();
        state.token = CancellationToken::new();
        state.generation += 1;
        state.generation
    }

    /// Token for a command sent under `generation`, unless it went stale.
    fn token_for(&self, generation: u64) -> Option<CancellationToken> {
        let state = self.state.lock();
        (state.generation == generation).then(|| state.token.clone())
    }
}

/// The manager's side of a running actor.
pub(crate) struct SessionHandle {
    pub(crate) actor_id: u64,
    pub(crate) tx: mpsc::UnboundedSender<Envelope>,
    pub(crate) control: Arc<Control>,
    pub(crate) view: Arc<RwLock<SessionSnapshot>>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    id: SessionId,
    state: SessionState,
    video: Option<VideoDescriptor>,
    subtitles: Vec<SubtitleEntry>,
    next_index: u32,
    job: Option<MuxJob>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    workspace: Option<SessionWorkspace>,
}

impl Session {
    fn idle() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            state: SessionState::Idle,
            video: None,
            subtitles: Vec::new(),
            next_index: 1,
            job: None,
            created_at: now,
            last_activity_at: now,
            workspace: None,
        }
    }

    fn collecting(id: SessionId, workspace: SessionWorkspace, video: VideoDescriptor) -> Self {
        Self {
            id,
            state: SessionState::AwaitingSubtitles,
            video: Some(video),
            workspace: Some(workspace),
            ..Self::idle()
        }
    }

    fn snapshot(&self, user_id: UserId) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            user_id,
            state: self.state,
            video: self.video.clone(),
            subtitles: self.subtitles.clone(),
            job: self.job.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }

    fn is_empty(&self) -> bool {
        self.state == SessionState::Idle && self.workspace.is_none()
    }

    fn set_job_status(&mut self, status: JobStatus, diagnostic: Option<String>) {
        if let Some(job) = self.job.as_mut() {
            job.status = status;
            job.diagnostic = diagnostic;
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub(crate) struct SessionActor {
    user_id: UserId,
    actor_id: u64,
    services: Arc<Services>,
    sessions: Weak<DashMap<UserId, SessionHandle>>,
    control: Arc<Control>,
    view: Arc<RwLock<SessionSnapshot>>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    session: Session,
}

impl SessionActor {
    /// Start an actor for `user_id` and return its handle.
    pub(crate) fn spawn(
        user_id: UserId,
        actor_id: u64,
        services: Arc<Services>,
        sessions: Weak<DashMap<UserId, SessionHandle>>,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = Arc::new(Control::new());
        let session = Session::idle();
        let view = Arc::new(RwLock::new(session.snapshot(user_id)));

        let actor = Self {
            user_id,
            actor_id,
            services,
            sessions,
            control: control.clone(),
            view: view.clone(),
            rx,
            session,
        };
        tokio::spawn(actor.run());

        SessionHandle {
            actor_id,
            tx,
            control,
            view,
        }
    }

    async fn run(mut self) {
        let idle_timeout = self.services.config.session.idle_timeout();
        tracing::debug!(user_id = %self.user_id, actor_id = self.actor_id, "session actor started");

        loop {
            match tokio::time::timeout(idle_timeout, self.rx.recv()).await {
                Ok(Some(envelope)) => self.handle(envelope).await,
                Ok(None) => break,
                Err(_) => {
                    if !self.session.is_empty() {
                        self.expire().await;
                    } else if self.retire() {
                        break;
                    }
                }
            }
        }

        self.discard_workspace().await;
        tracing::debug!(user_id = %self.user_id, actor_id = self.actor_id, "session actor stopped");
    }

    /// Remove this actor from the manager if nothing is queued for it.
    fn retire(&self) -> bool {
        let Some(sessions) = self.sessions.upgrade() else {
            return true;
        };
        let actor_id = self.actor_id;
        let rx = &self.rx;
        if sessions
            .remove_if(&self.user_id, |_, h| h.actor_id == actor_id && rx.is_empty())
            .is_some()
        {
            return true;
        }
        // Orphaned actors stop as well.
        !sessions
            .get(&self.user_id)
            .is_some_and(|h| h.actor_id == actor_id)
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Envelope {
            generation,
            command,
        } = envelope;

        if let Command::Cancel { reply } = command {
            self.cancel_session().await;
            let _ = reply.send(Ok(()));
            return;
        }

        let Some(cancel) = self.control.token_for(generation) else {
            tracing::debug!(
                user_id = %self.user_id,
                command = command.name(),
                "dropping request queued before cancel"
            );
            command.reject_cancelled();
            return;
        };

        self.touch();
        match command {
            Command::Video {
                source,
                as_document,
                reply,
            } => {
                let result = self.accept_video(source.as_ref(), as_document, &cancel).await;
                self.touch();
                let _ = reply.send(result);
            }
            Command::Subtitle { source, reply } => {
                let result = self.accept_subtitle(source.as_ref(), &cancel).await;
                self.touch();
                let _ = reply.send(result);
            }
            Command::Finish { reply } => {
                let result = self.finish(&cancel).await;
                self.touch();
                let _ = reply.send(result);
            }
            Command::Cancel { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Video
    // -----------------------------------------------------------------------

    async fn accept_video(
        &mut self,
        source: &dyn FileSource,
        as_document: bool,
        cancel: &CancellationToken,
    ) -> Result<VideoAccepted> {
        let limit = self.services.config.session.max_video_bytes;
        if source.size() > limit {
            return Err(Error::input(format!(
                "The video is too large ({}); the limit is {}.",
                format_bytes(source.size()),
                format_bytes(limit)
            )));
        }

        let session_id = SessionId::new();
        let workspace =
            SessionWorkspace::create(&self.services.config.storage.root, self.user_id, session_id)?;

        let video = match self
            .ingest_video(&workspace, session_id, source, as_document, cancel)
            .await
        {
            Ok(video) => video,
            Err(e) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    file = source.file_name(),
                    error = %e,
                    "video rejected"
                );
                if let Err(rm) = workspace.cleanup_blocking().await {
                    tracing::warn!(error = %rm, "failed to remove workspace of rejected video");
                }
                return Err(e);
            }
        };

        if !self.session.is_empty() {
            tracing::info!(
                user_id = %self.user_id,
                old_session = %self.session.id,
                discarded_subtitles = self.session.subtitles.len(),
                "new video replaces the pending session"
            );
        }
        self.discard_workspace().await;
        self.session = Session::collecting(session_id, workspace, video.clone());

        tracing::info!(
            user_id = %self.user_id,
            %session_id,
            file = %video.file_name,
            container = %video.container,
            size = video.size,
            "video accepted"
        );
        self.publish(SessionEvent::SessionOpened { session_id });
        self.publish(SessionEvent::VideoAccepted {
            session_id,
            file_name: video.file_name.clone(),
            size: video.size,
        });

        Ok(VideoAccepted {
            session_id,
            file_name: video.file_name,
            size: video.size,
            container: video.container,
            stream_summary: video.stream_summary,
        })
    }

    async fn ingest_video(
        &self,
        workspace: &SessionWorkspace,
        session_id: SessionId,
        source: &dyn FileSource,
        as_document: bool,
        cancel: &CancellationToken,
    ) -> Result<VideoDescriptor> {
        let file_name = source.file_name().to_string();
        let local_path = workspace.download_path("video", &file_name);

        let progress = self.progress_sender(session_id, TransferDirection::Download, &file_name);
        let size = self
            .services
            .reporter
            .download(source, &local_path, &progress, cancel)
            .await?;

        let stream_summary = self.services.mux.probe(&local_path, cancel).await?;
        let container = stream_summary
            .container
            .or_else(|| Container::from_path(Path::new(&file_name)))
            .ok_or_else(|| Error::ingestion(&file_name, "unrecognised video container"))?;

        Ok(VideoDescriptor {
            local_path,
            file_name,
            size,
            container,
            stream_summary,
            as_document,
        })
    }

    // -----------------------------------------------------------------------
    // Subtitles
    // -----------------------------------------------------------------------

    async fn accept_subtitle(
        &mut self,
        source: &dyn FileSource,
        cancel: &CancellationToken,
    ) -> Result<SubtitleAccepted> {
        if self.session.state != SessionState::AwaitingSubtitles || self.session.video.is_none() {
            return Err(Error::input("Please send a video first!"));
        }
        let limit = self.services.config.session.max_subtitle_bytes;
        if source.size() > limit {
            return Err(Error::input(format!(
                "The subtitle file is too large ({}); the limit is {}.",
                format_bytes(source.size()),
                format_bytes(limit)
            )));
        }

        let session_id = self.session.id;
        let index = self.session.next_index;
        let (entry, cue_count) = match self.ingest_subtitle(source, index, cancel).await {
            Ok(accepted) => accepted,
            Err(e) => {
                if e.kind() == ErrorKind::Ingestion {
                    tracing::warn!(
                        user_id = %self.user_id,
                        file = source.file_name(),
                        error = %e,
                        "subtitle rejected"
                    );
                    self.publish(SessionEvent::SubtitleRejected {
                        session_id,
                        file_name: source.file_name().to_string(),
                        reason: e.to_string(),
                    });
                }
                return Err(e);
            }
        };

        tracing::info!(
            user_id = %self.user_id,
            %session_id,
            file = %entry.file_name,
            index,
            language = %entry.language_code,
            "subtitle accepted"
        );
        self.publish(SessionEvent::SubtitleAccepted {
            session_id,
            file_name: entry.file_name.clone(),
            index,
            language: entry.language_code.clone(),
        });

        self.session.next_index += 1;
        self.session.subtitles.push(entry.clone());

        Ok(SubtitleAccepted {
            session_id,
            file_name: entry.file_name,
            format: entry.format,
            submission_index: index,
            language_code: entry.language_code,
            display_name: entry.display_name,
            cue_count,
            total_subtitles: self.session.subtitles.len(),
        })
    }

    async fn ingest_subtitle(
        &self,
        source: &dyn FileSource,
        index: u32,
        cancel: &CancellationToken,
    ) -> Result<(SubtitleEntry, usize)> {
        let file_name = source.file_name().to_string();
        let format = SubtitleFormat::from_path(Path::new(&file_name)).ok_or_else(|| {
            Error::ingestion(
                &file_name,
                format!(
                    "unsupported subtitle type; send one of: {}",
                    subtitle_extensions().join(", ")
                ),
            )
        })?;
        let workspace = self
            .session
            .workspace
            .as_ref()
            .ok_or_else(|| Error::Internal("session has no workspace".into()))?;

        let local_path = workspace.download_path(&format!("sub{index:02}"), &file_name);
        let progress = self.progress_sender(self.session.id, TransferDirection::Download, &file_name);
        self.services
            .reporter
            .download(source, &local_path, &progress, cancel)
            .await?;

        let checked = match tokio::fs::read(&local_path).await {
            Ok(bytes) => validate_subtitle(&file_name, format, &bytes),
            Err(e) => Err(Error::from(e)),
        };
        let info = match checked {
            Ok(info) => info,
            Err(e) => {
                if let Err(rm) = subembed_av::workspace::remove_file_if_exists(&local_path) {
                    tracing::warn!(error = %rm, "failed to remove rejected subtitle");
                }
                return Err(e);
            }
        };

        let language = detect_language(&file_name, index);
        let entry = SubtitleEntry {
            local_path,
            file_name,
            format,
            language_code: language.code,
            display_name: language.display_name,
            submission_index: index,
        };
        Ok((entry, info.cue_count))
    }

    // -----------------------------------------------------------------------
    // Finish
    // -----------------------------------------------------------------------

    async fn finish(&mut self, cancel: &CancellationToken) -> Result<JobReport> {
        match self.session.state {
            SessionState::Idle => return Err(Error::input("Please send a video first!")),
            SessionState::AwaitingSubtitles if self.session.subtitles.is_empty() => {
                return Err(Error::input("Please send at least one subtitle file!"))
            }
            SessionState::AwaitingSubtitles => {}
            SessionState::Ready | SessionState::Processing => {
                return Err(Error::input("Your video is already being processed."))
            }
        }
        self.session.state = SessionState::Ready;

        let result = self.run_job(cancel).await;
        match &result {
            Ok(report) => {
                tracing::info!(
                    user_id = %self.user_id,
                    job_id = %report.job.job_id,
                    size = report.delivery.size,
                    "job completed"
                );
                self.end_session().await;
            }
            Err(e) if e.is_cancelled() => self.cancel_session().await,
            Err(e) => {
                tracing::error!(user_id = %self.user_id, session_id = %self.session.id, error = %e, "job failed");
                if let Some(job) = &self.session.job {
                    self.publish(SessionEvent::JobFailed {
                        session_id: job.session_id,
                        job_id: job.job_id,
                        error: e.to_string(),
                    });
                }
                self.end_session().await;
            }
        }
        result
    }

    async fn run_job(&mut self, cancel: &CancellationToken) -> Result<JobReport> {
        let services = self.services.clone();
        let user_id = self.user_id;
        let session_id = self.session.id;
        let video = self
            .session
            .video
            .clone()
            .ok_or_else(|| Error::Internal("session has no video".into()))?;
        let output_name = output_file_name(&video.file_name, video.container);
        let output_path = self
            .session
            .workspace
            .as_ref()
            .ok_or_else(|| Error::Internal("session has no workspace".into()))?
            .output_path(&output_name);

        let job_id = JobId::new();
        self.session.job = Some(MuxJob {
            job_id,
            session_id,
            output_path: output_path.clone(),
            status: JobStatus::Pending,
            diagnostic: None,
        });
        self.session.state = SessionState::Processing;
        self.publish_view();

        let permit = services
            .scheduler
            .acquire(cancel, || {
                tracing::info!(%user_id, %job_id, "mux queued behind running jobs");
                services
                    .events
                    .publish(user_id, SessionEvent::MuxQueued { session_id, job_id });
            })
            .await?;

        self.session.set_job_status(JobStatus::Running, None);
        self.publish(SessionEvent::MuxStarted { session_id, job_id });
        self.publish_view();

        let request = MuxRequest {
            video: video.local_path.clone(),
            container: video.container,
            source: video.stream_summary.clone(),
            subtitles: self
                .session
                .subtitles
                .iter()
                .map(|s| SubtitleInput {
                    path: s.local_path.clone(),
                    format: s.format,
                    language: s.language_code.clone(),
                    title: s.display_name.clone(),
                })
                .collect(),
            output: output_path,
            default_subtitle: services.config.mux.default_subtitle,
        };

        let outcome = match services.mux.mux(&request, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.session.set_job_status(JobStatus::Failed, Some(e.to_string()));
                return Err(e);
            }
        };
        drop(permit);

        let tracks: Vec<TrackSummary> = self
            .session
            .subtitles
            .iter()
            .map(|s| TrackSummary {
                language: s.language_code.clone(),
                title: s.display_name.clone(),
            })
            .collect();
        let template = services.preferences.caption_template(user_id).await;
        let delivery = Delivery {
            caption: render_caption(template.as_deref(), &output_name, outcome.size, tracks.len()),
            file_name: output_name.clone(),
            size: outcome.size,
            thumbnail: services.preferences.thumbnail(user_id).await,
            tracks,
            as_document: video.as_document,
        };

        let progress = self.progress_sender(session_id, TransferDirection::Upload, &output_name);
        if let Err(e) = services
            .reporter
            .upload(
                &outcome.output,
                services.sink.as_ref(),
                user_id,
                &delivery,
                &progress,
                cancel,
            )
            .await
        {
            self.session.set_job_status(JobStatus::Failed, Some(e.to_string()));
            return Err(e);
        }

        self.session.set_job_status(JobStatus::Succeeded, None);
        self.publish(SessionEvent::JobCompleted {
            session_id,
            job_id,
            file_name: output_name,
            size: outcome.size,
        });

        let job = self
            .session
            .job
            .clone()
            .ok_or_else(|| Error::Internal("job vanished".into()))?;
        Ok(JobReport {
            job,
            delivery,
            mux_elapsed: outcome.elapsed,
        })
    }

    // -----------------------------------------------------------------------
    // Terminal transitions
    // -----------------------------------------------------------------------

    async fn cancel_session(&mut self) {
        if self.session.is_empty() {
            return;
        }
        tracing::info!(user_id = %self.user_id, session_id = %self.session.id, state = %self.session.state, "session cancelled");
        self.publish(SessionEvent::SessionCancelled {
            session_id: self.session.id,
        });
        self.end_session().await;
    }

    async fn expire(&mut self) {
        tracing::info!(user_id = %self.user_id, session_id = %self.session.id, state = %self.session.state, "session expired after inactivity");
        self.publish(SessionEvent::SessionExpired {
            session_id: self.session.id,
        });
        self.end_session().await;
    }

    async fn end_session(&mut self) {
        self.discard_workspace().await;
        self.session = Session::idle();
        self.publish_view();
    }

    async fn discard_workspace(&mut self) {
        if let Some(workspace) = self.session.workspace.take() {
            let dir = workspace.dir().to_path_buf();
            if let Err(e) = workspace.cleanup_blocking().await {
                tracing::warn!(dir = %dir.display(), error = %e, "workspace cleanup failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn touch(&mut self) {
        self.session.last_activity_at = Utc::now();
        self.publish_view();
    }

    fn publish_view(&self) {
        *self.view.write() = self.session.snapshot(self.user_id);
    }

    fn publish(&self, event: SessionEvent) {
        self.services.events.publish(self.user_id, event);
    }

    fn progress_sender(
        &self,
        session_id: SessionId,
        direction: TransferDirection,
        file_name: &str,
    ) -> ProgressSender {
        let events = self.services.events.clone();
        let user_id = self.user_id;
        let file_name = file_name.to_string();
        ProgressSender::new(move |e| {
            events.publish(
                user_id,
                SessionEvent::TransferProgress {
                    session_id,
                    direction,
                    file_name: file_name.clone(),
                    bytes_transferred: e.bytes_transferred,
                    bytes_total: e.bytes_total,
                    elapsed_ms: e.elapsed.as_millis() as u64,
                },
            )
        })
    }
}

/// Name of the delivered file: the video's own name, with the extension
/// fixed up when it does not match the container.
pub(crate) fn output_file_name(video_name: &str, container: Container) -> String {
    let name = sanitize_file_name(video_name, "video");
    let path = Path::new(&name);
    if Container::from_path(path) == Some(container) {
        return name;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    format!("{stem}.{container}")
}
