//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires a [`SessionManager`] to a
//! [`FakeMuxer`] (no ffmpeg needed) and a [`MemorySink`] that captures
//! uploads, on top of a temporary storage root.

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use subembed::collaborators::{
    AccessControl, BoxReader, BoxWriter, Delivery, FileSource, MemoryFile, OutputSink,
    PreferenceStore,
};
use subembed::config::Config;
use subembed::session::{Collaborators, SessionManager};
use subembed_av::mux::plan_subtitle_codec;
use subembed_av::{MuxBackend, MuxOutcome, MuxRequest};
use subembed_core::events::{Event, SessionEvent};
use subembed_core::{Container, Error, Result, StreamSummary, UserId};
use tempfile::TempDir;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello there.\n\n2\n00:00:03,000 --> 00:00:04,000\nGeneral Kenobi.\n";

pub fn video(name: &str) -> Arc<dyn FileSource> {
    Arc::new(MemoryFile::new(name, vec![0x42u8; 4096]))
}

pub fn srt(name: &str) -> Arc<dyn FileSource> {
    Arc::new(MemoryFile::new(name, SRT.as_bytes().to_vec()))
}

pub fn file(name: &str, data: &[u8]) -> Arc<dyn FileSource> {
    Arc::new(MemoryFile::new(name, data.to_vec()))
}

/// Content that makes [`FakeMuxer::probe`] fail.
pub const UNREADABLE_VIDEO: &[u8] = b"BAD not a media file";

/// Config with a temporary storage root and fast retries.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.storage.root = root.to_path_buf();
    config.storage.min_free_bytes = 0;
    config.storage.sweep_on_start = false;
    config.transfer.backoff_base_ms = 1;
    config.transfer.buffer_size = 1024;
    config
}

// ---------------------------------------------------------------------------
// FakeMuxer
// ---------------------------------------------------------------------------

/// In-process stand-in for ffmpeg.
///
/// Probing reports one video and one audio stream, with the container taken
/// from the extension. Muxing checks codec compatibility like the real
/// muxer, optionally waits (honouring cancellation), and writes the video
/// bytes to the output.
#[derive(Default)]
pub struct FakeMuxer {
    pub requests: Mutex<Vec<MuxRequest>>,
    pub delay: Mutex<Duration>,
    pub fail_with: Mutex<Option<String>>,
    running: AtomicUsize,
    pub max_running: AtomicUsize,
}

impl FakeMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let muxer = Self::default();
        *muxer.delay.lock() = delay;
        muxer
    }

    pub fn fail_next(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    pub fn last_request(&self) -> Option<MuxRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl MuxBackend for FakeMuxer {
    async fn probe(&self, path: &Path, _cancel: &CancellationToken) -> Result<StreamSummary> {
        let data = tokio::fs::read(path).await?;
        if data.starts_with(b"BAD") {
            return Err(Error::Probe(format!("{} has no media streams", path.display())));
        }
        Ok(StreamSummary {
            container: Container::from_path(path),
            video_streams: 1,
            audio_streams: 1,
            ..Default::default()
        })
    }

    async fn mux(&self, request: &MuxRequest, cancel: &CancellationToken) -> Result<MuxOutcome> {
        let started = Instant::now();
        for sub in &request.subtitles {
            plan_subtitle_codec(request.container, sub.format)?;
        }
        self.requests.lock().push(request.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock();
        let waited = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        waited?;

        if let Some(message) = self.fail_with.lock().take() {
            return Err(Error::mux(message));
        }

        let mut data = tokio::fs::read(&request.video).await?;
        for sub in &request.subtitles {
            data.extend(format!("\n[{}:{}]", sub.language, sub.title).bytes());
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output, &data).await?;

        Ok(MuxOutcome {
            output: request.output.clone(),
            size: data.len() as u64,
            elapsed: started.elapsed(),
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Upload {
    pub user_id: UserId,
    pub delivery: Delivery,
    pub data: Vec<u8>,
}

/// Captures every finished upload.
#[derive(Default)]
pub struct MemorySink {
    pub uploads: Arc<Mutex<Vec<Upload>>>,
    pub failures_left: AtomicU32,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` uploads fail to open.
    pub fn failing(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().clone()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn open_upload(&self, user_id: UserId, delivery: &Delivery) -> io::Result<BoxWriter> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "upload reset"));
        }
        Ok(Box::new(CaptureWriter {
            upload: Some(Upload {
                user_id,
                delivery: delivery.clone(),
                data: Vec::new(),
            }),
            store: self.uploads.clone(),
        }))
    }
}

struct CaptureWriter {
    upload: Option<Upload>,
    store: Arc<Mutex<Vec<Upload>>>,
}

impl AsyncWrite for CaptureWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.upload.as_mut() {
            Some(upload) => {
                upload.data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(upload) = self.upload.take() {
            self.store.lock().push(upload);
        }
        Poll::Ready(Ok(()))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Fails the first `failures` opens with a connection reset.
pub struct FlakySource {
    inner: MemoryFile,
    failures: AtomicU32,
    pub opens: AtomicU32,
}

impl FlakySource {
    pub fn new(name: &str, data: &[u8], failures: u32) -> Self {
        Self {
            inner: MemoryFile::new(name, data.to_vec()),
            failures: AtomicU32::new(failures),
            opens: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl FileSource for FlakySource {
    fn file_name(&self) -> &str {
        self.inner.file_name()
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    async fn open(&self) -> io::Result<BoxReader> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        }
        self.inner.open().await
    }
}

/// Delivers its bytes in small chunks with a pause between them.
pub struct SlowSource {
    name: String,
    data: Vec<u8>,
    pause: Duration,
}

impl SlowSource {
    pub fn new(name: &str, data: &[u8], pause: Duration) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            pause,
        }
    }
}

#[async_trait]
impl FileSource for SlowSource {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open(&self) -> io::Result<BoxReader> {
        let (reader, mut writer) = tokio::io::duplex(64);
        let data = self.data.clone();
        let pause = self.pause;
        tokio::spawn(async move {
            for chunk in data.chunks(64) {
                if writer.write_all(chunk).await.is_err() {
                    return;
                }
                tokio::time::sleep(pause).await;
            }
        });
        Ok(Box::new(reader))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub manager: SessionManager,
    pub muxer: Arc<FakeMuxer>,
    pub sink: Arc<MemorySink>,
    pub root: TempDir,
}

pub struct HarnessBuilder {
    root: TempDir,
    config: Config,
    muxer: FakeMuxer,
    sink: MemorySink,
    access: Option<Arc<dyn AccessControl>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
}

impl HarnessBuilder {
    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn muxer(mut self, muxer: FakeMuxer) -> Self {
        self.muxer = muxer;
        self
    }

    pub fn sink(mut self, sink: MemorySink) -> Self {
        self.sink = sink;
        self
    }

    pub fn access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn build(self) -> TestHarness {
        let muxer = Arc::new(self.muxer);
        let sink = Arc::new(self.sink);
        let mut collaborators = Collaborators::new(muxer.clone(), sink.clone());
        if let Some(access) = self.access {
            collaborators = collaborators.with_access(access);
        }
        if let Some(preferences) = self.preferences {
            collaborators = collaborators.with_preferences(preferences);
        }
        TestHarness {
            manager: SessionManager::new(self.config, collaborators),
            muxer,
            sink,
            root: self.root,
        }
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> HarnessBuilder {
        let root = tempfile::tempdir().expect("failed to create storage root");
        let config = test_config(root.path());
        HarnessBuilder {
            root,
            config,
            muxer: FakeMuxer::new(),
            sink: MemorySink::new(),
            access: None,
            preferences: None,
        }
    }

    /// Session directories currently on disk for `user_id`.
    pub fn session_dirs(&self, user_id: UserId) -> Vec<std::path::PathBuf> {
        let dir = self.root.path().join(user_id.to_string());
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn events_for(&self, user_id: UserId) -> Vec<Event> {
        self.manager.events().recent_for_user(user_id)
    }

    pub fn has_event(&self, user_id: UserId, pred: impl Fn(&SessionEvent) -> bool) -> bool {
        self.events_for(user_id).iter().any(|e| pred(&e.payload))
    }
}
