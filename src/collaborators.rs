//! Narrow interfaces to the systems around the session core.
//!
//! The transport hands in [`FileSource`]s and receives results through an
//! [`OutputSink`]; permission checks and user preferences come from
//! [`AccessControl`] and [`PreferenceStore`]. Simple implementations are
//! provided for the CLI and for tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use subembed_core::paths::sanitize_file_name;
use subembed_core::UserId;
use tokio::io::{AsyncRead, AsyncWrite};

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ---------------------------------------------------------------------------
// Inbound files
// ---------------------------------------------------------------------------

/// A file the user submitted.
///
/// `open` may be called more than once; every call must start from the
/// beginning of the file so a failed transfer can be retried.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Name as supplied by the user.
    fn file_name(&self) -> &str;

    /// Declared size in bytes.
    fn size(&self) -> u64;

    async fn open(&self) -> io::Result<BoxReader>;
}

/// A file already on local disk.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    file_name: String,
    size: u64,
}

impl LocalFile {
    pub fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self {
            path,
            file_name,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileSource for LocalFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn open(&self) -> io::Result<BoxReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::new(file))
    }
}

/// An in-memory file.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    file_name: String,
    data: Bytes,
}

impl MemoryFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl FileSource for MemoryFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open(&self) -> io::Result<BoxReader> {
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }
}

// ---------------------------------------------------------------------------
// Outbound files
// ---------------------------------------------------------------------------

/// Language and title of one embedded track, for the transport's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub language: String,
    pub title: String,
}

/// Metadata accompanying a finished file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub file_name: String,
    pub size: u64,
    pub caption: String,
    /// Thumbnail chosen by the user, if any.
    pub thumbnail: Option<PathBuf>,
    pub tracks: Vec<TrackSummary>,
    /// Send as a generic document rather than as a playable video.
    pub as_document: bool,
}

/// Where finished files go.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Open a writer for one delivery. A retried upload opens a new writer.
    async fn open_upload(&self, user_id: UserId, delivery: &Delivery) -> io::Result<BoxWriter>;
}

/// Writes deliveries into a directory, one file per delivery.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where a delivery with `file_name` ends up.
    pub fn target(&self, file_name: &str) -> PathBuf {
        self.dir.join(sanitize_file_name(file_name, "output"))
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn open_upload(&self, user_id: UserId, delivery: &Delivery) -> io::Result<BoxWriter> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.target(&delivery.file_name);
        tracing::debug!(%user_id, target = %target.display(), "writing delivery");
        let file = tokio::fs::File::create(target).await?;
        Ok(Box::new(file))
    }
}

// ---------------------------------------------------------------------------
// Access and preferences
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn is_user_permitted(&self, user_id: UserId) -> bool;
}

/// Lets everyone in.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn is_user_permitted(&self, _user_id: UserId) -> bool {
        true
    }
}

/// Rejects users on a ban list that can change at runtime.
#[derive(Debug, Default)]
pub struct Denylist {
    banned: RwLock<HashSet<UserId>>,
}

impl Denylist {
    pub fn new(banned: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            banned: RwLock::new(banned.into_iter().collect()),
        }
    }

    pub fn ban(&self, user_id: UserId) {
        self.banned.write().insert(user_id);
    }

    pub fn unban(&self, user_id: UserId) {
        self.banned.write().remove(&user_id);
    }
}

#[async_trait]
impl AccessControl for Denylist {
    async fn is_user_permitted(&self, user_id: UserId) -> bool {
        !self.banned.read().contains(&user_id)
    }
}

/// Read-only view of per-user output preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn caption_template(&self, user_id: UserId) -> Option<String>;
    async fn thumbnail(&self, user_id: UserId) -> Option<PathBuf>;
}

/// No user has preferences.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreferences;

#[async_trait]
impl PreferenceStore for NoPreferences {
    async fn caption_template(&self, _user_id: UserId) -> Option<String> {
        None
    }

    async fn thumbnail(&self, _user_id: UserId) -> Option<PathBuf> {
        None
    }
}

/// Fixed preferences, with an optional fallback caption for every user.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences {
    default_caption: Option<String>,
    captions: HashMap<UserId, String>,
    thumbnails: HashMap<UserId, PathBuf>,
}

impl StaticPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_caption(mut self, template: impl Into<String>) -> Self {
        self.default_caption = Some(template.into());
        self
    }

    pub fn with_caption(mut self, user_id: UserId, template: impl Into<String>) -> Self {
        self.captions.insert(user_id, template.into());
        self
    }

    pub fn with_thumbnail(mut self, user_id: UserId, path: impl Into<PathBuf>) -> Self {
        self.thumbnails.insert(user_id, path.into());
        self
    }
}

#[async_trait]
impl PreferenceStore for StaticPreferences {
    async fn caption_template(&self, user_id: UserId) -> Option<String> {
        self.captions
            .get(&user_id)
            .or(self.default_caption.as_ref())
            .cloned()
    }

    async fn thumbnail(&self, user_id: UserId) -> Option<PathBuf> {
        self.thumbnails.get(&user_id).cloned()
    }
}
