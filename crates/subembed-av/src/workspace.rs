//! Per-session working directories.
//!
//! A [`SessionWorkspace`] owns `<root>/<user_id>/<session_id>/` with a
//! `downloads/` directory for submitted files and an `output/` directory for
//! mux results. Every terminal session transition calls
//! [`SessionWorkspace::cleanup`]; `Drop` calls it as well. The atomic flag is
//! set only once the directory is gone, so a failed removal is retried by the
//! next call or by `Drop`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use subembed_core::paths::sanitize_file_name;
use subembed_core::{SessionId, UserId};

/// Working directory of one session.
#[derive(Debug)]
pub struct SessionWorkspace {
    dir: PathBuf,
    cleaned: AtomicBool,
}

impl SessionWorkspace {
    /// Create the session directory and its `downloads/` and `output/`
    /// subdirectories under `root`.
    pub fn create(root: &Path, user_id: UserId, session_id: SessionId) -> io::Result<Self> {
        let dir = root.join(user_id.to_string()).join(session_id.to_string());
        std::fs::create_dir_all(dir.join("downloads"))?;
        std::fs::create_dir_all(dir.join("output"))?;
        tracing::debug!(%user_id, %session_id, dir = %dir.display(), "workspace created");
        Ok(Self {
            dir,
            cleaned: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn downloads(&self) -> PathBuf {
        self.dir.join("downloads")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.join("output")
    }

    /// Local path for a submitted file. `prefix` keeps two submissions with
    /// the same name apart.
    pub fn download_path(&self, prefix: &str, file_name: &str) -> PathBuf {
        let name = sanitize_file_name(file_name, "file");
        self.downloads().join(format!("{prefix}_{name}"))
    }

    /// Local path for the mux result.
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir().join(sanitize_file_name(file_name, "output"))
    }

    /// Whether [`cleanup`](Self::cleanup) has already run.
    pub fn is_cleaned(&self) -> bool {
        self.cleaned.load(Ordering::Acquire)
    }

    /// Delete the session directory.
    ///
    /// Returns `Ok(true)` if this call removed it, `Ok(false)` if cleanup
    /// already succeeded. A directory that is already gone is not an error.
    /// On error the workspace stays uncleaned. The now-empty user directory
    /// is removed too when possible.
    pub fn cleanup(&self) -> io::Result<bool> {
        if self.is_cleaned() {
            return Ok(false);
        }

        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        if self.cleaned.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        if let Some(user_dir) = self.dir.parent() {
            // Fails while another session of the same user still has files.
            let _ = std::fs::remove_dir(user_dir);
        }

        tracing::debug!(dir = %self.dir.display(), "workspace removed");
        Ok(true)
    }

    /// Run [`cleanup`](Self::cleanup) on the blocking thread pool.
    pub async fn cleanup_blocking(self) -> io::Result<bool> {
        match tokio::task::spawn_blocking(move || self.cleanup()).await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

impl Drop for SessionWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove workspace on drop");
        }
    }
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Delete session directories left behind by an earlier process.
///
/// Only `<root>/<numeric user id>/` directories are touched. Returns the number
/// of session directories removed.
pub fn sweep_orphans(root: &Path) -> io::Result<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let is_user_dir = entry.file_type()?.is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.parse::<UserId>().is_ok());
        if !is_user_dir {
            continue;
        }

        for session in std::fs::read_dir(entry.path())? {
            let session = session?;
            if session.file_type()?.is_dir() {
                std::fs::remove_dir_all(session.path())?;
                removed += 1;
            } else {
                remove_file_if_exists(&session.path())?;
            }
        }
        let _ = std::fs::remove_dir(entry.path());
    }

    if removed > 0 {
        tracing::info!(removed, root = %root.display(), "removed orphaned session directories");
    }
    Ok(removed)
}
