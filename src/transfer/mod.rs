//! Byte transfers between collaborators and the session workspace.
//!
//! [`ProgressReporter`] copies a stream of known size while reporting
//! throttled [`ProgressEvent`]s, retries transient I/O failures, and removes
//! partial files when a download does not finish.

pub mod progress;
pub mod retry;

use std::io;
use std::path::Path;
use std::time::Instant;

use subembed_av::workspace::remove_file_if_exists;
use subembed_core::config::{StorageConfig, TransferConfig};
use subembed_core::{Error, Result, UserId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{Delivery, FileSource, OutputSink};

pub use progress::{format_bytes, progress_bar, ProgressEvent, ProgressSender, ProgressThrottle};
pub use retry::RetryPolicy;

/// Runs downloads and uploads with progress reporting and retries.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    config: TransferConfig,
    retry: RetryPolicy,
    min_free_bytes: u64,
}

impl ProgressReporter {
    pub fn new(transfer: &TransferConfig, storage: &StorageConfig) -> Self {
        Self {
            config: transfer.clone(),
            retry: RetryPolicy::from_config(transfer),
            min_free_bytes: storage.min_free_bytes,
        }
    }

    /// Copy `reader` into `writer`, expecting `total` bytes.
    ///
    /// Intermediate events are throttled; a single completion event follows a
    /// successful copy. Cancellation returns [`Error::Cancelled`] without a
    /// completion event. A stream that ends early is an I/O error.
    pub async fn copy<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        total: u64,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let started = Instant::now();
        let mut throttle = ProgressThrottle::new(
            self.config.progress_interval(),
            self.config.progress_min_percent,
            started,
        );
        let mut buf = vec![0u8; self.config.buffer_size.max(1)];
        let mut transferred = 0u64;

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                read = reader.read(&mut buf) => read?,
            };
            if n == 0 {
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                written = writer.write_all(&buf[..n]) => written?,
            }
            transferred += n as u64;

            let event = ProgressEvent {
                bytes_transferred: transferred,
                bytes_total: total,
                elapsed: started.elapsed(),
            };
            if throttle.should_emit(&event, Instant::now()) {
                progress.send(event);
            }
        }

        if transferred < total {
            return Err(Error::from(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {transferred} of {total} bytes"),
            )));
        }
        if transferred > total {
            tracing::debug!(transferred, total, "stream longer than announced");
        }

        writer.shutdown().await?;

        progress.send(ProgressEvent {
            bytes_transferred: transferred,
            bytes_total: transferred,
            elapsed: started.elapsed(),
        });
        Ok(transferred)
    }

    /// Download `source` into `dest`. On any failure `dest` is removed.
    pub async fn download(
        &self,
        source: &dyn FileSource,
        dest: &Path,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let step = format!("download of {}", source.file_name());
        let result = async {
            if let Some(dir) = dest.parent() {
                tokio::fs::create_dir_all(dir).await?;
                ensure_free_space(dir, source.size(), self.min_free_bytes)?;
            }
            self.retry
                .run(&step, cancel, |attempt| async move {
                    tracing::debug!(file = source.file_name(), attempt, "downloading");
                    let mut reader = source.open().await?;
                    let mut file = tokio::fs::File::create(dest).await?;
                    self.copy(&mut reader, &mut file, source.size(), progress, cancel)
                        .await
                })
                .await
        }
        .await;

        if let Err(e) = &result {
            tracing::debug!(file = source.file_name(), error = %e, "download failed; removing partial file");
            if let Err(rm) = remove_file_if_exists(dest) {
                tracing::warn!(path = %dest.display(), error = %rm, "failed to remove partial download");
            }
        }
        result
    }

    /// Upload the file at `path` to `sink`.
    pub async fn upload(
        &self,
        path: &Path,
        sink: &dyn OutputSink,
        user_id: UserId,
        delivery: &Delivery,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let step = format!("upload of {}", delivery.file_name);
        self.retry
            .run(&step, cancel, |attempt| async move {
                tracing::debug!(%user_id, file = %delivery.file_name, attempt, "uploading");
                let mut file = tokio::fs::File::open(path).await?;
                let total = file.metadata().await?.len();
                let mut writer = sink.open_upload(user_id, delivery).await?;
                self.copy(&mut file, &mut writer, total, progress, cancel)
                    .await
            })
            .await
    }
}

/// Refuse to store `needed` more bytes in `dir` if that would leave less
/// than `min_free` bytes free.
pub fn ensure_free_space(dir: &Path, needed: u64, min_free: u64) -> Result<()> {
    if min_free == 0 {
        return Ok(());
    }
    let available = match available_space(dir) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "could not read free space");
            return Ok(());
        }
    };
    if available.saturating_sub(needed) < min_free {
        tracing::warn!(available, needed, min_free, "refusing download: low disk space");
        return Err(Error::ResourceExhausted(
            "The server is running low on disk space. Please try again later.".into(),
        ));
    }
    Ok(())
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn available_space(dir: &Path) -> io::Result<u64> {
    let stat = nix::sys::statvfs::statvfs(dir).map_err(io::Error::from)?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[cfg(not(unix))]
fn available_space(_dir: &Path) -> io::Result<u64> {
    Ok(u64::MAX)
}
