//! System-wide cap on concurrently running mux jobs.

use std::sync::Arc;

use subembed_core::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct MuxScheduler {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl MuxScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently taken by a running job.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a slot. `on_queued` runs once if the caller has to wait.
    /// Cancelling while queued returns [`Error::Cancelled`].
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
        on_queued: impl FnOnce(),
    ) -> Result<OwnedSemaphorePermit> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::NoPermits) => on_queued(),
            Err(TryAcquireError::Closed) => {
                return Err(Error::Internal("mux scheduler closed".into()))
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| Error::Internal("mux scheduler closed".into()))
            }
        }
    }
}
