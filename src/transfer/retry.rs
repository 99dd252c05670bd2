//! Bounded retries with exponential backoff for transfer steps.

use std::future::Future;
use std::time::Duration;

use subembed_core::config::TransferConfig;
use subembed_core::{Error, Result};
use tokio_util::sync::CancellationToken;

/// How often and how patiently a transfer step is retried.
///
/// Only [`Error::Io`] is retried; every other error is returned at once.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << shift)
    }

    /// Run `op` until it succeeds, fails with a non-I/O error, or the attempts
    /// run out. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, step: &str, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(Error::Io { source }) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(step, attempts = attempt, error = %source, "giving up");
                        return Err(Error::transient(step, attempt, source));
                    }
                    let wait = self.delay_for(attempt);
                    tracing::warn!(
                        step,
                        retry = attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %source,
                        "transfer failed, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
