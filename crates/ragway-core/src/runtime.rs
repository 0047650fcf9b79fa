//! Cancellation, timeouts and the transport-level retry policy.
//!
//! The retry policy here is the fixed, small retry applied to individual model
//! calls. It is unrelated to the orchestrator's window retries.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Race `fut` against the caller's token. A cancelled token wins and the
/// in-flight future is dropped.
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::CancelledByCaller),
        out = fut => out,
    }
}

pub async fn with_timeout<F, T>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(out) => out,
        Err(_) => Err(Error::Timeout { operation: operation.to_string(), after_ms: limit.as_millis() as u64 }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, delay: Duration::from_millis(500) }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned unchanged.
    ///
    /// Callers wrap this in [`cancellable`]; dropping the future ends the delay.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(operation, attempt, error = %err, "transient failure, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
