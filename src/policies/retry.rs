//! # Bounded retry for calls to external collaborators.
//!
//! [`RetryPolicy`] runs an async operation up to `attempts` times, sleeping
//! [`BackoffPolicy::next`] between attempts. A retry happens only when the
//! failure maps to a retryable (5xx) [`RespCode`](crate::RespCode).
//!
//! ## Rules
//! - `attempts = 0` is treated as `1`; the operation always runs once.
//! - Cancellation of `token` during a backoff pause returns [`RecoverError::Cancelled`].
//! - The last error is returned unchanged when the budget is spent.
//!
//! ```text
//! op(0) ─err─► sleep(next(0)) ─► op(1) ─err─► sleep(next(1)) ─► op(2) ─err─► Err(last)
//!   └─ok─► Ok          (token cancelled during sleep ─► Err(Cancelled))
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RecoverError;
use crate::policies::{BackoffPolicy, Growth, JitterPolicy};

/// Attempt budget plus the pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Three attempts with linear backoff starting at 1s.
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(10),
                growth: Growth::Linear,
                jitter: JitterPolicy::None,
            },
        }
    }
}

impl RetryPolicy {
    /// `attempts` tries with no pause in between.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: BackoffPolicy::immediate(),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the budget is spent.
    ///
    /// `op` receives the 0-based attempt number; `name` labels the retry logs.
    pub async fn run<T, E, F, Fut>(
        &self,
        token: &CancellationToken,
        name: &'static str,
        mut op: F,
    ) -> Result<T, RecoverError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RecoverError>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0u32;
        loop {
            let err: RecoverError = match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) => e.into(),
            };
            attempt += 1;
            if !err.is_retryable() || attempt >= attempts {
                return Err(err);
            }

            let delay = self.backoff.next(attempt - 1);
            tracing::debug!(op = name, attempt, ?delay, error = %err, "retrying");
            tokio::select! {
                _ = token.cancelled() => return Err(RecoverError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
