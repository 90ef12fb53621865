//! Bounded retry with backoff for transient upstream failures.

use std::future::Future;
use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Waits `base × attempt` after the given failed attempt (1-based).
    Linear {
        /// Delay after the first failure.
        base: Duration,
    },
    /// Waits the same delay after every failure.
    Fixed(Duration),
}

impl Backoff {
    /// Delay to wait after `attempt` (1-based) has failed.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::Linear { base } => base.saturating_mul(attempt),
            Self::Fixed(delay) => *delay,
        }
    }
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Linear backoff policy: `base × attempt` between attempts.
    #[must_use]
    pub const fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear { base },
        }
    }

    /// Runs `op` until it succeeds or attempts are exhausted.
    ///
    /// `op` receives the 1-based attempt number. Every failure is logged at
    /// `warn` with `label`; no delay follows the final attempt.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once all attempts have failed.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    tracing::warn!(label, attempt, error = %err, "giving up after final attempt");
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.backoff.delay_after(attempt);
                    tracing::warn!(
                        label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
