use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Linear backoff: the pause after failed attempt `n` is `backoff_secs × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Always at least 1.
    pub attempts: u32,
    pub backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_secs.saturating_mul(u64::from(attempt)))
    }
}

/// Terminal state of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last_error: E },
    /// The classifier refused to retry this error.
    Aborted { attempt: u32, error: E },
    /// Shutdown was requested while waiting to retry.
    Cancelled { attempt: u32, last_error: E },
}

/// Run `operation` until it succeeds, the classifier aborts, attempts run out,
/// or `shutdown` fires during a backoff sleep.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    shutdown: &CancellationToken,
    classifier: C,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.attempts.max(1);
    let mut attempt = 1;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                }
            }
            Err(e) => e,
        };

        if classifier(&err) == RetryAction::Abort {
            return RetryOutcome::Aborted { attempt, error: err };
        }
        if attempt >= total_attempts {
            return RetryOutcome::Exhausted {
                attempts: attempt,
                last_error: err,
            };
        }

        let delay = config.delay_after_attempt(attempt);
        tracing::warn!(
            attempt,
            max_attempts = total_attempts,
            "Transient failure, retrying in {}s: {}",
            delay.as_secs(),
            err
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => {
                return RetryOutcome::Cancelled { attempt, last_error: err };
            }
        }
        attempt += 1;
    }
}
