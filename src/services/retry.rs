//! Bounded retry with exponential backoff for migration batches.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use tracing::warn;

use crate::domain::errors::DomainError;
use crate::domain::models::MigrationConfig;

/// The last error after every attempt was used.
#[derive(Debug)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub error: DomainError,
}

/// Retry policy with exponential backoff.
///
/// Unlike a time-bounded backoff, the policy gives up after a fixed
/// number of attempts so a failing task reaches a terminal state
/// predictably.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds or `max_attempts` is reached.
    ///
    /// The operation receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts;
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build();

        let result = backoff::future::retry_notify(
            policy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let fut = operation(attempt);
                async move {
                    fut.await.map_err(|err| {
                        if attempt >= max_attempts {
                            backoff::Error::permanent(err)
                        } else {
                            backoff::Error::transient(err)
                        }
                    })
                }
            },
            |err: DomainError, wait: Duration| {
                warn!(
                    attempt = attempts.load(Ordering::SeqCst),
                    max_attempts,
                    retry_in_ms = wait.as_millis() as u64,
                    error = %err,
                    "Batch attempt failed, retrying"
                );
            },
        )
        .await;

        result.map_err(|error| RetryExhausted {
            attempts: attempts.load(Ordering::SeqCst),
            error,
        })
    }
}
