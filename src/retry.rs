//! Conflict retry for optimistic-concurrency writes.
//!
//! Updates against the cluster store use resource-version preconditions, so
//! concurrent writers surface as `Conflict` errors. This module provides the
//! platform's standard conflict-retry policy: a small bounded number of
//! attempts with backoff and jitter. Only conflicts are retried; every other
//! error is final.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::{Error, Result};

/// Policy for retrying conflicted writes.
#[derive(Clone, Debug)]
pub struct ConflictRetry {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Execute a write, retrying while it fails with a conflict.
///
/// The operation is re-invoked from scratch on each attempt, so callers must
/// re-read the contended object inside the closure. Returns the last conflict
/// error once `max_attempts` is exhausted.
pub async fn retry_on_conflict<F, Fut, T>(
    policy: &ConflictRetry,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() && attempt < policy.max_attempts => {
                // Jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Write conflicted, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * policy.backoff_multiplier)
                        .min(policy.max_delay.as_secs_f64()),
                );
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map an exhausted conflict into a structured error naming the object.
pub fn exhausted(kind: &'static str, name: &str, err: Error) -> Error {
    if err.is_conflict() {
        Error::conflict(kind, name)
    } else {
        err
    }
}
