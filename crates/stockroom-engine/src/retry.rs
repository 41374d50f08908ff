//! # Retry Policy
//!
//! Re-runs a whole coordinator operation when storage reports a transient
//! failure.
//!
//! ## Attempt Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1 ──► Ok ─────────────────────────────────────────► return     │
//! │      │                                                                  │
//! │      ├──► Err(not transient) ──────────────────────────────► return     │
//! │      │                                                                  │
//! │      └──► Err(Busy | PoolExhausted | Conflict)                          │
//! │               │                                                         │
//! │               ▼                                                         │
//! │           sleep(next_backoff) ──► attempt 2 ──► ... ──► attempt N       │
//! │                                                             │           │
//! │                                             still transient ▼           │
//! │                                                      EngineError::Fatal │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every attempt starts from scratch: fresh reads, fresh locks, a new unit
//! of work. A failed attempt has already rolled back, so nothing carries
//! over between attempts.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};

/// How many times and how patiently to re-run an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. At least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Creates the exponential backoff schedule for one operation.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // Bounded by max_attempts instead
            ..Default::default()
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// Storage errors never escape this function as `EngineError::Storage`:
/// a permanent one and an exhausted transient one both become
/// [`EngineError::Fatal`].
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.create_backoff();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient_storage() {
            return Err(into_fatal(err, operation, attempt));
        }

        if attempt >= max_attempts {
            warn!(operation, attempt, error = %err, "Giving up after transient failures");
            return Err(into_fatal(err, operation, attempt));
        }

        let delay = backoff.next_backoff().unwrap_or(policy.max_backoff);
        warn!(operation, attempt, ?delay, error = %err, "Transient failure, retrying");
        tokio::time::sleep(delay).await;
    }
}

fn into_fatal(err: EngineError, operation: &str, attempts: u32) -> EngineError {
    match err {
        EngineError::Storage(db) => {
            tracing::error!(operation, attempts, error = %db, "Storage failure");
            EngineError::Fatal {
                operation: operation.to_string(),
                attempts,
                message: db.to_string(),
            }
        }
        other => other,
    }
}
