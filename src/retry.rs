// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deadline-bounded retry for provider mutations.
//!
//! Every create/delete is a task that moves through:
//!
//! ```text
//! Pending -> Attempting -> Succeeded
//!                |
//!                +-> (failed, deadline not reached) sleep backoff -> Attempting
//!                +-> (failed, deadline reached)     TimedOut
//! ```
//!
//! The number of attempts is unbounded; wall-clock time is not. An attempt
//! that is still running at the deadline is dropped. A task that
//! times out yields [`MutationTimeoutExceeded`], which callers must treat as
//! fatal. The deadline is measured with tokio's monotonic clock.

use crate::constants::{DEFAULT_MUTATION_TIMEOUT_SECS, MUTATION_BACKOFF_MILLIS};
use crate::errors::MutationTimeoutExceeded;
use crate::metrics;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Timing of the mutation retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// How long a single mutation may keep failing before it is fatal
    pub timeout: Duration,
    /// Fixed delay between two attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy with the given deadline and the default 1 second backoff.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            backoff: Duration::from_millis(MUTATION_BACKOFF_MILLIS),
        }
    }

    /// Override the delay between attempts.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_MUTATION_TIMEOUT_SECS))
    }
}

/// Run `operation` until it succeeds or `policy.timeout` has elapsed.
///
/// Each attempt runs under the deadline, so a hanging call is abandoned when it
/// passes. After each failure the deadline is checked: once it is reached the
/// last error is wrapped in [`MutationTimeoutExceeded`]. Otherwise the loop
/// sleeps for `policy.backoff`, shortened so that no attempt starts after the
/// deadline. With a zero timeout the operation is still polled once.
///
/// # Errors
///
/// Returns [`MutationTimeoutExceeded`] if no attempt succeeded before the deadline.
///
/// # Example
///
/// ```no_run
/// use svc2dns::retry::{retry_until, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), svc2dns::errors::MutationTimeoutExceeded> {
/// let policy = RetryPolicy::new(Duration::from_secs(10));
/// retry_until(
///     || async { Ok::<_, std::io::Error>(()) },
///     "create CNAME web.svc.prod -> lb1.example.com",
///     &policy,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_until<T, E, F, Fut>(
    mut operation: F,
    operation_name: &str,
    policy: &RetryPolicy,
) -> Result<T, MutationTimeoutExceeded>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        // An attempt still in flight at the deadline counts as failed
        let failure = match tokio::time::timeout_at(deadline, operation()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start.elapsed(),
                        "Mutation succeeded after retries"
                    );
                } else {
                    debug!(operation = operation_name, "Mutation succeeded");
                }
                return Ok(value);
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "attempt still running when the {:?} deadline passed",
                policy.timeout
            ),
        };

        let now = Instant::now();
        if now >= deadline {
            error!(
                operation = operation_name,
                attempt = attempt,
                elapsed = ?start.elapsed(),
                error = %failure,
                "Mutation deadline exceeded, giving up"
            );
            metrics::record_mutation_timeout();
            return Err(MutationTimeoutExceeded {
                operation: operation_name.to_string(),
                timeout: policy.timeout,
                attempts: attempt,
                last_error: failure,
            });
        }

        let delay = policy.backoff.min(deadline - now);
        warn!(
            operation = operation_name,
            attempt = attempt,
            retry_after = ?delay,
            error = %failure,
            "Mutation failed, will retry"
        );
        metrics::record_mutation_retry();
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
