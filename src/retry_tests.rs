// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::{retry_until, RetryPolicy};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Test that the default policy matches the documented values
    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(policy.backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_with_backoff() {
        let policy = RetryPolicy::new(Duration::from_secs(5)).with_backoff(Duration::from_millis(250));

        assert_eq!(policy.timeout, Duration::from_secs(5));
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }

    /// Test that a successful first attempt returns immediately
    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_until(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>("created")
            },
            "create",
            &RetryPolicy::default(),
        )
        .await;

        assert_eq!(result, Ok("created"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    /// Test that transient failures are masked by retries
    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_until(
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            },
            "delete",
            &RetryPolicy::default(),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(
            start.elapsed(),
            Duration::from_secs(2),
            "two fixed 1s backoffs between three attempts"
        );
    }

    /// Test that an always-failing mutation is retried until the deadline and no further
    #[tokio::test(start_paused = true)]
    async fn test_always_failing_mutation_times_out() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_secs(10));
        let start = Instant::now();

        let result = retry_until(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("provider unavailable")
            },
            "create CNAME web.svc.prod -> lb1.example.com",
            &policy,
        )
        .await;

        let elapsed = start.elapsed();
        let err = result.expect_err("must time out");
        let made = attempts.load(Ordering::SeqCst);

        assert!(made >= 10, "at least deadline/backoff attempts, got {made}");
        assert_eq!(err.attempts, made);
        assert_eq!(err.timeout, Duration::from_secs(10));
        assert_eq!(err.last_error, "provider unavailable");
        assert_eq!(err.operation, "create CNAME web.svc.prod -> lb1.example.com");
        assert!(elapsed <= policy.timeout, "never retries past the deadline");
        assert!(elapsed >= Duration::from_secs(9));
    }

    /// Test that the last sleep is shortened so no attempt starts after the deadline
    #[tokio::test(start_paused = true)]
    async fn test_backoff_clamped_to_deadline() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_millis(2500));
        let start = Instant::now();

        let result = retry_until(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            },
            "delete",
            &policy,
        )
        .await;

        assert!(result.is_err());
        // Attempts at 0s, 1s, 2s and 2.5s
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }

    /// Test that a zero deadline allows exactly one attempt
    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_single_attempt() {
        let attempts = AtomicU32::new(0);

        let result = retry_until(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("boom")
            },
            "delete",
            &RetryPolicy::new(Duration::ZERO),
        )
        .await;

        assert_eq!(result.expect_err("must time out").attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    /// Test that an attempt hanging past the deadline is abandoned at the deadline
    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_is_cut_at_deadline() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_secs(10));
        let start = Instant::now();

        let result = retry_until(
            || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err::<(), _>("request timed out")
            },
            "create CNAME web.svc.prod -> lb1.example.com",
            &policy,
        )
        .await;

        let err = result.expect_err("must time out");
        assert_eq!(start.elapsed(), policy.timeout);
        assert_eq!(err.attempts, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(err.last_error.contains("deadline"), "got: {}", err.last_error);
    }

    /// Test that a slow attempt started late is still bounded by the deadline
    #[tokio::test(start_paused = true)]
    async fn test_slow_retry_does_not_overrun_deadline() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::from_millis(2500));
        let start = Instant::now();

        let result = retry_until(
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == 1 {
                    Err::<(), _>("connection refused")
                } else {
                    // Stands in for a provider call held up by its own 30s client timeout
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
            },
            "delete",
            &policy,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
    }
}
