//! Bounded retry with exponential backoff and jitter for cluster API calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first one; always at least 1
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(attempts: u32) -> Self {
        Self {
            attempts,
            ..Default::default()
        }
    }

    /// Delay before the retry following `attempt` (1-based), without jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// Returns the last error on exhaustion. Callers that need cancellation race
/// the returned future against their token.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %err,
                "giving up after final attempt"
            );
            return Err(err);
        }

        // 0.5x - 1.5x spread
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = policy.delay_after(attempt).mul_f64(jitter);

        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, backing off"
        );

        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn recovers_from_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<&str, String> = retry_with_backoff(&fast(4), "patch", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("connection reset".to_string())
                } else {
                    Ok("patched")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("patched"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_the_last_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result: Result<(), String> = retry_with_backoff(&fast(3), "patch", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("503".to_string())
            }
        })
        .await;

        assert_eq!(result, Err("503".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let _: Result<(), &str> = retry_with_backoff(&fast(0), "list", || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err("down") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
