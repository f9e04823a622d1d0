//! Retry policy for extraction backend calls.
//!
//! Only the backend's rate-limit signal is retried; any other failure —
//! including malformed output — propagates immediately.

use std::time::Duration;

use tracing::info;

use crate::error::ExtractError;

/// Retry-with-backoff policy shared by all extraction operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given zero-based failed attempt: 1s, 2s, 4s, …
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `op`, retrying on rate-limit errors until the attempt budget
    /// is exhausted. The final error propagates unmodified.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ExtractError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExtractError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_rate_limited() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    attempt += 1;
                    info!(
                        delay_secs = delay.as_secs(),
                        attempt,
                        max_attempts = self.max_attempts,
                        "Rate limited, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited() -> ExtractError {
        ExtractError::RateLimited { retry_after: None }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_with_exponential_delays() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let calls_in = Arc::clone(&calls);
        let result: Result<&str, _> = policy
            .run(move || {
                let calls = Arc::clone(&calls_in);
                async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 | 1 => Err(rate_limited()),
                        _ => Ok("parsed"),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "parsed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two delays: 1s then 2s (paused clock, so exact)
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_propagates_the_rate_limit_error() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));

        let calls_in = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run(move || {
                let calls = Arc::clone(&calls_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                }
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let calls_in = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .run(move || {
                let calls = Arc::clone(&calls_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ExtractError::InvalidResponse {
                        reason: "not json".into(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ExtractError::InvalidResponse { .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn delays_double_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
    }
}
