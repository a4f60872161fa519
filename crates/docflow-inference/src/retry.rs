//! Bounded retry with exponential backoff.
//!
//! Extraction calls go over the network to a model endpoint and fail
//! transiently; the pipeline retries a fixed number of times with a
//! doubling delay before declaring the attempt dead.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use docflow_core::Result;

/// Retry policy: `max_attempts` total tries, sleeping
/// `base_delay * 2^(attempt-1)` between failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy used for extraction calls.
    pub fn extraction() -> Self {
        Self::new(
            docflow_core::defaults::EXTRACT_MAX_ATTEMPTS,
            Duration::from_millis(docflow_core::defaults::EXTRACT_RETRY_BASE_MS),
        )
    }

    /// Policy used when waiting for a freshly created job to become
    /// visible to the pipeline.
    pub fn job_fetch() -> Self {
        Self::new(
            docflow_core::defaults::JOB_FETCH_MAX_ATTEMPTS,
            Duration::from_millis(docflow_core::defaults::JOB_FETCH_RETRY_BASE_MS),
        )
    }

    /// Delay before retrying after the given 1-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` under the policy, returning the first success or the last
/// error once attempts are exhausted.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    subsystem = "inference",
                    op = operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(
                    subsystem = "inference",
                    op = operation,
                    attempt,
                    error = %err,
                    "All attempts exhausted"
                );
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::extraction();
        assert_eq!(policy.delay_after(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(RetryPolicy::extraction(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Error::Extraction("flaky".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let err = with_retry(RetryPolicy::extraction(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::Extraction("always".to_string())) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Extraction(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_first_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        with_retry(RetryPolicy::job_fetch(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
