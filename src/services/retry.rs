//! Bounded retry with a fixed backoff schedule and a caller-supplied error
//! classifier. Only errors the classifier marks retryable are retried; the
//! attempt count is capped by the schedule length.

use std::future::Future;
use std::time::Duration;

/// Delays applied before each retry. An empty schedule means a single
/// attempt; `rate_limit_default` gives the immediate-then-growing shape used
/// for upstream 429s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_backoff: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(retry_backoff: Vec<Duration>) -> Self {
        Self { retry_backoff }
    }

    /// Two retries after the initial attempt: ~1.8s, then ~3.5s.
    pub fn rate_limit_default() -> Self {
        Self::new(vec![Duration::from_millis(1800), Duration::from_millis(3500)])
    }

    pub fn no_retry() -> Self {
        Self::new(Vec::new())
    }

    /// Total attempts including the initial one.
    pub fn max_attempts(&self) -> usize {
        self.retry_backoff.len() + 1
    }
}

/// Run `op` until it succeeds, a non-retryable error occurs, or the schedule
/// is exhausted. `op` receives the zero-based attempt index.
pub async fn with_retry<T, E, Fut, Op, Cls>(
    policy: &RetryPolicy,
    retryable: Cls,
    mut op: Op,
) -> Result<T, E>
where
    Op: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Cls: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(delay) = policy.retry_backoff.get(attempt) else {
                    return Err(err);
                };
                if !retryable(&err) {
                    return Err(err);
                }
                attempt += 1;
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(*delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Hard,
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(vec![Duration::from_millis(1), Duration::from_millis(1)])
    }

    #[tokio::test]
    async fn exhausts_schedule_on_persistent_transient_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), TestError> = with_retry(
            &fast_policy(),
            |e| *e == TestError::Transient,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Transient) }
            },
        )
        .await;

        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn hard_error_fails_on_first_attempt() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), TestError> = with_retry(
            &fast_policy(),
            |e| *e == TestError::Transient,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::Hard) }
            },
        )
        .await;

        assert_eq!(result, Err(TestError::Hard));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_mid_schedule() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, TestError> = with_retry(
            &fast_policy(),
            |e| *e == TestError::Transient,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 1 {
                        Err(TestError::Transient)
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn default_schedule_shape() {
        let policy = RetryPolicy::rate_limit_default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(RetryPolicy::no_retry().max_attempts(), 1);
    }
}
