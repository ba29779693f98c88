//! Capped exponential backoff for model and transport faults.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay after `current`, doubled and capped.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if current >= self.max_delay {
            return self.max_delay;
        }
        let multiplier = self.backoff_multiplier.max(1.0) as f64;
        Duration::from_secs_f64(current.as_secs_f64() * multiplier).min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Cancelled while waiting between tries.
    Cancelled,
    /// The last error, after `tries` calls.
    Exhausted { tries: u32, error: E },
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or `policy.max_retries` retries are spent.
pub async fn execute_with_retry<T, E, Op, Fut, Classify>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_transient: Classify,
    mut operation: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut tries: u32 = 0;
    let mut delay = policy.initial_delay;

    loop {
        tries += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if tries <= policy.max_retries && is_transient(&error) => {
                warn!(
                    "Try {}/{} failed: {}; retrying in {:?}",
                    tries,
                    policy.max_retries + 1,
                    error,
                    delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = policy.next_delay(delay);
            }
            Err(error) => return Err(RetryError::Exhausted { tries, error }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delays_double_up_to_cap() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut seen = vec![delay.as_secs()];
        for _ in 0..6 {
            delay = policy.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 32]);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute_with_retry(
            &RetryPolicy::immediate(3),
            &CancellationToken::new(),
            |e: &String| e.starts_with("transient"),
            || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let err = execute_with_retry(
            &RetryPolicy::immediate(2),
            &CancellationToken::new(),
            |_: &String| true,
            || async { Err::<(), _>("still down".to_string()) },
        )
        .await
        .unwrap_err();
        match err {
            RetryError::Exhausted { tries, error } => {
                assert_eq!(tries, 3);
                assert_eq!(error, "still down");
            }
            RetryError::Cancelled => panic!("not cancelled"),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = execute_with_retry(
            &RetryPolicy::immediate(5),
            &CancellationToken::new(),
            |_: &String| false,
            || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("bad request".to_string())
                }
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { tries: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::default().with_initial_delay(Duration::from_secs(60));
        let err = execute_with_retry(&policy, &cancel, |_: &String| true, || async {
            Err::<(), _>("down".to_string())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }
}
