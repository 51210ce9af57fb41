//! Retrying invoker with bounded exponential backoff.
//!
//! Transient solver errors are retried after `base * 2^n + jitter`; any
//! other error ends the attempt immediately. Transient errors never escape:
//! they either turn into a success or into `AttemptError::RetryExhausted`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::{AttemptError, SolverError};

/// Backoff policy for rate-limited solver calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry, doubled on every subsequent one.
    pub base_delay: Duration,
    /// Total calls allowed, the first one included.
    pub max_attempts: u32,
    /// Lower bound of the uniform jitter added to each delay.
    pub jitter_min: Duration,
    /// Upper bound of the uniform jitter added to each delay.
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            max_attempts: 5,
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy without jitter, useful when delays must be predictable.
    pub fn fixed(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        let low = self.jitter_min.as_millis() as u64;
        let high = self.jitter_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(low..=high))
    }
}

/// Successful result of an invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub output: String,
    /// Number of retries that preceded the successful call.
    pub retries: u32,
}

/// Wraps solver calls with the retry policy.
#[derive(Debug, Clone, Default)]
pub struct RetryingInvoker {
    policy: RetryPolicy,
}

impl RetryingInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds, fails fatally, or the ceiling is hit.
    ///
    /// `on_retry` is told the retry number and the delay about to be slept,
    /// before the sleep starts.
    pub async fn invoke<F, Fut, R>(
        &self,
        mut call: F,
        mut on_retry: R,
    ) -> Result<Invocation, AttemptError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, SolverError>>,
        R: FnMut(u32, Duration),
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut calls = 0u32;

        loop {
            calls += 1;
            let err = match call().await {
                Ok(output) => {
                    return Ok(Invocation {
                        output,
                        retries: calls - 1,
                    })
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                tracing::warn!("non-retryable solver error: {err}");
                return Err(AttemptError::Fatal(err));
            }
            if calls >= max_attempts {
                tracing::warn!("giving up after {calls} calls: {err}");
                return Err(AttemptError::RetryExhausted {
                    attempts: calls,
                    last: err,
                });
            }

            let mut delay = self.policy.backoff(calls);
            if let Some(hint) = err.retry_after() {
                delay = delay.max(hint);
            }
            tracing::debug!(
                retry = calls,
                delay_ms = delay.as_millis() as u64,
                "transient solver error, backing off: {err}"
            );
            on_retry(calls, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited() -> SolverError {
        SolverError::RateLimited {
            retry_after_ms: None,
        }
    }

    #[test]
    fn backoff_doubles_without_jitter() {
        let policy = RetryPolicy::fixed(Duration::from_millis(100), 5);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_secs(11), "too short: {delay:?}");
            assert!(delay <= Duration::from_secs(15), "too long: {delay:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn four_transient_errors_then_success() {
        let invoker = RetryingInvoker::new(RetryPolicy::default());
        let calls = &AtomicU32::new(0);
        let mut delays = Vec::new();

        let result = invoker
            .invoke(
                || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 4 {
                        Err(rate_limited())
                    } else {
                        Ok("x = 4".to_string())
                    }
                },
                |_, delay| delays.push(delay),
            )
            .await
            .unwrap();

        assert_eq!(result.output, "x = 4");
        assert_eq!(result.retries, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(delays.len(), 4);
        assert!(
            delays.windows(2).all(|w| w[0] < w[1]),
            "delays should strictly increase: {delays:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_reported_distinctly() {
        let invoker = RetryingInvoker::new(RetryPolicy::fixed(Duration::from_millis(10), 5));
        let calls = &AtomicU32::new(0);

        let err = invoker
            .invoke(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(rate_limited())
                },
                |_, _| {},
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(err, AttemptError::RetryExhausted { attempts: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let invoker = RetryingInvoker::default();
        let calls = &AtomicU32::new(0);
        let mut retried = false;

        let err = invoker
            .invoke(
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(SolverError::AuthenticationFailed("bad key".into()))
                },
                |_, _| retried = true,
            )
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!retried);
        assert!(matches!(err, AttemptError::Fatal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_hint_extends_delay() {
        let invoker = RetryingInvoker::new(RetryPolicy::fixed(Duration::from_millis(10), 3));
        let calls = &AtomicU32::new(0);
        let mut delays = Vec::new();

        invoker
            .invoke(
                || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(SolverError::RateLimited {
                            retry_after_ms: Some(2_000),
                        })
                    } else {
                        Ok("done".to_string())
                    }
                },
                |_, delay| delays.push(delay),
            )
            .await
            .unwrap();

        assert_eq!(delays, vec![Duration::from_secs(2)]);
    }
}
