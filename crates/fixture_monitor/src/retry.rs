//! Bounded retry for rate-limited provider calls: exponential delay with a
//! ceiling and a fixed number of attempts.

use crate::FetchError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per call including the first one. At least 1.
    pub max_attempts:       u32,
    pub initial_delay:      Duration,
    pub max_delay:          Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts:       3,
            initial_delay:      Duration::from_millis(2000),
            max_delay:          Duration::from_millis(15_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, after `attempt` (1-based) was rate limited.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.max(1.0).powi(exp);
        let capped = ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Runs `op` until it returns something other than `RateLimited`, or the
    /// attempts run out. `op` receives the 1-based attempt number. Every other
    /// error is returned immediately; a transient failure waits for the next
    /// cycle instead.
    pub async fn run<T, F, Fut>(&self, endpoint: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Err(FetchError::RateLimited { .. }) if attempt < max => {
                    let delay = self.delay_after(attempt);
                    warn!(endpoint, attempt, delay_ms = delay.as_millis() as u64, "429 rate limited, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(FetchError::RateLimited { .. }) => {
                    return Err(FetchError::RateLimited { endpoint: endpoint.to_string(), attempts: attempt });
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts:       4,
            initial_delay:      Duration::from_millis(1),
            max_delay:          Duration::from_millis(4),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn delay_grows_then_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_after(1), Duration::from_millis(2000));
        assert_eq!(p.delay_after(2), Duration::from_millis(4000));
        assert_eq!(p.delay_after(3), Duration::from_millis(8000));
        assert_eq!(p.delay_after(4), Duration::from_millis(15_000));
        assert_eq!(p.delay_after(40), Duration::from_millis(15_000));
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let calls = AtomicU32::new(0);
        let out = fast()
            .run("fixtures", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(FetchError::RateLimited { endpoint: "fixtures".into(), attempts: attempt })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run::<(), _, _>("odds", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(FetchError::RateLimited { endpoint: "odds".into(), attempts: attempt }) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run::<(), _, _>("fixtures/statistics", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Transient { endpoint: "fixtures/statistics".into(), message: "timeout".into() }) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transient { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
