use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tracing::{error, warn};

use crate::error::{RetryClass, Retryable};

const BASE_DELAY: f64 = 1.0;
const MAX_DELAY: f64 = 64.0;
const JITTER: f64 = 0.1;
const MAX_RETRIES: usize = 5;

/// Per-key exponential backoff wrapping any API call. The key is usually a
/// channel or user id so one hot channel cannot starve the rest.
///
/// Callers pass a factory, not a future: every retry needs a fresh
/// awaitable.
pub struct RateLimiter {
    backoff: DashMap<String, f64>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            backoff: DashMap::new(),
        }
    }

    pub async fn execute<T, E, F, Fut>(&self, key: &str, mut factory: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0usize;

        loop {
            // Keys that failed recently start slow.
            if let Some(delay) = self.backoff.get(key).map(|d| *d) {
                tokio::time::sleep(jittered(delay)).await;
            }

            match factory().await {
                Ok(v) => {
                    self.backoff.insert(key.to_string(), BASE_DELAY);
                    return Ok(v);
                }
                Err(e) => {
                    attempt += 1;
                    match e.retry_class() {
                        RetryClass::RateLimited { retry_after } => {
                            if attempt >= MAX_RETRIES {
                                error!(key, attempts = attempt, error = %e, "rate limited, giving up");
                                return Err(e);
                            }
                            match retry_after {
                                Some(wait) => {
                                    warn!(key, ?wait, "rate limit hit, honouring retry_after");
                                    tokio::time::sleep(wait).await;
                                }
                                None => {
                                    let next = self.double(key);
                                    warn!(key, delay = next, "rate limit hit, exponential backoff");
                                    tokio::time::sleep(Duration::from_secs_f64(next)).await;
                                }
                            }
                        }
                        RetryClass::Transient => {
                            if attempt >= MAX_RETRIES {
                                error!(key, attempts = attempt, error = %e, "transient failure, giving up");
                                return Err(e);
                            }
                            let next = self.double(key);
                            warn!(
                                key,
                                attempt,
                                delay = next,
                                error = %e,
                                "transient error, retrying"
                            );
                            tokio::time::sleep(Duration::from_secs_f64(next)).await;
                        }
                        RetryClass::Permanent => {
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    fn double(&self, key: &str) -> f64 {
        let current = self.backoff.get(key).map(|d| *d).unwrap_or(BASE_DELAY);
        let next = (current * 2.0).min(MAX_DELAY);
        self.backoff.insert(key.to_string(), next);
        next
    }

    #[cfg(test)]
    fn current_delay(&self, key: &str) -> Option<f64> {
        self.backoff.get(key).map(|d| *d)
    }
}

fn jittered(secs: f64) -> Duration {
    let factor = rand::thread_rng().gen_range(-JITTER..=JITTER);
    Duration::from_secs_f64((secs * (1.0 + factor)).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestError(RetryClass);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl Retryable for TestError {
        fn retry_class(&self) -> RetryClass {
            self.0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_on_transient_and_resets_on_success() {
        let rl = RateLimiter::new();
        let calls = AtomicUsize::new(0);

        let out: Result<u32, TestError> = rl
            .execute("k", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(TestError(RetryClass::Transient))
                    } else {
                        Ok(9)
                    }
                }
            })
            .await;

        assert_eq!(out.unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // Success resets the stored delay to base.
        assert_eq!(rl.current_delay("k"), Some(BASE_DELAY));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_caps_at_ceiling() {
        let rl = RateLimiter::new();
        let out: Result<(), TestError> = rl
            .execute("k", || async { Err(TestError(RetryClass::Transient)) })
            .await;
        assert!(out.is_err());
        assert!(rl.current_delay("k").unwrap() <= MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_retry_after_is_honoured() {
        let rl = RateLimiter::new();
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();

        let out: Result<u32, TestError> = rl
            .execute("k", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(TestError(RetryClass::RateLimited {
                            retry_after: Some(Duration::from_secs(7)),
                        }))
                    } else {
                        Ok(1)
                    }
                }
            })
            .await;

        assert_eq!(out.unwrap(), 1);
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test]
    async fn permanent_errors_propagate_immediately() {
        let rl = RateLimiter::new();
        let calls = AtomicUsize::new(0);
        let out: Result<(), TestError> = rl
            .execute("k", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError(RetryClass::Permanent)) }
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
