use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::StoreError;

const MAX_ATTEMPTS: usize = 5;
const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 32_000;

/// Retry `factory` on transient store errors with capped exponential
/// backoff and ±10% jitter. Permanent errors surface immediately.
pub async fn with_backoff<T, F, Fut>(op: &str, mut factory: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay_ms = BASE_DELAY_MS;

    for attempt in 1..=MAX_ATTEMPTS {
        match factory().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(op, attempt, error = %e, "transient store error, backing off");
                tokio::time::sleep(jittered(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop always returns")
}

fn jittered(ms: u64) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    Duration::from_millis((ms as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_then_succeed() {
        let calls = AtomicUsize::new(0);
        let out = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Transient("boom".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicUsize::new(0);
        let out: Result<(), _> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Validation("bad".into())) }
        })
        .await;
        assert!(matches!(out, Err(StoreError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
