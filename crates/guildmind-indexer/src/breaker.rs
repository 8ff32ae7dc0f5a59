use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tracing::{error, warn};

/// Consecutive write failures before the breaker opens.
const TRIP_THRESHOLD: usize = 10;
/// Ingestion pause once open.
const COOL_OFF: Duration = Duration::from_secs(300);

/// Circuit breaker over store writes. A run of consecutive failures pauses
/// ingestion for a cool-off period and raises one admin alert per trip.
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    quarantine_path: PathBuf,
}

struct BreakerState {
    consecutive_failures: usize,
    open_until: Option<Instant>,
    tripped_total: u64,
}

impl CircuitBreaker {
    pub fn new(quarantine_path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                open_until: None,
                tripped_total: 0,
            }),
            quarantine_path: quarantine_path.into(),
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.consecutive_failures = 0;
        }
    }

    /// Record a failure; returns true when this failure trips the breaker
    /// (the caller alerts the admin exactly once per trip).
    pub fn record_failure(&self) -> bool {
        let Ok(mut s) = self.state.lock() else {
            return false;
        };
        s.consecutive_failures += 1;
        if s.consecutive_failures >= TRIP_THRESHOLD && s.open_until.is_none() {
            s.open_until = Some(Instant::now() + COOL_OFF);
            s.tripped_total += 1;
            error!(
                failures = s.consecutive_failures,
                cool_off_secs = COOL_OFF.as_secs(),
                "ingestion circuit breaker tripped"
            );
            return true;
        }
        false
    }

    /// Remaining pause, if the breaker is currently open.
    pub fn pause_remaining(&self) -> Option<Duration> {
        let Ok(mut s) = self.state.lock() else {
            return None;
        };
        match s.open_until {
            Some(until) if until > Instant::now() => Some(until - Instant::now()),
            Some(_) => {
                // Cool-off elapsed; half-open again.
                s.open_until = None;
                s.consecutive_failures = 0;
                None
            }
            None => None,
        }
    }

    /// Quarantine a failed event to the side log and keep going.
    pub async fn quarantine(&self, event: &serde_json::Value, error_text: &str) {
        let line = serde_json::json!({
            "quarantined_at": guildmind_core::types::iso(&chrono::Utc::now()),
            "error": error_text,
            "event": event,
        });
        let payload = format!("{line}\n");

        let result = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.quarantine_path)
            .await;
        match result {
            Ok(mut f) => {
                if let Err(e) = f.write_all(payload.as_bytes()).await {
                    warn!(error = %e, "quarantine write failed");
                }
            }
            Err(e) => warn!(error = %e, path = %self.quarantine_path.display(), "quarantine open failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_and_only_once() {
        let b = CircuitBreaker::new("target/test-quarantine.jsonl");
        for _ in 0..TRIP_THRESHOLD - 1 {
            assert!(!b.record_failure());
        }
        assert!(b.record_failure());
        // Further failures while open do not re-trip.
        assert!(!b.record_failure());
        assert!(b.pause_remaining().is_some());
    }

    #[test]
    fn success_resets_the_run() {
        let b = CircuitBreaker::new("target/test-quarantine.jsonl");
        for _ in 0..TRIP_THRESHOLD - 1 {
            b.record_failure();
        }
        b.record_success();
        assert!(!b.record_failure());
        assert!(b.pause_remaining().is_none());
    }
}
