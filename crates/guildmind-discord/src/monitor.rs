use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// No heartbeat ACK for this long marks the connection unhealthy.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection health bookkeeping for the single logical gateway session.
///
/// serenity drives reconnects itself; the monitor only records what it
/// observes and never forces a second reconnect path.
pub struct ConnectionMonitor {
    started_at: Instant,
    last_heartbeat: RwLock<Option<Instant>>,
    last_latency_ms: AtomicU64,
    healthy: AtomicBool,
    session_id: RwLock<Option<String>>,
    resumed_count: AtomicU64,
    invalid_session_count: AtomicU64,
    ready_tx: watch::Sender<bool>,
}

impl ConnectionMonitor {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (ready_tx, ready_rx) = watch::channel(false);
        (
            Self {
                started_at: Instant::now(),
                last_heartbeat: RwLock::new(None),
                last_latency_ms: AtomicU64::new(0),
                healthy: AtomicBool::new(false),
                session_id: RwLock::new(None),
                resumed_count: AtomicU64::new(0),
                invalid_session_count: AtomicU64::new(0),
                ready_tx,
            },
            ready_rx,
        )
    }

    /// Feed a shard latency sample. Any sample counts as a heartbeat ACK.
    pub fn record_heartbeat(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.last_heartbeat.write() {
            *guard = Some(Instant::now());
        }
        if let Some(l) = latency {
            self.last_latency_ms
                .store(l.as_millis() as u64, Ordering::Relaxed);
        }
        self.healthy.store(true, Ordering::Relaxed);
    }

    pub fn on_ready(&self, session_id: Option<String>) {
        if let Ok(mut guard) = self.session_id.write() {
            *guard = session_id.clone();
        }
        self.healthy.store(true, Ordering::Relaxed);
        self.record_heartbeat(None);
        let _ = self.ready_tx.send(true);
        info!(session_id = ?session_id, "gateway session established");
    }

    pub fn on_resumed(&self) {
        self.resumed_count.fetch_add(1, Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
        self.record_heartbeat(None);
        let id = self.session_id.read().ok().and_then(|g| g.clone());
        info!(session_id = ?id, "gateway session resumed");
    }

    /// Invalid session: drop the recorded id so the next identify is fresh.
    pub fn on_invalid_session(&self) {
        self.invalid_session_count.fetch_add(1, Ordering::Relaxed);
        self.healthy.store(false, Ordering::Relaxed);
        if let Ok(mut guard) = self.session_id.write() {
            *guard = None;
        }
        warn!("invalid gateway session, identify will start fresh");
    }

    /// Health rule: a heartbeat ACK must have landed inside the timeout.
    /// When it hasn't we log and rely on the transport's auto-reconnect.
    pub fn is_healthy(&self) -> bool {
        let fresh = self
            .last_heartbeat
            .read()
            .ok()
            .and_then(|g| *g)
            .map(|t| t.elapsed() < HEARTBEAT_TIMEOUT)
            .unwrap_or(false);

        if !fresh && self.healthy.swap(false, Ordering::Relaxed) {
            warn!(
                timeout_secs = HEARTBEAT_TIMEOUT.as_secs(),
                "no heartbeat ACK inside timeout; relying on transport auto-reconnect"
            );
        }
        fresh
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            ready: self.is_ready(),
            healthy: self.is_healthy(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
            last_heartbeat_age_secs: self
                .last_heartbeat
                .read()
                .ok()
                .and_then(|g| *g)
                .map(|t| t.elapsed().as_secs()),
            session_id: self.session_id.read().ok().and_then(|g| g.clone()),
            resumed_count: self.resumed_count.load(Ordering::Relaxed),
            invalid_session_count: self.invalid_session_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub ready: bool,
    pub healthy: bool,
    pub uptime_secs: u64,
    pub latency_ms: u64,
    pub last_heartbeat_age_secs: Option<u64>,
    pub session_id: Option<String>,
    pub resumed_count: u64,
    pub invalid_session_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unhealthy_and_not_ready() {
        let (m, rx) = ConnectionMonitor::new();
        assert!(!m.is_healthy());
        assert!(!*rx.borrow());
    }

    #[test]
    fn ready_flips_watch_and_health() {
        let (m, rx) = ConnectionMonitor::new();
        m.on_ready(Some("sess-1".into()));
        assert!(*rx.borrow());
        assert!(m.is_healthy());
        assert_eq!(m.status().session_id.as_deref(), Some("sess-1"));
    }

    #[test]
    fn invalid_session_drops_session_id() {
        let (m, _rx) = ConnectionMonitor::new();
        m.on_ready(Some("sess-1".into()));
        m.on_invalid_session();
        let status = m.status();
        assert!(status.session_id.is_none());
        assert_eq!(status.invalid_session_count, 1);
    }
}
