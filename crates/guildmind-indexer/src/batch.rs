use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use guildmind_core::types::Message;
use guildmind_store::{records, Store};

use crate::breaker::CircuitBreaker;

/// Flush at this many buffered rows...
const BATCH_ROWS: usize = 100;
/// ...or when this much time has passed since the previous flush.
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Buffered message writer: collects upserts and flushes on size or timer.
/// Failed flushes quarantine the whole batch and feed the breaker.
pub struct WriteBatcher {
    tx: mpsc::Sender<Message>,
}

impl WriteBatcher {
    pub fn spawn(
        store: Arc<Store>,
        breaker: Arc<CircuitBreaker>,
        alerts: mpsc::Sender<String>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<Message>(BATCH_ROWS * 4);

        tokio::spawn(async move {
            let mut buf: Vec<Message> = Vec::with_capacity(BATCH_ROWS);
            let mut tick = tokio::time::interval(FLUSH_INTERVAL);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(m) => {
                                buf.push(m);
                                if buf.len() >= BATCH_ROWS {
                                    flush(&store, &breaker, &alerts, &mut buf).await;
                                }
                            }
                            None => {
                                flush(&store, &breaker, &alerts, &mut buf).await;
                                break;
                            }
                        }
                    }
                    _ = tick.tick() => {
                        flush(&store, &breaker, &alerts, &mut buf).await;
                    }
                }
            }
        });

        Self { tx }
    }

    pub async fn push(&self, msg: Message) {
        if self.tx.send(msg).await.is_err() {
            warn!("write batcher task is gone; message dropped");
        }
    }
}

async fn flush(
    store: &Store,
    breaker: &CircuitBreaker,
    alerts: &mpsc::Sender<String>,
    buf: &mut Vec<Message>,
) {
    if buf.is_empty() {
        return;
    }
    let batch = std::mem::take(buf);
    match records::upsert_messages(store, &batch).await {
        Ok(n) => {
            breaker.record_success();
            debug!(rows = n, "message batch flushed");
        }
        Err(e) => {
            warn!(error = %e, rows = batch.len(), "message batch flush failed, quarantining");
            for msg in &batch {
                if let Ok(v) = serde_json::to_value(msg) {
                    breaker.quarantine(&v, &e.to_string()).await;
                }
            }
            if breaker.record_failure() {
                let _ = alerts
                    .send(format!(
                        "Ingestion circuit breaker tripped after repeated store failures: {e}"
                    ))
                    .await;
            }
        }
    }
}
