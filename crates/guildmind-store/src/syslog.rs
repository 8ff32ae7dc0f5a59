use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use guildmind_core::types::SystemLogRow;

use crate::records;
use crate::Store;

const BUFFER_ROWS: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const QUEUE_DEPTH: usize = 1024;

/// Buffered writer for the append-only `system_logs` table. Rows arrive on
/// an mpsc channel (non-blocking for producers) and flush on size or timer.
/// Write failures are dropped with a local debug line — the log sink must
/// never feed back into the error path it records.
pub fn spawn_writer(store: Arc<Store>) -> mpsc::Sender<SystemLogRow> {
    let (tx, mut rx) = mpsc::channel::<SystemLogRow>(QUEUE_DEPTH);

    tokio::spawn(async move {
        let mut buf: Vec<SystemLogRow> = Vec::with_capacity(BUFFER_ROWS);
        let mut tick = tokio::time::interval(FLUSH_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                row = rx.recv() => {
                    match row {
                        Some(row) => {
                            buf.push(row);
                            if buf.len() >= BUFFER_ROWS {
                                flush(&store, &mut buf).await;
                            }
                        }
                        None => {
                            flush(&store, &mut buf).await;
                            break;
                        }
                    }
                }
                _ = tick.tick() => {
                    flush(&store, &mut buf).await;
                }
            }
        }
    });

    tx
}

async fn flush(store: &Store, buf: &mut Vec<SystemLogRow>) {
    if buf.is_empty() {
        return;
    }
    let rows = std::mem::take(buf);
    if let Err(e) = records::insert_system_logs(store, &rows).await {
        debug!(error = %e, dropped = rows.len(), "system log flush failed");
    }
}
