use std::sync::Arc;
use std::time::Duration;

use serenity::http::Http;
use serenity::model::id::UserId;
use tokio::sync::mpsc;
use tracing::{info, warn};

use guildmind_discord::send::safe_dm;
use guildmind_discord::RateLimiter;

/// Alerts arriving within this window collapse into one DM.
const COALESCE_WINDOW: Duration = Duration::from_secs(60);
/// Minimum spacing between admin DMs; alerts queue behind the gate.
const MIN_DM_INTERVAL: Duration = Duration::from_secs(300);
const QUEUE_DEPTH: usize = 64;

/// Single coalesced admin alert channel. Everything that must reach the
/// admin goes through here, so bursts become one DM instead of a flood.
pub fn spawn_alert_sink(
    http: Arc<Http>,
    rl: Arc<RateLimiter>,
    admin_user_id: u64,
) -> mpsc::Sender<String> {
    let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);

    tokio::spawn(async move {
        let admin = UserId::new(admin_user_id);
        let mut last_sent = tokio::time::Instant::now() - MIN_DM_INTERVAL;

        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];

            // Drain everything that lands inside the coalescing window.
            let deadline = tokio::time::Instant::now() + COALESCE_WINDOW;
            loop {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(alert)) => batch.push(alert),
                    _ => break,
                }
            }

            let since_last = last_sent.elapsed();
            if since_last < MIN_DM_INTERVAL {
                tokio::time::sleep(MIN_DM_INTERVAL - since_last).await;
            }

            let body = if batch.len() == 1 {
                format!("⚠️ {}", batch[0])
            } else {
                let lines: Vec<String> =
                    batch.iter().map(|a| format!("• {a}")).collect();
                format!("⚠️ **{} alerts**\n{}", batch.len(), lines.join("\n"))
            };

            match safe_dm(&http, &rl, admin, &body).await {
                Ok(_) => {
                    info!(alerts = batch.len(), "admin alert DM sent");
                    last_sent = tokio::time::Instant::now();
                }
                Err(e) => warn!(error = %e, "admin alert DM failed"),
            }
        }
    });

    tx
}
