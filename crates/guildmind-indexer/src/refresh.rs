use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::{debug, info};

use guildmind_discord::RateLimiter;
use guildmind_store::{records, Store};

use crate::adapter;
use crate::error::IndexError;

/// Refresh the stored attachment URLs for one message from the live API.
/// Filenames are stable; only the CDN tokens rotate. Returns the fresh
/// URL list; a second call with unchanged URLs is a no-op write-wise.
pub async fn refresh_message_urls(
    store: &Arc<Store>,
    http: &Http,
    rl: &RateLimiter,
    message_id: u64,
) -> Result<Vec<String>, IndexError> {
    let stored = records::get_message(store, message_id)
        .await?
        .ok_or(IndexError::MessageMissing(message_id))?;

    let live = guildmind_discord::fetch::fetch_message(
        http,
        rl,
        ChannelId::new(stored.channel_id),
        MessageId::new(message_id),
    )
    .await?;

    let fresh: Vec<_> = live.attachments.iter().map(adapter::attachment_from_discord).collect();
    let fresh_urls: Vec<String> = fresh.iter().map(|a| a.url.clone()).collect();

    let stored_urls: Vec<String> = stored.attachments.iter().map(|a| a.url.clone()).collect();
    if stored_urls == fresh_urls {
        debug!(message_id, "attachment URLs unchanged");
        return Ok(fresh_urls);
    }

    records::update_attachment_urls(store, message_id, &fresh).await?;
    info!(message_id, count = fresh_urls.len(), "attachment URLs refreshed");
    Ok(fresh_urls)
}

/// Batched form: refresh the top-reacted media posts inside a window.
/// Used monthly so high-traffic summaries keep working links.
pub async fn refresh_top_media(
    store: &Arc<Store>,
    http: &Http,
    rl: &RateLimiter,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_unique_reactors: usize,
    limit: usize,
) -> Result<u64, IndexError> {
    let mut candidates = records::media_messages_in_window(store, &start, &end, None).await?;
    candidates.retain(|m| m.unique_reactor_count() >= min_unique_reactors);
    candidates.sort_by(|a, b| {
        b.unique_reactor_count()
            .cmp(&a.unique_reactor_count())
            .then(b.created_at.cmp(&a.created_at))
    });
    candidates.truncate(limit);

    let mut refreshed = 0u64;
    for m in candidates {
        match refresh_message_urls(store, http, rl, m.message_id).await {
            Ok(_) => refreshed += 1,
            Err(IndexError::Discord(e)) => {
                debug!(message_id = m.message_id, error = %e, "refresh skipped");
            }
            Err(e) => return Err(e),
        }
    }
    info!(refreshed, "top media refresh pass complete");
    Ok(refreshed)
}
