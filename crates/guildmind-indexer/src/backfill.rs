use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::info;

use guildmind_discord::RateLimiter;
use guildmind_store::{records, Store};

use crate::adapter;
use crate::error::IndexError;

const PAGE: u8 = 100;
const PROGRESS_EVERY: u64 = 1000;
const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub indexed: u64,
    pub resumed_from: Option<DateTime<Utc>>,
}

/// Snowflake lower bound for "messages created after `t`".
fn snowflake_floor(t: &DateTime<Utc>) -> u64 {
    let ms = t.timestamp_millis().max(0) as u64;
    ms.saturating_sub(DISCORD_EPOCH_MS) << 22
}

/// Page channel history oldest→newest through `[start, end)`, upserting in
/// page-sized groups. Restartable: resumes from the newest `created_at`
/// already stored in the range.
pub async fn backfill_channel(
    store: &Arc<Store>,
    http: &Http,
    rl: &RateLimiter,
    guild_id: u64,
    channel_id: u64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<BackfillReport, IndexError> {
    let mut report = BackfillReport::default();

    let resume_from = records::latest_message_time(store, channel_id, &start, &end).await?;
    let effective_start = resume_from.unwrap_or(start);
    report.resumed_from = resume_from;
    if resume_from.is_some() {
        info!(channel_id, from = %effective_start, "backfill resuming");
    }

    let channel = ChannelId::new(channel_id);
    let mut after = MessageId::new(snowflake_floor(&effective_start).max(1));
    let mut since_progress = 0u64;

    loop {
        let page =
            guildmind_discord::fetch::history_page(http, rl, channel, Some(after), PAGE).await?;
        if page.is_empty() {
            break;
        }
        after = page.last().map(|m| m.id).unwrap_or(after);

        let now = Utc::now();
        let batch: Vec<_> = page
            .iter()
            .map(|m| adapter::message_from_discord(m, guild_id, now))
            .filter(|m| m.created_at < end)
            .collect();

        let reached_end = batch.len() < page.len();

        for m in &page {
            records::upsert_member_identity(store, &adapter::member_from_user(&m.author)).await?;
        }
        records::upsert_messages(store, &batch).await?;

        report.indexed += batch.len() as u64;
        since_progress += batch.len() as u64;
        if since_progress >= PROGRESS_EVERY {
            info!(channel_id, indexed = report.indexed, "backfill progress");
            since_progress = 0;
        }

        if reached_end || page.len() < PAGE as usize {
            break;
        }
    }

    info!(channel_id, indexed = report.indexed, "backfill complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn snowflake_floor_matches_discord_epoch() {
        let epoch = Utc.timestamp_millis_opt(DISCORD_EPOCH_MS as i64).unwrap();
        assert_eq!(snowflake_floor(&epoch), 0);

        let later = Utc.timestamp_millis_opt(DISCORD_EPOCH_MS as i64 + 1000).unwrap();
        assert_eq!(snowflake_floor(&later), 1000 << 22);
    }

    #[test]
    fn pre_epoch_times_clamp_to_zero() {
        let old = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(snowflake_floor(&old), 0);
    }
}
