use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::http::Http;
use serenity::model::id::ChannelId;
use tracing::info;

use guildmind_core::types::Channel;
use guildmind_discord::send::safe_send;
use guildmind_discord::{threads, RateLimiter};
use guildmind_store::{records, Store};

use crate::error::SummaryError;
use crate::mentions::replace_user_mentions;

pub const DEFAULT_MIN_REACTORS: usize = 3;
pub const DEFAULT_LIMIT: usize = 5;

/// Which channels feed the selector.
#[derive(Debug, Clone)]
pub enum ChannelFilter {
    /// One channel only.
    Single(u64),
    /// The monitor set (with category expansion), minus the art channel.
    Monitored {
        monitor_ids: Vec<u64>,
        exclude_art: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct TopContentParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub filter: ChannelFilter,
    pub min_unique_reactors: usize,
    pub limit: usize,
}

/// One ranked video post ready for display.
#[derive(Debug, Clone)]
pub struct TopGeneration {
    pub message_id: u64,
    pub channel_id: u64,
    pub channel_name: String,
    pub author_display: String,
    pub content: String,
    pub unique_reactors: usize,
    pub video_url: String,
    pub jump_url: String,
}

/// Rank media posts by unique reactors over the window: videos only,
/// nsfw-named channels excluded, threshold applied, reactor count then
/// recency as tiebreak.
pub async fn select_top(
    store: &Arc<Store>,
    params: &TopContentParams,
) -> Result<Vec<TopGeneration>, SummaryError> {
    let (channel_scope, exclude_art) = match &params.filter {
        ChannelFilter::Single(id) => (Some(vec![*id]), None),
        ChannelFilter::Monitored {
            monitor_ids,
            exclude_art,
        } => {
            let expanded = records::monitored_channels(store, monitor_ids).await?;
            (
                Some(expanded.iter().map(|c| c.channel_id).collect()),
                *exclude_art,
            )
        }
    };

    let mut candidates = records::media_messages_in_window(
        store,
        &params.start,
        &params.end,
        channel_scope.as_deref(),
    )
    .await?;

    if let Some(art) = exclude_art {
        candidates.retain(|m| m.channel_id != art);
    }
    candidates.retain(|m| m.first_video_url().is_some());
    candidates.retain(|m| m.unique_reactor_count() >= params.min_unique_reactors);

    // Channel names gate the nsfw exclusion and feed the display lines.
    let channel_ids: Vec<u64> = candidates.iter().map(|m| m.channel_id).collect();
    let channels = channels_by_ids(store, &channel_ids).await?;
    candidates.retain(|m| {
        channels
            .get(&m.channel_id)
            .map(|c| !c.is_nsfw_by_name())
            .unwrap_or(true)
    });

    candidates.sort_by(|a, b| {
        b.unique_reactor_count()
            .cmp(&a.unique_reactor_count())
            .then(b.created_at.cmp(&a.created_at))
    });
    candidates.truncate(params.limit);

    let author_ids: Vec<u64> = candidates.iter().map(|m| m.author_id).collect();
    let members = records::members_by_ids(store, &author_ids).await?;

    let mut out = Vec::with_capacity(candidates.len());
    for m in candidates {
        let video_url = match m.first_video_url() {
            Some(u) => u.to_string(),
            None => continue,
        };
        out.push(TopGeneration {
            message_id: m.message_id,
            channel_id: m.channel_id,
            channel_name: channels
                .get(&m.channel_id)
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            author_display: members
                .get(&m.author_id)
                .map(|mem| mem.display_name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            content: m.content.clone(),
            unique_reactors: m.unique_reactor_count(),
            video_url,
            jump_url: m.jump_url.clone(),
        });
    }
    Ok(out)
}

async fn channels_by_ids(
    store: &Arc<Store>,
    ids: &[u64],
) -> Result<HashMap<u64, Channel>, SummaryError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let unique: Vec<u64> = {
        let mut v = ids.to_vec();
        v.sort_unstable();
        v.dedup();
        v
    };
    let rows = store
        .table("channels")
        .r#in(
            "channel_id",
            unique.iter().map(|id| serde_json::json!(id)).collect(),
        )
        .fetch()
        .await
        .map_err(SummaryError::Store)?;
    let mut out = HashMap::new();
    for row in rows {
        if let Ok(c) = serde_json::from_value::<Channel>(row) {
            out.insert(c.channel_id, c);
        }
    }
    Ok(out)
}

fn entry_lines(
    rank: usize,
    generation: &TopGeneration,
    show_channel: bool,
    content: &str,
) -> String {
    let mut desc = vec![format!(
        "**{rank}.** By **{}**{}",
        generation.author_display,
        if show_channel {
            format!(" in #{}", generation.channel_name)
        } else {
            String::new()
        }
    )];
    if !content.trim().is_empty() {
        desc.push(content.chars().take(150).collect());
    }
    desc.push(format!("🔥 {} unique reactions", generation.unique_reactors));
    desc.push(generation.video_url.clone());
    desc.push(format!("🔗 Original post: {}", generation.jump_url));
    desc.join("\n")
}

/// Post a header with the top entry inline, then a thread for entries 2..N.
pub async fn post_top_generations(
    store: &Arc<Store>,
    http: &Http,
    rl: &RateLimiter,
    target: ChannelId,
    generations: &[TopGeneration],
    single_channel: bool,
    date: chrono::NaiveDate,
) -> Result<(), SummaryError> {
    let Some(first) = generations.first() else {
        info!("no qualifying videos, skipping top generations post");
        return Ok(());
    };

    let title = if generations.len() == 1 {
        "Top Generation".to_string()
    } else {
        format!("Top {} Generations", generations.len())
    };
    let scope = if single_channel {
        format!(" in #{}", first.channel_name)
    } else {
        String::new()
    };

    let content = replace_user_mentions(store, &first.content).await;
    let header_text = format!(
        "## {title}{scope}\n{}",
        entry_lines(1, first, !single_channel, &content)
    );
    let header = safe_send(http, rl, target, &header_text).await?;

    if generations.len() > 1 {
        let thread = threads::create_thread_from_message(
            http,
            rl,
            target,
            header.id,
            &format!("Top Generations - {}", date.format("%Y-%m-%d")),
        )
        .await?;

        for (i, generation) in generations.iter().enumerate().skip(1) {
            let content = replace_user_mentions(store, &generation.content).await;
            let text = entry_lines(i + 1, generation, !single_channel, &content);
            safe_send(http, rl, thread, &text).await?;
        }
    }

    info!(count = generations.len(), "top generations posted");
    Ok(())
}

/// Variant for the per-channel summary thread: all entries inline under a
/// header line, no child thread.
pub async fn post_top_generations_in_thread(
    store: &Arc<Store>,
    http: &Http,
    rl: &RateLimiter,
    thread: ChannelId,
    generations: &[TopGeneration],
) -> Result<(), SummaryError> {
    if generations.is_empty() {
        return Ok(());
    }
    safe_send(http, rl, thread, "\n## Top Generations\n").await?;
    for (i, generation) in generations.iter().enumerate() {
        let content = replace_user_mentions(store, &generation.content).await;
        let text = entry_lines(i + 1, generation, false, &content);
        safe_send(http, rl, thread, &text).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use guildmind_core::types::{jump_url, Attachment, Message};
    use std::collections::BTreeSet;

    fn video_message(
        id: u64,
        channel: u64,
        reactors: &[u64],
        ts: DateTime<Utc>,
        filename: &str,
    ) -> Message {
        Message {
            message_id: id,
            channel_id: channel,
            author_id: 3,
            content: "gen".into(),
            created_at: ts,
            edited_at: None,
            attachments: vec![Attachment {
                id: 1,
                filename: filename.into(),
                content_type: None,
                url: format!("https://cdn/{filename}"),
                size: 10,
                width: None,
                height: None,
            }],
            embeds: vec![],
            reaction_count: reactors.len() as u32,
            reactors: reactors.iter().copied().collect::<BTreeSet<_>>(),
            reference_id: None,
            thread_id: None,
            is_pinned: false,
            is_deleted: false,
            jump_url: jump_url(1, channel, id),
            indexed_at: ts,
        }
    }

    #[tokio::test]
    async fn selection_filters_and_ranks() {
        let store = Arc::new(Store::in_memory().await.unwrap());
        let t0 = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 3, 10, 13, 0, 0).unwrap();

        for chan in [10u64, 20, 30] {
            records::upsert_channel_identity(
                &store,
                &Channel {
                    channel_id: chan,
                    name: if chan == 20 {
                        "gen-nsfw".into()
                    } else {
                        format!("chan-{chan}")
                    },
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let msgs = vec![
            video_message(1, 10, &[1, 2, 3], t0, "a.mp4"),
            // Higher count but nsfw-named channel: excluded.
            video_message(2, 20, &[1, 2, 3, 4, 5], t0, "b.mp4"),
            // Below threshold.
            video_message(3, 10, &[1, 2], t0, "c.mov"),
            // Same count as #1 but newer: wins the tiebreak.
            video_message(4, 30, &[1, 2, 3], t1, "d.webm"),
            // Not a video.
            video_message(5, 10, &[1, 2, 3, 4], t0, "e.png"),
        ];
        records::upsert_messages(&store, &msgs).await.unwrap();

        let params = TopContentParams {
            start: Utc.with_ymd_and_hms(2025, 3, 10, 7, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 3, 11, 7, 0, 0).unwrap(),
            filter: ChannelFilter::Monitored {
                monitor_ids: vec![10, 20, 30],
                exclude_art: None,
            },
            min_unique_reactors: 3,
            limit: 5,
        };
        let top = select_top(&store, &params).await.unwrap();
        let ids: Vec<u64> = top.iter().map(|g| g.message_id).collect();
        assert_eq!(ids, vec![4, 1]);
        assert_eq!(top[0].unique_reactors, 3);
        assert!(top[0].video_url.ends_with("d.webm"));
    }

    #[test]
    fn entry_lines_format() {
        let generation = TopGeneration {
            message_id: 1,
            channel_id: 2,
            channel_name: "gen-chat".into(),
            author_display: "alice".into(),
            content: String::new(),
            unique_reactors: 4,
            video_url: "https://cdn/a.mp4".into(),
            jump_url: "https://discord.com/channels/1/2/1".into(),
        };
        let text = entry_lines(1, &generation, true, "");
        assert!(text.starts_with("**1.** By **alice** in #gen-chat"));
        assert!(text.contains("🔥 4 unique reactions"));
        assert!(text.contains("🔗 Original post: https://discord.com/channels/1/2/1"));
    }
}
