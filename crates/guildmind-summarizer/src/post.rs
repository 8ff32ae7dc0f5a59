use chrono::NaiveDate;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::ChannelId;

use guildmind_core::types::jump_url;
use guildmind_discord::send::send_chunked;
use guildmind_discord::{DiscordError, RateLimiter};

use crate::parse::{split_file_urls, NewsItem};

/// Bold date headline opening each day's block in the summary thread.
pub fn date_headline(date: NaiveDate) -> String {
    format!("**Daily Summary - {}**", date.format("%A, %B %-d, %Y"))
}

/// Render news items into the ordered outgoing message list: per item a
/// `## title` header with the main text and jump link, then each media URL
/// as its own message, then subtopics with their files. Every message stays
/// within the Discord cap; splitting happens only on these item/subtopic
/// boundaries (plus line-boundary chunking for over-long main texts).
pub fn format_news_messages(guild_id: u64, items: &[NewsItem]) -> Vec<String> {
    let mut out = Vec::new();

    for item in items {
        let link = item_jump_url(guild_id, &item.message_id, &item.channel_id);
        let mut main = format!("## {}\n", item.title);
        match link {
            Some(url) => main.push_str(&format!("{} {url}", item.main_text)),
            None => main.push_str(&item.main_text),
        }
        out.push(main);

        if let Some(ref files) = item.main_file {
            for url in split_file_urls(files) {
                out.push(url);
            }
        }

        for sub in &item.sub_topics {
            let sub_link = match (&sub.message_id, &sub.channel_id) {
                (Some(m), Some(c)) => item_jump_url(guild_id, m, c),
                _ => None,
            };
            match sub_link {
                Some(url) => out.push(format!("• {} {url}", sub.text)),
                None => out.push(format!("• {}", sub.text)),
            }
            if let Some(ref files) = sub.file {
                for url in split_file_urls(files) {
                    out.push(url);
                }
            }
        }
    }

    out
}

fn item_jump_url(guild_id: u64, message_id: &str, channel_id: &str) -> Option<String> {
    let m: u64 = message_id.trim().parse().ok()?;
    let c: u64 = channel_id.trim().parse().ok()?;
    Some(jump_url(guild_id, c, m))
}

/// Post the date headline and item messages, in order, into a thread.
pub async fn post_news_block(
    http: &Http,
    rl: &RateLimiter,
    target: ChannelId,
    date: NaiveDate,
    guild_id: u64,
    items: &[NewsItem],
) -> Result<(), DiscordError> {
    send_chunked(http, rl, target, &date_headline(date)).await?;
    for message in format_news_messages(guild_id, items) {
        send_chunked(http, rl, target, &message).await?;
    }
    Ok(())
}

/// Post the short digest to the channel itself, with a jump link to the
/// thread holding the full block.
pub async fn post_short_summary(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    guild_id: u64,
    thread_id: u64,
    short_text: &str,
) -> Result<Option<Message>, DiscordError> {
    let link = format!("https://discord.com/channels/{guild_id}/{thread_id}");
    let body = format!("{short_text}\n\nFull summary: {link}");
    send_chunked(http, rl, channel, &body).await
}

/// Aggregate post: date header, top cross-channel items, then a link back
/// to the header message so long scrollback stays navigable.
pub async fn post_aggregate(
    http: &Http,
    rl: &RateLimiter,
    summary_channel: ChannelId,
    date: NaiveDate,
    guild_id: u64,
    items: &[NewsItem],
) -> Result<(), DiscordError> {
    let header = send_chunked(http, rl, summary_channel, &date_headline(date)).await?;

    for message in format_news_messages(guild_id, items) {
        send_chunked(http, rl, summary_channel, &message).await?;
    }

    if let Some(header) = header {
        let back = jump_url(guild_id, summary_channel.get(), header.id.get());
        send_chunked(
            http,
            rl,
            summary_channel,
            &format!("Jump to the top of today's summary: {back}"),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::SubTopic;

    fn item() -> NewsItem {
        NewsItem {
            title: "New ControlNet".into(),
            main_text: "big news:".into(),
            main_file: Some("u1,u2".into()),
            message_id: "1".into(),
            channel_id: "77".into(),
            sub_topics: vec![SubTopic {
                text: "follow-up".into(),
                file: Some("u3".into()),
                message_id: Some("2".into()),
                channel_id: Some("77".into()),
            }],
        }
    }

    #[test]
    fn messages_follow_item_order() {
        let msgs = format_news_messages(9, &[item()]);
        assert_eq!(msgs.len(), 5);
        assert!(msgs[0].starts_with("## New ControlNet\n"));
        assert!(msgs[0].contains("https://discord.com/channels/9/77/1"));
        assert_eq!(msgs[1], "u1");
        assert_eq!(msgs[2], "u2");
        assert!(msgs[3].starts_with("• follow-up"));
        assert!(msgs[3].contains("https://discord.com/channels/9/77/2"));
        assert_eq!(msgs[4], "u3");
    }

    #[test]
    fn unparseable_ids_drop_the_link_not_the_item() {
        let mut i = item();
        i.message_id = "not-a-number".into();
        let msgs = format_news_messages(9, &[i]);
        assert!(msgs[0].starts_with("## New ControlNet"));
        assert!(!msgs[0].contains("discord.com/channels"));
    }

    #[test]
    fn headline_format() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert_eq!(date_headline(d), "**Daily Summary - Tuesday, March 11, 2025**");
    }
}
