use serenity::builder::GetMessages;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId};

use crate::error::DiscordError;
use crate::rate_limit::RateLimiter;

/// One REST history page, oldest→newest, at most 100 messages strictly
/// after `after` (or from the channel start when `None`).
pub async fn history_page(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    after: Option<MessageId>,
    limit: u8,
) -> Result<Vec<Message>, DiscordError> {
    let key = format!("history:{channel}");
    let mut page = rl
        .execute(&key, || {
            let mut builder = GetMessages::new().limit(limit);
            if let Some(after_id) = after {
                builder = builder.after(after_id);
            }
            async move { channel.messages(http, builder).await }
        })
        .await
        .map_err(DiscordError::Api)?;

    // Discord returns newest-first; backfill wants chronological order.
    page.sort_by_key(|m| m.id);
    Ok(page)
}

pub async fn fetch_message(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    message: MessageId,
) -> Result<Message, DiscordError> {
    let key = format!("fetch:{channel}");
    rl.execute(&key, || async move {
        http.get_message(channel, message).await
    })
    .await
    .map_err(DiscordError::Api)
}

pub async fn delete_message(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    message: MessageId,
) -> Result<(), DiscordError> {
    let key = format!("delete:{channel}");
    rl.execute(&key, || async move {
        http.delete_message(channel, message, None).await
    })
    .await
    .map_err(DiscordError::Api)
}
