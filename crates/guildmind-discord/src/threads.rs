use chrono::NaiveDate;
use serenity::builder::CreateThread;
use serenity::http::Http;
use serenity::model::channel::ChannelType;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use tracing::info;

use crate::error::DiscordError;
use crate::rate_limit::RateLimiter;

/// Name of the per-channel monthly summary thread.
pub fn monthly_thread_name(channel_name: &str, date: NaiveDate) -> String {
    format!(
        "#{} - Monthly Summary - {}",
        channel_name,
        date.format("%B, %Y")
    )
}

/// Find this month's summary thread under `channel`, creating it when the
/// month rolls over.
pub async fn find_or_create_monthly_thread(
    http: &Http,
    rl: &RateLimiter,
    guild: GuildId,
    channel: ChannelId,
    channel_name: &str,
    date: NaiveDate,
) -> Result<ChannelId, DiscordError> {
    let name = monthly_thread_name(channel_name, date);

    let active = rl
        .execute(&format!("threads:{guild}"), || async move {
            http.get_guild_active_threads(guild).await
        })
        .await
        .map_err(DiscordError::Api)?;

    if let Some(existing) = active
        .threads
        .iter()
        .find(|t| t.parent_id == Some(channel) && t.name == name)
    {
        return Ok(existing.id);
    }

    let thread = rl
        .execute(&format!("thread-create:{channel}"), || {
            let builder = CreateThread::new(name.clone()).kind(ChannelType::PublicThread);
            async move { channel.create_thread(http, builder).await }
        })
        .await
        .map_err(DiscordError::Api)?;

    info!(thread_id = %thread.id, name = %thread.name, "created monthly summary thread");
    Ok(thread.id)
}

/// Thread hanging off a header message (top generations entries 2..N).
pub async fn create_thread_from_message(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    message: MessageId,
    name: &str,
) -> Result<ChannelId, DiscordError> {
    let thread = rl
        .execute(&format!("thread-create:{channel}"), || {
            let builder = CreateThread::new(name.to_string()).kind(ChannelType::PublicThread);
            async move {
                channel
                    .create_thread_from_message(http, message, builder)
                    .await
            }
        })
        .await
        .map_err(DiscordError::Api)?;
    Ok(thread.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_thread_name_format() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert_eq!(
            monthly_thread_name("c1", date),
            "#c1 - Monthly Summary - March, 2025"
        );
    }
}
