use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, UserId};

use crate::error::DiscordError;
use crate::rate_limit::RateLimiter;

/// Summary posts cap below Discord's 2000-char limit to leave headroom for
/// formatting added downstream.
pub const CHUNK_MAX: usize = 1900;

/// Split `text` into chunks of at most [`CHUNK_MAX`] characters, breaking
/// only on line boundaries. A single over-long line is hard-split on a
/// char boundary as a last resort.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.chars().count() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > CHUNK_MAX {
            if !current.is_empty() {
                chunks.push(current.trim_end().to_string());
                current = String::new();
                current_len = 0;
            }
            let mut piece = String::new();
            let mut piece_len = 0usize;
            for ch in line.chars() {
                if piece_len == CHUNK_MAX {
                    chunks.push(piece);
                    piece = String::new();
                    piece_len = 0;
                }
                piece.push(ch);
                piece_len += 1;
            }
            if !piece.is_empty() {
                current = piece;
                current_len = piece_len;
            }
            continue;
        }

        if current_len + line_len + 1 > CHUNK_MAX && !current.is_empty() {
            chunks.push(current.trim_end().to_string());
            current = String::new();
            current_len = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len + 1;
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }

    chunks
}

/// Send one message through the rate limiter.
pub async fn safe_send(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    content: &str,
) -> Result<Message, DiscordError> {
    let key = format!("send:{channel}");
    rl.execute(&key, || {
        let content = content.to_string();
        async move { channel.say(http, content).await }
    })
    .await
    .map_err(DiscordError::Api)
}

/// Send `text` as ≤[`CHUNK_MAX`]-char messages. Returns the first message
/// sent (callers anchor threads and backlinks on it).
pub async fn send_chunked(
    http: &Http,
    rl: &RateLimiter,
    channel: ChannelId,
    text: &str,
) -> Result<Option<Message>, DiscordError> {
    let mut first = None;
    for chunk in split_chunks(text) {
        let msg = safe_send(http, rl, channel, &chunk).await?;
        if first.is_none() {
            first = Some(msg);
        }
    }
    Ok(first)
}

/// DM a user through the rate limiter, creating the DM channel on demand.
pub async fn safe_dm(
    http: &Http,
    rl: &RateLimiter,
    user: UserId,
    content: &str,
) -> Result<Message, DiscordError> {
    let dm = rl
        .execute(&format!("dm-open:{user}"), || async move {
            user.create_dm_channel(http).await
        })
        .await
        .map_err(DiscordError::Api)?;
    safe_send(http, rl, dm.id, content).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split_chunks("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!"]);
    }

    #[test]
    fn splits_on_line_boundaries() {
        let line = "a".repeat(1000);
        let text = format!("{line}\n{line}\n{line}");
        let chunks = split_chunks(&text);
        assert_eq!(chunks.len(), 2);
        for c in &chunks {
            assert!(c.chars().count() <= CHUNK_MAX, "chunk too large: {}", c.len());
            // No line was cut in half.
            assert!(c.split('\n').all(|l| l.chars().count() == 1000));
        }
    }

    #[test]
    fn very_long_line_still_splits() {
        let text = "x".repeat(4000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.chars().count() <= CHUNK_MAX);
        }
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "📨".repeat(2500);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.chars().count() <= CHUNK_MAX);
        }
    }
}
