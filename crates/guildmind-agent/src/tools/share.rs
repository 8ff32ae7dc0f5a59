use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use guildmind_store::records;

use super::{str_arg, u64_arg, Tool, ToolResult};
use crate::context::AgentContext;

/// Share a message to the external platforms via the pre-approved publish
/// path. Moderation still runs; admin initiation is not a bypass.
pub struct ShareToSocialTool {
    ctx: Arc<AgentContext>,
}

impl ShareToSocialTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    async fn resolve(&self, input: &serde_json::Value) -> Result<(u64, u64), String> {
        if let Some(link) = str_arg(input, "message_link") {
            if let Some((channel_id, message_id)) = parse_message_link(link) {
                return Ok((channel_id, message_id));
            }
            return Err(format!("could not parse message link: {link}"));
        }
        let message_id =
            u64_arg(input, "message_id").ok_or("message_id or message_link required")?;
        let stored = records::get_message(&self.ctx.store, message_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("message {message_id} not found in the index"))?;
        Ok((stored.channel_id, message_id))
    }
}

#[async_trait]
impl Tool for ShareToSocialTool {
    fn name(&self) -> &str {
        "share_to_social"
    }

    fn description(&self) -> &str {
        "Share a message with media to the community's social platforms. Requires a message_id or message_link of a message with attachments."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": { "type": "string", "description": "Discord message id" },
                "message_link": { "type": "string", "description": "Full discord.com/channels/... link" }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let (channel_id, message_id) = match self.resolve(&input).await {
            Ok(pair) => pair,
            Err(e) => return ToolResult::error(e),
        };
        match self.ctx.share.admin_share(channel_id, message_id).await {
            Ok(summary) => ToolResult::json(&json!({"success": true, "summary": summary})),
            Err(e) => ToolResult::error(format!("share failed: {e}")),
        }
    }
}

/// `https://discord.com/channels/{guild}/{channel}/{message}` → ids.
pub fn parse_message_link(link: &str) -> Option<(u64, u64)> {
    let re = Regex::new(r"channels/\d+/(\d+)/(\d+)").ok()?;
    let caps = re.captures(link)?;
    let channel = caps.get(1)?.as_str().parse().ok()?;
    let message = caps.get(2)?.as_str().parse().ok()?;
    Some((channel, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_jump_links() {
        assert_eq!(
            parse_message_link("https://discord.com/channels/1/22/333"),
            Some((22, 333))
        );
        assert_eq!(parse_message_link("not a link"), None);
    }
}
