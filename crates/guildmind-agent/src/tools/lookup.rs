use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use guildmind_store::records;

use super::{str_arg, u64_arg, usize_arg, Tool, ToolResult};
use crate::context::AgentContext;

/// A message with its replies and chronological neighbours.
pub struct GetMessageContextTool {
    ctx: Arc<AgentContext>,
}

impl GetMessageContextTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetMessageContextTool {
    fn name(&self) -> &str {
        "get_message_context"
    }

    fn description(&self) -> &str {
        "Get a message with its direct replies and surrounding messages."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": { "type": "string" },
                "surrounding": { "type": "integer", "default": 5 }
            },
            "required": ["message_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let Some(message_id) = u64_arg(&input, "message_id") else {
            return ToolResult::error("message_id is required");
        };
        let surrounding = usize_arg(&input, "surrounding", 5);

        let msg = match records::get_message(&self.ctx.store, message_id).await {
            Ok(Some(m)) => m,
            Ok(None) => return ToolResult::error(format!("message {message_id} not found")),
            Err(e) => return ToolResult::error(format!("lookup failed: {e}")),
        };

        let (before, after, replies) =
            match records::message_context(&self.ctx.store, &msg, surrounding).await {
                Ok(ctx) => ctx,
                Err(e) => return ToolResult::error(format!("context query failed: {e}")),
            };

        let render = |m: &guildmind_core::types::Message| {
            let content: String = m.content.chars().take(150).collect();
            format!("[{}] {}", m.message_id, content)
        };
        ToolResult::json(&json!({
            "success": true,
            "message": render(&msg),
            "jump_url": msg.jump_url,
            "attachments": msg.attachments.iter().map(|a| a.url.clone()).collect::<Vec<_>>(),
            "before": before.iter().map(render).collect::<Vec<_>>(),
            "after": after.iter().map(render).collect::<Vec<_>>(),
            "replies": replies.iter().map(render).collect::<Vec<_>>(),
        }))
    }
}

/// Member lookup including sharing/DM preferences.
pub struct GetMemberInfoTool {
    ctx: Arc<AgentContext>,
}

impl GetMemberInfoTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetMemberInfoTool {
    fn name(&self) -> &str {
        "get_member_info"
    }

    fn description(&self) -> &str {
        "Look up a guild member by user_id or username, including stored preferences."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": { "type": "string" },
                "username": { "type": "string" }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let member = if let Some(id) = u64_arg(&input, "user_id") {
            records::get_member(&self.ctx.store, id).await
        } else if let Some(name) = str_arg(&input, "username") {
            records::find_member_by_username(&self.ctx.store, name).await
        } else {
            return ToolResult::error("user_id or username is required");
        };

        match member {
            Ok(Some(m)) => ToolResult::json(&json!({
                "success": true,
                "member_id": m.member_id.to_string(),
                "username": m.username,
                "display_name": m.display_name(),
                "sharing_consent": m.sharing_consent,
                "dm_preference": m.dm_preference,
                "permission_to_curate": m.permission_to_curate,
                "twitter_handle": m.twitter_handle,
                "guild_join_date": m.guild_join_date.map(|d| d.to_rfc3339()),
            })),
            Ok(None) => ToolResult::error("member not found"),
            Err(e) => ToolResult::error(format!("lookup failed: {e}")),
        }
    }
}
