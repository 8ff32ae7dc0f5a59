use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{u64_arg, Tool, ToolResult};
use crate::context::AgentContext;

/// Uptime, gateway health and latency.
pub struct GetBotStatusTool {
    ctx: Arc<AgentContext>,
}

impl GetBotStatusTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetBotStatusTool {
    fn name(&self) -> &str {
        "get_bot_status"
    }

    fn description(&self) -> &str {
        "Check bot health: uptime, gateway session state and latency."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        let status = self.ctx.monitor.status();
        ToolResult::json(&json!({
            "success": true,
            "ready": status.ready,
            "healthy": status.healthy,
            "uptime_secs": status.uptime_secs,
            "latency_ms": status.latency_ms,
            "session_id": status.session_id,
            "resumed_count": status.resumed_count,
            "guild_count": 1,
        }))
    }
}

/// Fresh CDN URLs for a message's attachments (stored ones expire).
pub struct RefreshMediaTool {
    ctx: Arc<AgentContext>,
}

impl RefreshMediaTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for RefreshMediaTool {
    fn name(&self) -> &str {
        "refresh_media"
    }

    fn description(&self) -> &str {
        "Get fresh, working URLs for a message's attachments (Discord CDN URLs expire)."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message_id": { "type": "string" }
            },
            "required": ["message_id"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let Some(message_id) = u64_arg(&input, "message_id") else {
            return ToolResult::error("message_id is required");
        };
        match guildmind_indexer::refresh::refresh_message_urls(
            &self.ctx.store,
            &self.ctx.http,
            &self.ctx.rl,
            message_id,
        )
        .await
        {
            Ok(urls) => ToolResult::json(&json!({"success": true, "urls": urls})),
            Err(e) => ToolResult::error(format!("refresh failed: {e}")),
        }
    }
}
