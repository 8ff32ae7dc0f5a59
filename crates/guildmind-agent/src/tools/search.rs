use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::json;

use guildmind_core::types::Message;
use guildmind_store::records;

use super::{bool_arg, str_arg, u64_arg, usize_arg, Tool, ToolResult};
use crate::context::AgentContext;

fn summary_line(m: &Message) -> String {
    let content: String = m.content.chars().take(80).collect();
    let media = if m.attachments.is_empty() { "" } else { " 📎" };
    format!(
        "- [{}]{} {} ({} reactions) {}",
        m.message_id, media, content, m.reaction_count, m.jump_url
    )
}

/// Find popular messages by reactions inside a lookback window.
pub struct GetTopMessagesTool {
    ctx: Arc<AgentContext>,
}

impl GetTopMessagesTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetTopMessagesTool {
    fn name(&self) -> &str {
        "get_top_messages"
    }

    fn description(&self) -> &str {
        "Find popular messages by reaction count. Optional channel filter and media-only switch."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "channel_id": { "type": "string" },
                "days": { "type": "integer", "default": 7 },
                "min_reactions": { "type": "integer", "default": 3 },
                "limit": { "type": "integer", "default": 20 },
                "has_media": { "type": "boolean" }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let days = usize_arg(&input, "days", 7);
        let min_reactions = usize_arg(&input, "min_reactions", 3) as u32;
        let limit = usize_arg(&input, "limit", 20);
        let channel_id = u64_arg(&input, "channel_id");
        let has_media = bool_arg(&input, "has_media").unwrap_or(false);

        let start = Utc::now() - Duration::days(days as i64);
        let end = Utc::now();
        let scope = channel_id.map(|id| vec![id]);

        let result = if has_media {
            records::media_messages_in_window(&self.ctx.store, &start, &end, scope.as_deref()).await
        } else {
            match channel_id {
                Some(id) => records::messages_in_window(&self.ctx.store, id, &start, &end).await,
                None => {
                    records::media_messages_in_window(&self.ctx.store, &start, &end, None).await
                }
            }
        };

        let mut messages = match result {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("query failed: {e}")),
        };
        messages.retain(|m| m.reaction_count >= min_reactions);
        if has_media {
            messages.retain(|m| !m.attachments.is_empty());
        }
        messages.sort_by(|a, b| {
            b.reaction_count
                .cmp(&a.reaction_count)
                .then(b.created_at.cmp(&a.created_at))
        });
        messages.truncate(limit);

        let summary = if messages.is_empty() {
            "No matching messages found.".to_string()
        } else {
            messages.iter().map(summary_line).collect::<Vec<_>>().join("\n")
        };
        ToolResult::json(&json!({
            "success": true,
            "count": messages.len(),
            "summary": summary,
        }))
    }
}

/// ILIKE content search via the storage port.
pub struct SearchContentTool {
    ctx: Arc<AgentContext>,
}

impl SearchContentTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for SearchContentTool {
    fn name(&self) -> &str {
        "search_content"
    }

    fn description(&self) -> &str {
        "Search indexed messages by text content."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "days": { "type": "integer", "default": 7 },
                "limit": { "type": "integer", "default": 10 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let Some(query) = str_arg(&input, "query") else {
            return ToolResult::error("query is required");
        };
        let days = usize_arg(&input, "days", 7);
        let limit = usize_arg(&input, "limit", 10);
        let since = Utc::now() - Duration::days(days as i64);

        match records::search_messages(&self.ctx.store, query, &since, limit).await {
            Ok(messages) => {
                let summary = if messages.is_empty() {
                    format!("No messages matching '{query}'.")
                } else {
                    messages.iter().map(summary_line).collect::<Vec<_>>().join("\n")
                };
                ToolResult::json(&json!({
                    "success": true,
                    "count": messages.len(),
                    "summary": summary,
                }))
            }
            Err(e) => ToolResult::error(format!("search failed: {e}")),
        }
    }
}

/// Channels ranked by recent message volume.
pub struct GetActiveChannelsTool {
    ctx: Arc<AgentContext>,
}

impl GetActiveChannelsTool {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for GetActiveChannelsTool {
    fn name(&self) -> &str {
        "get_active_channels"
    }

    fn description(&self) -> &str {
        "List channels ranked by message volume over the lookback window."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "days": { "type": "integer", "default": 1 }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let days = usize_arg(&input, "days", 1);
        let since = Utc::now() - Duration::days(days as i64);

        let counts = match records::active_channel_counts(&self.ctx.store, &since).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("query failed: {e}")),
        };

        let mut lines = Vec::new();
        for (channel_id, count) in counts.iter().take(20) {
            let name = records::get_channel(&self.ctx.store, *channel_id)
                .await
                .ok()
                .flatten()
                .map(|c| c.name)
                .unwrap_or_else(|| channel_id.to_string());
            lines.push(format!("- #{name} [{channel_id}]: {count} messages"));
        }
        let summary = if lines.is_empty() {
            "No channel activity in the window.".to_string()
        } else {
            lines.join("\n")
        };
        ToolResult::json(&json!({"success": true, "summary": summary}))
    }
}
