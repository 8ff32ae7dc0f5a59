//! Tool system for the admin agent: the `Tool` trait, the fixed catalog,
//! and conversion to LLM API definitions.

pub mod lookup;
pub mod reply;
pub mod search;
pub mod share;
pub mod status;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use guildmind_llm::ToolDefinition;

use crate::context::AgentContext;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::success(value.to_string())
    }
}

/// Trait every agent tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
}

/// The full catalog wired to one context.
pub fn build_tools(ctx: Arc<AgentContext>) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(reply::ReplyTool),
        Box::new(reply::EndTurnTool),
        Box::new(share::ShareToSocialTool::new(Arc::clone(&ctx))),
        Box::new(search::GetTopMessagesTool::new(Arc::clone(&ctx))),
        Box::new(search::SearchContentTool::new(Arc::clone(&ctx))),
        Box::new(search::GetActiveChannelsTool::new(Arc::clone(&ctx))),
        Box::new(lookup::GetMessageContextTool::new(Arc::clone(&ctx))),
        Box::new(lookup::GetMemberInfoTool::new(Arc::clone(&ctx))),
        Box::new(status::GetBotStatusTool::new(Arc::clone(&ctx))),
        Box::new(status::RefreshMediaTool::new(ctx)),
    ]
}

/// Convert tools to API-level definitions.
pub fn to_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

// Input extraction helpers shared by the tool impls. The model sends ids
// as either numbers or strings; both are accepted.

pub(crate) fn u64_arg(input: &serde_json::Value, key: &str) -> Option<u64> {
    match input.get(key)? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn str_arg<'a>(input: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(|v| v.as_str())
}

pub(crate) fn usize_arg(input: &serde_json::Value, key: &str, default: usize) -> usize {
    input
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(default)
}

pub(crate) fn bool_arg(input: &serde_json::Value, key: &str) -> Option<bool> {
    input.get(key).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_args_accept_numbers_and_strings() {
        let input = json!({"a": 5, "b": "17", "c": true});
        assert_eq!(u64_arg(&input, "a"), Some(5));
        assert_eq!(u64_arg(&input, "b"), Some(17));
        assert_eq!(u64_arg(&input, "c"), None);
        assert_eq!(u64_arg(&input, "missing"), None);
    }

    #[test]
    fn usize_arg_defaults() {
        let input = json!({"limit": 3});
        assert_eq!(usize_arg(&input, "limit", 20), 3);
        assert_eq!(usize_arg(&input, "days", 7), 7);
    }
}
