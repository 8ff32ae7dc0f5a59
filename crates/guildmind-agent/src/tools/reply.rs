use async_trait::async_trait;
use serde_json::json;

use super::{Tool, ToolResult};

/// Queue one or more outgoing messages to the admin. The loop itself
/// captures the messages from the call input; this execute only validates.
pub struct ReplyTool;

#[async_trait]
impl Tool for ReplyTool {
    fn name(&self) -> &str {
        "reply"
    }

    fn description(&self) -> &str {
        "Send message(s) to the user. Use the \"messages\" array for multiple messages."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Single message to send" },
                "messages": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Multiple messages to send in order"
                }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let messages = extract_messages(&input);
        if messages.is_empty() {
            return ToolResult::error("reply called without message or messages");
        }
        ToolResult::json(&json!({"success": true, "queued": messages.len()}))
    }
}

/// End the turn without sending anything (silent actions).
pub struct EndTurnTool;

#[async_trait]
impl Tool for EndTurnTool {
    fn name(&self) -> &str {
        "end_turn"
    }

    fn description(&self) -> &str {
        "End the conversation turn without sending a message."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Why the turn ends silently" }
            }
        })
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolResult {
        ToolResult::json(&json!({"success": true}))
    }
}

/// Pull the outgoing messages out of a `reply` call's input.
pub fn extract_messages(input: &serde_json::Value) -> Vec<String> {
    if let Some(arr) = input.get("messages").and_then(|v| v.as_array()) {
        return arr
            .iter()
            .filter_map(|v| v.as_str())
            .map(String::from)
            .collect();
    }
    input
        .get("message")
        .and_then(|v| v.as_str())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_single_and_multiple() {
        assert_eq!(extract_messages(&json!({"message": "hi"})), vec!["hi"]);
        assert_eq!(
            extract_messages(&json!({"messages": ["a", "b"]})),
            vec!["a", "b"]
        );
        assert!(extract_messages(&json!({})).is_empty());
    }
}
