use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{
    send_with_retries, ChatRequest, ChatResponse, Content, ContentBlock, LlmProvider,
    ProviderError, ToolCall,
};

const API_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        }
    }

    async fn attempt(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %req.model, "sending request to Claude");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Claude API error");
            if (400..500).contains(&status) {
                return Err(ProviderError::BadRequest(text));
            }
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let parsed = parse_response(api_resp);
        if parsed.content.is_empty() && parsed.tool_calls.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &str {
        "claude"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        send_with_retries(self.name(), || self.attempt(req)).await
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    // The tool loop supplies raw message JSON; everything else goes through
    // the structured content rendering.
    let messages: Vec<serde_json::Value> = if let Some(ref raw) = req.raw_messages {
        raw.clone()
    } else {
        req.messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": render_content(&m.content),
                })
            })
            .collect()
    };

    let mut body = serde_json::json!({
        "model": req.model,
        "max_tokens": req.max_tokens,
        "system": req.system,
        "messages": messages,
    });

    if let Some(t) = req.temperature {
        body["temperature"] = serde_json::json!(t);
    }

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

fn render_content(content: &Content) -> serde_json::Value {
    match content {
        Content::Text(t) => serde_json::json!(t),
        Content::Blocks(blocks) => serde_json::Value::Array(
            blocks
                .iter()
                .map(|b| match b {
                    ContentBlock::Text { text } => serde_json::json!({
                        "type": "text",
                        "text": text,
                    }),
                    ContentBlock::Image { media_type, data } => serde_json::json!({
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": media_type,
                            "data": data,
                        },
                    }),
                    ContentBlock::ImageUrl { url } => serde_json::json!({
                        "type": "image",
                        "source": { "type": "url", "url": url },
                    }),
                })
                .collect(),
        ),
    }
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in resp.content {
        match block {
            ApiBlock::Text { text } => text_parts.push(text),
            ApiBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall { id, name, input });
            }
            ApiBlock::Unknown => {}
        }
    }

    ChatResponse {
        content: text_parts.join(""),
        model: resp.model,
        stop_reason: resp.stop_reason.unwrap_or_default(),
        tool_calls,
    }
}

// Claude API response types (private — only used for deserialization)

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    content: Vec<ApiBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ApiBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn body_includes_tools_when_present() {
        let mut req = ChatRequest::new("claude-3-5-sonnet-latest", "sys", vec![
            ChatMessage::user("hi"),
        ]);
        req.tools.push(crate::provider::ToolDefinition {
            name: "reply".into(),
            description: "reply".into(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let body = build_request_body(&req);
        assert_eq!(body["tools"][0]["name"], "reply");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn multimodal_blocks_render_as_source_objects() {
        let req = ChatRequest::new(
            "claude-3-5-sonnet-latest",
            "sys",
            vec![ChatMessage {
                role: crate::provider::Role::User,
                content: Content::Blocks(vec![
                    ContentBlock::Text { text: "look".into() },
                    ContentBlock::Image {
                        media_type: "image/png".into(),
                        data: "AAAA".into(),
                    },
                ]),
            }],
        );
        let body = build_request_body(&req);
        assert_eq!(body["messages"][0]["content"][1]["type"], "image");
        assert_eq!(
            body["messages"][0]["content"][1]["source"]["media_type"],
            "image/png"
        );
    }
}
