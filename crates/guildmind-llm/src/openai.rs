use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{
    send_with_retries, ChatRequest, ChatResponse, Content, ContentBlock, LlmProvider,
    ProviderError, ToolCall,
};

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
        }
    }

    async fn attempt(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %req.model, "sending request to OpenAI");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI API error");
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

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::Empty)?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let input = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::Null);
                ToolCall {
                    id: tc.id,
                    name: tc.function.name,
                    input,
                }
            })
            .collect::<Vec<_>>();

        let content = choice.message.content.unwrap_or_default();
        if content.is_empty() && tool_calls.is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(ChatResponse {
            content,
            model: api_resp.model,
            stop_reason: choice.finish_reason.unwrap_or_default(),
            tool_calls,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        send_with_retries(self.name(), || self.attempt(req)).await
    }
}

/// Reasoning-class models reject `max_tokens` and want
/// `max_completion_tokens` instead.
fn wants_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") || m.starts_with("gpt-5")
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let mut messages: Vec<serde_json::Value> = Vec::new();
    if !req.system.is_empty() {
        messages.push(serde_json::json!({"role": "system", "content": req.system}));
    }

    if let Some(ref raw) = req.raw_messages {
        messages.extend(raw.clone());
    } else {
        for m in &req.messages {
            messages.push(serde_json::json!({
                "role": m.role,
                "content": render_content(&m.content),
            }));
        }
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
    });

    let token_key = if wants_completion_tokens(&req.model) {
        "max_completion_tokens"
    } else {
        "max_tokens"
    };
    body[token_key] = serde_json::json!(req.max_tokens);

    if let Some(t) = req.temperature {
        body["temperature"] = serde_json::json!(t);
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
                        "type": "image_url",
                        "image_url": { "url": format!("data:{media_type};base64,{data}") },
                    }),
                    ContentBlock::ImageUrl { url } => serde_json::json!({
                        "type": "image_url",
                        "image_url": { "url": url },
                    }),
                })
                .collect(),
        ),
    }
}

// OpenAI API response types (private)

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn reasoning_models_get_max_completion_tokens() {
        let req = ChatRequest::new("o3-mini", "sys", vec![ChatMessage::user("hi")]);
        let body = build_request_body(&req);
        assert!(body.get("max_completion_tokens").is_some());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn standard_models_get_max_tokens() {
        let req = ChatRequest::new("gpt-4o", "sys", vec![ChatMessage::user("hi")]);
        let body = build_request_body(&req);
        assert!(body.get("max_tokens").is_some());
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn system_prompt_becomes_leading_message() {
        let req = ChatRequest::new("gpt-4o", "be terse", vec![ChatMessage::user("hi")]);
        let body = build_request_body(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}
