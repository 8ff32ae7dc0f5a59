use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::provider::{
    send_with_retries, ChatRequest, ChatResponse, Content, ContentBlock, LlmProvider,
    ProviderError, Role,
};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
        }
    }

    async fn attempt(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, req.model, self.api_key
        );

        debug!(model = %req.model, "sending request to Gemini");

        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Gemini API error");
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

        let candidate = api_resp
            .candidates
            .into_iter()
            .next()
            .ok_or(ProviderError::Empty)?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ProviderError::Empty);
        }

        Ok(ChatResponse {
            content: text,
            model: req.model.clone(),
            stop_reason: candidate.finish_reason.unwrap_or_default(),
            tool_calls: Vec::new(),
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        send_with_retries(self.name(), || self.attempt(req)).await
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            serde_json::json!({
                "role": role,
                "parts": render_parts(&m.content),
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "maxOutputTokens": req.max_tokens },
    });
    if let Some(t) = req.temperature {
        body["generationConfig"]["temperature"] = serde_json::json!(t);
    }
    if !req.system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": req.system }],
        });
    }
    body
}

fn render_parts(content: &Content) -> Vec<serde_json::Value> {
    match content {
        Content::Text(t) => vec![serde_json::json!({ "text": t })],
        Content::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => serde_json::json!({ "text": text }),
                ContentBlock::Image { media_type, data } => serde_json::json!({
                    "inline_data": { "mime_type": media_type, "data": data },
                }),
                // Gemini has no fetch-by-URL part; pass the link as text.
                ContentBlock::ImageUrl { url } => serde_json::json!({ "text": url }),
            })
            .collect(),
    }
}

// Gemini API response types (private)

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    #[test]
    fn assistant_turns_map_to_model_role() {
        let req = ChatRequest::new(
            "gemini-2.0-flash",
            "sys",
            vec![ChatMessage::user("a"), ChatMessage::assistant("b")],
        );
        let body = build_request_body(&req);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
    }
}
