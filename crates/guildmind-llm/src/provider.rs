use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// A single message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Content,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message content: plain text or multimodal blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Base64-encoded image bytes.
    Image { media_type: String, data: String },
    /// Image by URL, for providers that fetch themselves.
    ImageUrl { url: String },
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Tools to expose to the LLM. Empty by default.
    pub tools: Vec<ToolDefinition>,
    /// Raw JSON messages for the tool loop (overrides `messages` when set)
    /// so tool_use / tool_result blocks round-trip untouched.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

impl ChatRequest {
    pub fn new(model: &str, system: &str, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.to_string(),
            system: system.to_string(),
            messages,
            max_tokens: 4096,
            temperature: None,
            tools: Vec::new(),
            raw_messages: None,
        }
    }
}

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub stop_reason: String,
    /// Tool calls requested by the LLM. Empty when no tools are called.
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for all providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for routing and log lines.
    fn name(&self) -> &str;

    /// Send a chat request, wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// 4xx-class request error — retrying cannot help.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("empty response from provider")]
    Empty,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Http(_)
                | ProviderError::Api { status: 500..=599, .. }
                | ProviderError::RateLimited { .. }
                | ProviderError::Empty
        )
    }
}

const MAX_ATTEMPTS: usize = 3;
const RETRY_BASE_SECS: u64 = 5;

/// Shared retry ladder for provider clients: up to 3 attempts with 5s·2ⁿ
/// backoff on retryable failures; bad requests re-raise immediately.
pub(crate) async fn send_with_retries<F, Fut>(
    provider: &str,
    mut attempt_fn: F,
) -> Result<ChatResponse, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ChatResponse, ProviderError>>,
{
    let mut last_err: Option<ProviderError> = None;

    for attempt in 0..MAX_ATTEMPTS {
        match attempt_fn().await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_retryable() => {
                let wait = match &e {
                    ProviderError::RateLimited { retry_after_ms } => {
                        Duration::from_millis(*retry_after_ms)
                    }
                    _ => Duration::from_secs(RETRY_BASE_SECS * (1 << attempt)),
                };
                warn!(provider, attempt = attempt + 1, error = %e, "LLM call failed, retrying");
                last_err = Some(e);
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(wait).await;
                }
            }
            Err(e) => {
                error!(provider, error = %e, "LLM call failed (non-retryable)");
                return Err(e);
            }
        }
    }

    Err(last_err.unwrap_or(ProviderError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_response() -> ChatResponse {
        ChatResponse {
            content: "ok".into(),
            model: "m".into(),
            stop_reason: "end_turn".into(),
            tool_calls: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_server_errors_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let out = send_with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::Api {
                        status: 503,
                        message: "overloaded".into(),
                    })
                } else {
                    Ok(ok_response())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out.content, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bad_request_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let out = send_with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::BadRequest("bad schema".into())) }
        })
        .await;
        assert!(matches!(out, Err(ProviderError::BadRequest(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::RateLimited { retry_after_ms: 1 }.is_retryable());
        assert!(ProviderError::Api { status: 500, message: String::new() }.is_retryable());
        assert!(!ProviderError::Api { status: 400, message: String::new() }.is_retryable());
        assert!(!ProviderError::BadRequest(String::new()).is_retryable());
    }
}
