use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use guildmind_core::config::LlmSettings;

use crate::claude::ClaudeProvider;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{ChatMessage, ChatRequest, ChatResponse, LlmProvider, ProviderError};

#[derive(Debug, Clone, Copy)]
pub struct GenOpts {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for GenOpts {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: None,
        }
    }
}

impl GenOpts {
    pub fn max_tokens(n: u32) -> Self {
        Self {
            max_tokens: n,
            temperature: None,
        }
    }
}

/// Routes chat requests to the configured provider clients.
pub struct Dispatcher {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl Dispatcher {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        if let Some(ref key) = settings.anthropic_api_key {
            providers.insert(
                "claude".to_string(),
                Arc::new(ClaudeProvider::new(key.clone(), None)),
            );
        }
        if let Some(ref key) = settings.openai_api_key {
            providers.insert(
                "openai".to_string(),
                Arc::new(OpenAiProvider::new(key.clone(), None)),
            );
        }
        if let Some(ref key) = settings.gemini_api_key {
            providers.insert(
                "gemini".to_string(),
                Arc::new(GeminiProvider::new(key.clone(), None)),
            );
        }

        info!(
            providers = ?providers.keys().collect::<Vec<_>>(),
            "LLM dispatcher initialised"
        );
        Self { providers }
    }

    /// Dispatcher over a single injected provider. Test seam, also handy
    /// for one-provider deployments.
    pub fn with_provider(name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        let mut providers = HashMap::new();
        providers.insert(name.to_string(), provider);
        Self { providers }
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn LlmProvider>, ProviderError> {
        self.providers
            .get(&name.to_lowercase())
            .ok_or_else(|| ProviderError::UnknownProvider(name.to_string()))
    }

    /// Full request passthrough — used by the agent loop for tool calling.
    pub async fn send(
        &self,
        provider: &str,
        req: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        self.provider(provider)?.send(req).await
    }

    /// The single simple entry point: text in, stripped text out.
    pub async fn generate(
        &self,
        provider: &str,
        model: &str,
        system: &str,
        messages: Vec<ChatMessage>,
        opts: GenOpts,
    ) -> Result<String, ProviderError> {
        let mut req = ChatRequest::new(model, system, messages);
        req.max_tokens = opts.max_tokens;
        req.temperature = opts.temperature;

        let resp = self.provider(provider)?.send(&req).await?;
        let text = resp.content.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: format!("  echo:{} ", req.model),
                model: req.model.clone(),
                stop_reason: "end_turn".into(),
                tool_calls: vec![],
            })
        }
    }

    #[tokio::test]
    async fn generate_strips_and_routes() {
        let d = Dispatcher::with_provider("echo", Arc::new(EchoProvider));
        let out = d
            .generate("echo", "m1", "sys", vec![ChatMessage::user("x")], GenOpts::default())
            .await
            .unwrap();
        assert_eq!(out, "echo:m1");
    }

    #[tokio::test]
    async fn unknown_provider_errors() {
        let d = Dispatcher::with_provider("echo", Arc::new(EchoProvider));
        let out = d
            .generate("claude", "m", "s", vec![ChatMessage::user("x")], GenOpts::default())
            .await;
        assert!(matches!(out, Err(ProviderError::UnknownProvider(_))));
    }
}
