use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use guildmind_core::config::PublisherSettings;

#[derive(Debug, Clone, Default)]
pub struct PublishResult {
    pub ok: bool,
    pub url: Option<String>,
}

/// External platform publisher. Each platform is a separate, swappable
/// implementation behind this port.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn send(
        &self,
        text: &str,
        media_urls: &[String],
        message_id: &str,
        user_id: &str,
    ) -> PublishResult;
}

/// Webhook-style publisher: POSTs the content and media URLs to a relay
/// endpoint that owns the platform credentials.
pub struct HttpPublisher {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPublisher {
    pub fn new(name: &str, endpoint: String) -> Self {
        Self {
            name: name.to_string(),
            endpoint,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(
        &self,
        text: &str,
        media_urls: &[String],
        message_id: &str,
        user_id: &str,
    ) -> PublishResult {
        let body = serde_json::json!({
            "content": text,
            "media_urls": media_urls,
            "message_id": message_id,
            "user_id": user_id,
        });

        let resp = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(publisher = %self.name, error = %e, "publish request failed");
                return PublishResult::default();
            }
        };

        if !resp.status().is_success() {
            warn!(publisher = %self.name, status = %resp.status(), "publish rejected");
            return PublishResult::default();
        }

        let parsed: RelayResponse = match resp.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(publisher = %self.name, error = %e, "publish response unreadable");
                return PublishResult::default();
            }
        };

        if parsed.success {
            info!(publisher = %self.name, url = ?parsed.url, "publish succeeded");
        }
        PublishResult {
            ok: parsed.success,
            url: parsed.url,
        }
    }
}

#[derive(Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    url: Option<String>,
}

/// Build the configured publisher set. Order matters only for DM wording;
/// each publisher succeeds or fails independently.
pub fn publishers_from_settings(settings: &PublisherSettings) -> Vec<Arc<dyn Publisher>> {
    let mut out: Vec<Arc<dyn Publisher>> = Vec::new();
    if let Some(ref url) = settings.x_url {
        out.push(Arc::new(HttpPublisher::new("x", url.clone())));
    }
    if let Some(ref url) = settings.instagram_url {
        out.push(Arc::new(HttpPublisher::new("instagram", url.clone())));
    }
    if let Some(ref url) = settings.tiktok_url {
        out.push(Arc::new(HttpPublisher::new("tiktok", url.clone())));
    }
    if let Some(ref url) = settings.youtube_url {
        out.push(Arc::new(HttpPublisher::new("youtube", url.clone())));
    }
    out
}
