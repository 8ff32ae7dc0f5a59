use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use guildmind_core::config::ModerationSettings;

/// Total polling budget per image.
const POLL_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Category score above which an image is blocked.
const BLOCK_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Default)]
pub struct ModerationVerdict {
    pub block: bool,
    pub categories: HashMap<String, f64>,
    pub error: Option<String>,
}

impl ModerationVerdict {
    fn fail_open(reason: impl Into<String>) -> Self {
        Self {
            block: false,
            categories: HashMap::new(),
            error: Some(reason.into()),
        }
    }
}

/// Image safety check against a remote moderator: submit a job, poll until
/// done or the 60s budget runs out. Timeouts and transport errors are
/// fail-open so a moderator outage never blocks legitimate content.
pub struct ModerationClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl ModerationClient {
    pub fn from_settings(settings: &ModerationSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn check_image(&self, image_url: &str) -> ModerationVerdict {
        let Some(ref api_key) = self.api_key else {
            return ModerationVerdict::fail_open("API key not configured");
        };

        let request_id = match self.submit_task(api_key, image_url).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "moderation submit failed");
                return ModerationVerdict::fail_open(format!("submit failed: {e}"));
            }
        };

        match self.poll_result(api_key, &request_id).await {
            Some(scores) => evaluate(scores),
            None => {
                warn!(request_id, "moderation poll timed out");
                ModerationVerdict::fail_open("timeout")
            }
        }
    }

    async fn submit_task(&self, api_key: &str, image_url: &str) -> Result<String, reqwest::Error> {
        let resp: SubmitResponse = self
            .client
            .post(format!("{}/v1/moderation/tasks", self.base_url))
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "url": image_url }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.request_id)
    }

    async fn poll_result(
        &self,
        api_key: &str,
        request_id: &str,
    ) -> Option<HashMap<String, f64>> {
        let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;

        while tokio::time::Instant::now() < deadline {
            match self
                .client
                .get(format!(
                    "{}/v1/moderation/tasks/{request_id}",
                    self.base_url
                ))
                .bearer_auth(api_key)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(body) = resp.json::<PollResponse>().await {
                        if body.status == "completed" {
                            return Some(body.categories.unwrap_or_default());
                        }
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "moderation poll error");
                }
                Err(e) => {
                    warn!(error = %e, "moderation poll request failed");
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        None
    }
}

fn evaluate(categories: HashMap<String, f64>) -> ModerationVerdict {
    let block = categories.values().any(|score| *score > BLOCK_THRESHOLD);
    if block {
        info!(?categories, "content blocked by moderation");
    }
    ModerationVerdict {
        block,
        categories,
        error: None,
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    categories: Option<HashMap<String, f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_score_blocks() {
        let mut cats = HashMap::new();
        cats.insert("nudity".to_string(), 0.92);
        let v = evaluate(cats);
        assert!(v.block);
        assert!(v.error.is_none());
    }

    #[test]
    fn low_scores_pass() {
        let mut cats = HashMap::new();
        cats.insert("nudity".to_string(), 0.1);
        cats.insert("violence".to_string(), 0.3);
        assert!(!evaluate(cats).block);
    }

    #[tokio::test]
    async fn missing_key_fails_open() {
        let client = ModerationClient {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: "http://localhost".into(),
        };
        let v = client.check_image("http://example/x.png").await;
        assert!(!v.block);
        assert!(v.error.is_some());
    }
}
