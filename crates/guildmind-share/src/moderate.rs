use tracing::{info, warn};

use guildmind_llm::{ChatMessage, Dispatcher, GenOpts};

/// Which branch of the flow requested moderation; carried into admin
/// alerts so the path taken is always visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharePath {
    Consent,
    PreApproved,
    AdminInitiated,
}

impl SharePath {
    pub fn label(&self) -> &'static str {
        match self {
            SharePath::Consent => "Consent Path",
            SharePath::PreApproved => "Pre-Approved Path",
            SharePath::AdminInitiated => "Admin-Initiated Path",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModerationOutcome {
    pub approved: bool,
    pub decision: String,
    pub reason: String,
    /// True when both texts were empty and the LLM call was skipped.
    pub skipped: bool,
}

const MODERATION_SYSTEM_PROMPT: &str = "Can you determine whether or not this is a suitable post for an open source AI art community's social media.

Bad posts include:

- rude, explicit, insulting or inappropriate
- excessively hypey and over the top
- excessively self-promotional
- other obvious reason

Your reply should be in this format:

{yes or no}|{reason}

Make sure to use lowercase. For example:

yes|good post

Reply with that and nothing else";

/// `yes|reason` / `no|reason`, lowercased. Anything malformed is a `no`.
pub fn parse_verdict(raw: &str) -> (String, String) {
    let normalized = raw.trim().to_lowercase();
    let mut parts = normalized.splitn(2, '|');
    let decision = parts.next().unwrap_or("").trim().to_string();
    let reason = parts.next().map(|r| r.trim().to_string());

    match (decision.as_str(), reason) {
        ("yes", Some(reason)) => ("yes".into(), reason),
        ("no", Some(reason)) => ("no".into(), reason),
        (_, Some(_)) => ("no".into(), "Invalid decision value from LLM.".into()),
        (_, None) => ("no".into(), "LLM response format error.".into()),
    }
}

/// Run the content suitability check for one share. Transport failures
/// fail open (approve) so a provider outage never drops member traffic;
/// two empty texts skip the call entirely and approve.
pub async fn moderate(
    dispatcher: &Dispatcher,
    model: &str,
    path: SharePath,
    original_text: &str,
    reactor_comment: &str,
) -> ModerationOutcome {
    if original_text.trim().is_empty() && reactor_comment.trim().is_empty() {
        info!(path = path.label(), "no text to moderate, skipping LLM review");
        return ModerationOutcome {
            approved: true,
            decision: "yes".into(),
            reason: "Skipped LLM review: no text content from original post or comment.".into(),
            skipped: true,
        };
    }

    let user_content = format!(
        "Original Post Content: \"\"\"{}\"\"\"\nReactor's Comment: \"\"\"{}\"\"\"",
        if original_text.trim().is_empty() {
            "[No text content]"
        } else {
            original_text
        },
        reactor_comment,
    );

    match dispatcher
        .generate(
            "claude",
            model,
            MODERATION_SYSTEM_PROMPT,
            vec![ChatMessage::user(user_content)],
            GenOpts::max_tokens(150),
        )
        .await
    {
        Ok(raw) => {
            let (decision, reason) = parse_verdict(&raw);
            info!(
                path = path.label(),
                decision, reason, model, "moderation verdict"
            );
            ModerationOutcome {
                approved: decision == "yes",
                decision,
                reason,
                skipped: false,
            }
        }
        Err(e) => {
            warn!(path = path.label(), error = %e, "moderation call failed, failing open");
            ModerationOutcome {
                approved: true,
                decision: "yes".into(),
                reason: format!("LLM call failed: {e}"),
                skipped: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildmind_llm::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
    use std::sync::Arc;

    #[test]
    fn verdict_parsing() {
        assert_eq!(parse_verdict("yes|good post"), ("yes".into(), "good post".into()));
        assert_eq!(parse_verdict("NO|too hype"), ("no".into(), "too hype".into()));
        assert_eq!(
            parse_verdict("maybe|unsure"),
            ("no".into(), "Invalid decision value from LLM.".into())
        );
        assert_eq!(
            parse_verdict("sounds fine to me"),
            ("no".into(), "LLM response format error.".into())
        );
    }

    struct FailingProvider;

    #[async_trait::async_trait]
    impl LlmProvider for FailingProvider {
        fn name(&self) -> &str {
            "claude"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::BadRequest("down".into()))
        }
    }

    #[tokio::test]
    async fn transport_error_fails_open() {
        let d = Dispatcher::with_provider("claude", Arc::new(FailingProvider));
        let out = moderate(&d, "m", SharePath::Consent, "text", "comment").await;
        assert!(out.approved);
        assert!(!out.skipped);
        assert!(out.reason.contains("LLM call failed"));
    }

    #[tokio::test]
    async fn empty_texts_skip_the_call() {
        let d = Dispatcher::with_provider("claude", Arc::new(FailingProvider));
        let out = moderate(&d, "m", SharePath::PreApproved, "  ", "").await;
        assert!(out.approved);
        assert!(out.skipped);
    }
}
