use tracing::warn;

use guildmind_llm::{ChatMessage, Dispatcher, GenOpts};

/// Canonical base-model catalog the classifier chooses from.
pub const MODEL_CATALOG: &[(&str, &[&str])] = &[
    ("stable-diffusion-1.5", &["base", "lcm", "hyper"]),
    ("stable-diffusion-xl", &["base", "turbo", "lightning"]),
    ("stable-diffusion-3.5", &["medium", "large"]),
    ("flux", &["dev", "schnell", "pro"]),
    ("hunyuan-video", &["base"]),
    ("wan", &["2.1", "2.2"]),
    ("ltx-video", &["base"]),
    ("animatediff", &["v2", "v3", "lightning"]),
];

fn catalog_text() -> String {
    MODEL_CATALOG
        .iter()
        .map(|(model, variants)| format!("- {model}: {}", variants.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ask the dispatcher which catalog entry a workflow graph targets.
/// Returns `(model, variant)`; unknown or unparseable replies classify as
/// `None` rather than guessing.
pub async fn classify_workflow(
    dispatcher: &Dispatcher,
    model: &str,
    workflow_json: &str,
) -> Option<(String, String)> {
    let excerpt: String = workflow_json.chars().take(6000).collect();
    let prompt = format!(
        "This is a generative workflow graph (JSON). Determine which base model family and \
         variant it targets, choosing ONLY from this catalog:\n{}\n\n\
         Reply with exactly `model|variant` (lowercase, no other text). If you cannot tell, \
         reply `unknown|unknown`.\n\nWorkflow:\n{excerpt}",
        catalog_text()
    );

    let raw = match dispatcher
        .generate(
            "claude",
            model,
            "",
            vec![ChatMessage::user(prompt)],
            GenOpts::max_tokens(50),
        )
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "workflow classification call failed");
            return None;
        }
    };

    parse_classification(&raw)
}

fn parse_classification(raw: &str) -> Option<(String, String)> {
    let normalized = raw.trim().to_lowercase();
    let (model, variant) = normalized.split_once('|')?;
    let model = model.trim();
    let variant = variant.trim();
    let known = MODEL_CATALOG.iter().any(|(m, _)| *m == model);
    if !known || model == "unknown" {
        return None;
    }
    Some((model.to_string(), variant.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_catalog_entries() {
        assert_eq!(
            parse_classification("flux|dev"),
            Some(("flux".into(), "dev".into()))
        );
        assert_eq!(
            parse_classification("  Stable-Diffusion-XL|Turbo \n"),
            Some(("stable-diffusion-xl".into(), "turbo".into()))
        );
    }

    #[test]
    fn unknown_and_malformed_classify_as_none() {
        assert_eq!(parse_classification("unknown|unknown"), None);
        assert_eq!(parse_classification("made-up-model|base"), None);
        assert_eq!(parse_classification("flux"), None);
    }
}
