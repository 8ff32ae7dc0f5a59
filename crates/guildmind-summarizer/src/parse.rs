use serde::{Deserialize, Serialize};

use crate::error::SummaryError;

/// Sentinels a well-behaved model may return instead of JSON.
pub const NO_NEWS: &str = "[NO SIGNIFICANT NEWS]";
const SENTINELS: &[&str] = &[NO_NEWS, "[NO MESSAGES TO ANALYZE]", "[NOTHING OF NOTE]"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub title: String,
    #[serde(rename = "mainText")]
    pub main_text: String,
    /// One or more comma-separated media URLs.
    #[serde(rename = "mainFile", default, skip_serializing_if = "Option::is_none")]
    pub main_file: Option<String>,
    pub message_id: String,
    pub channel_id: String,
    #[serde(rename = "subTopics", default)]
    pub sub_topics: Vec<SubTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubTopic {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SummaryOutput {
    NoNews,
    Items(Vec<NewsItem>),
}

/// Comma-split a `mainFile`/`file` value into trimmed URLs, dropping the
/// null-ish placeholders models sometimes emit.
pub fn split_file_urls(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty() && *u != "null" && *u != "unknown")
        .map(String::from)
        .collect()
}

/// Two-stage parse of LLM summary output.
///
/// Stage one locates the outermost JSON array by bracket scanning, so any
/// preamble or trailing commentary the model added is stripped. Stage two
/// validates structure via serde. Sentinel replies short-circuit to
/// [`SummaryOutput::NoNews`]; anything else unparseable is an error carrying
/// the raw payload, which callers store rather than discard.
pub fn parse_summary_output(raw: &str) -> Result<SummaryOutput, SummaryError> {
    let trimmed = raw.trim();

    if SENTINELS.contains(&trimmed) {
        return Ok(SummaryOutput::NoNews);
    }

    let Some(start) = trimmed.find('[') else {
        return Err(invalid(raw, "no JSON array found"));
    };
    let Some(end) = trimmed.rfind(']') else {
        return Err(invalid(raw, "unclosed JSON array"));
    };
    if end < start {
        return Err(invalid(raw, "mismatched brackets"));
    }
    let payload = &trimmed[start..=end];

    // A sentinel wrapped in prose still counts as no news.
    if SENTINELS.iter().any(|s| payload == *s) {
        return Ok(SummaryOutput::NoNews);
    }

    let items: Vec<NewsItem> = serde_json::from_str(payload)
        .map_err(|e| invalid(raw, &format!("JSON parse failed: {e}")))?;

    for item in &items {
        if item.title.trim().is_empty() {
            return Err(invalid(raw, "item with empty title"));
        }
        if item.message_id.trim().is_empty() || item.channel_id.trim().is_empty() {
            return Err(invalid(raw, "item missing message_id/channel_id"));
        }
    }

    if items.is_empty() {
        return Ok(SummaryOutput::NoNews);
    }
    Ok(SummaryOutput::Items(items))
}

fn invalid(raw: &str, reason: &str) -> SummaryError {
    SummaryError::InvalidOutput {
        reason: reason.to_string(),
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"[{"title":"New ControlNet","mainText":"big news:","mainFile":"u1,u2","message_id":"1","channel_id":"c1","subTopics":[]}]"#;

    #[test]
    fn parses_plain_json_array() {
        let out = parse_summary_output(VALID).unwrap();
        let SummaryOutput::Items(items) = out else {
            panic!("expected items")
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "New ControlNet");
        assert_eq!(items[0].main_file.as_deref(), Some("u1,u2"));
    }

    #[test]
    fn strips_preamble_and_trailing_text() {
        let wrapped = format!("Here is the summary:\n{VALID}\nHope that helps!");
        let out = parse_summary_output(&wrapped).unwrap();
        assert!(matches!(out, SummaryOutput::Items(_)));
    }

    #[test]
    fn sentinel_is_no_news() {
        assert_eq!(
            parse_summary_output("[NO SIGNIFICANT NEWS]").unwrap(),
            SummaryOutput::NoNews
        );
        assert_eq!(
            parse_summary_output("  [NO MESSAGES TO ANALYZE]  ").unwrap(),
            SummaryOutput::NoNews
        );
    }

    #[test]
    fn unclosed_bracket_is_invalid_with_raw_preserved() {
        let broken = r#"[{"title":"x","mainText":"y","message_id":"1","channel_id":"2""#;
        let err = parse_summary_output(broken).unwrap_err();
        match err {
            SummaryError::InvalidOutput { raw, .. } => assert_eq!(raw, broken),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_title_is_structural_failure() {
        let bad = r#"[{"title":"  ","mainText":"y","message_id":"1","channel_id":"2","subTopics":[]}]"#;
        assert!(parse_summary_output(bad).is_err());
    }

    #[test]
    fn empty_array_is_no_news() {
        assert_eq!(parse_summary_output("[]").unwrap(), SummaryOutput::NoNews);
    }

    #[test]
    fn file_url_splitting_drops_placeholders() {
        assert_eq!(
            split_file_urls(" u1 , null , u2 ,, unknown "),
            vec!["u1".to_string(), "u2".to_string()]
        );
    }
}
