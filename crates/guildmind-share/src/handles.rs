/// Derive the credit line identity for a share: the author's stored
/// twitter handle when one parses out, their display name otherwise.
pub fn author_identifier(raw_handle: Option<&str>, display_name: &str) -> String {
    raw_handle
        .and_then(extract_handle)
        .map(|h| format!("@{h}"))
        .unwrap_or_else(|| display_name.to_string())
}

/// Extract a bare username from any of the forms members store:
/// `@name`, `name`, `https://x.com/name`, `twitter.com/name?ref=...`.
pub fn extract_handle(raw: &str) -> Option<String> {
    let mut value = raw.trim().to_string();
    if value.is_empty() {
        return None;
    }

    let lower = value.to_lowercase();
    let url_like =
        value.contains("://") || lower.contains("x.com/") || lower.contains("twitter.com/");

    // `@twitter.com/user` style: drop the @ before URL parsing.
    if value.starts_with('@') && url_like {
        value.remove(0);
    }

    let extracted = if let Some(after_scheme) = value.split("://").nth(1) {
        let lower = after_scheme.to_lowercase();
        ["twitter.com/", "www.twitter.com/", "x.com/", "www.x.com/"]
            .iter()
            .find(|prefix| lower.starts_with(**prefix))
            .map(|prefix| after_scheme[prefix.len()..].split('/').next().unwrap_or(""))
            .map(String::from)
    } else if let Some(idx) = lower.find("x.com/") {
        Some(
            value[idx + "x.com/".len()..]
                .split('/')
                .next()
                .unwrap_or("")
                .to_string(),
        )
    } else if let Some(idx) = lower.find("twitter.com/") {
        Some(
            value[idx + "twitter.com/".len()..]
                .split('/')
                .next()
                .unwrap_or("")
                .to_string(),
        )
    } else {
        Some(value)
    };

    let cleaned = extracted?
        .split('?')
        .next()
        .unwrap_or("")
        .split('#')
        .next()
        .unwrap_or("")
        .trim_start_matches('@')
        .to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// A reply of `n` (any case) means "no comment" and is elided entirely.
pub fn normalize_comment(reply: &str) -> String {
    if reply.trim().eq_ignore_ascii_case("n") {
        String::new()
    } else {
        reply.trim().to_string()
    }
}

/// Compose the outgoing post text. A comment of `n` has already been
/// elided to empty by [`normalize_comment`].
pub fn compose_share_text(comment: &str, author_identifier: &str) -> String {
    let comment = comment.trim();
    if comment.is_empty() {
        format!("Generation by {author_identifier}")
    } else {
        format!("{comment}\n\nGeneration by {author_identifier}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_every_stored_form() {
        for raw in [
            "alice",
            "@alice",
            "https://x.com/alice",
            "https://twitter.com/alice",
            "https://www.x.com/alice/status/123",
            "x.com/alice",
            "twitter.com/alice?ref=home",
            "@twitter.com/alice",
            "https://x.com/alice#bio",
        ] {
            assert_eq!(extract_handle(raw).as_deref(), Some("alice"), "form: {raw}");
        }
    }

    #[test]
    fn empty_and_degenerate_forms_fall_back() {
        assert_eq!(extract_handle(""), None);
        assert_eq!(extract_handle("   "), None);
        assert_eq!(extract_handle("https://x.com/"), None);
        assert_eq!(author_identifier(None, "Alice Display"), "Alice Display");
        assert_eq!(author_identifier(Some("https://x.com/"), "Alice"), "Alice");
    }

    #[test]
    fn share_text_with_and_without_comment() {
        assert_eq!(
            compose_share_text("wow", "@alice"),
            "wow\n\nGeneration by @alice"
        );
        assert_eq!(compose_share_text("  ", "@alice"), "Generation by @alice");
    }

    #[test]
    fn single_letter_n_means_no_comment() {
        assert_eq!(normalize_comment("n"), "");
        assert_eq!(normalize_comment(" N "), "");
        assert_eq!(normalize_comment("no way"), "no way");
        assert_eq!(normalize_comment("nice"), "nice");
    }
}
