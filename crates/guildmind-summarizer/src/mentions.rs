use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use guildmind_store::{records, Store};

/// Replace raw `<@123>` mentions with `@display_name` from the member
/// table, so reposted content reads like text instead of markup.
pub async fn replace_user_mentions(store: &Arc<Store>, text: &str) -> String {
    let re = mention_regex();
    let ids: Vec<u64> = re
        .captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse().ok()))
        .collect();
    if ids.is_empty() {
        return text.to_string();
    }

    let members = records::members_by_ids(store, &ids).await.unwrap_or_default();
    replace_with(&re, text, &members)
}

fn mention_regex() -> Regex {
    Regex::new(r"<@!?(\d+)>").expect("static regex")
}

fn replace_with(
    re: &Regex,
    text: &str,
    members: &HashMap<u64, guildmind_core::types::Member>,
) -> String {
    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let id: u64 = caps[1].parse().unwrap_or(0);
        match members.get(&id) {
            Some(m) => format!("@{}", m.display_name()),
            None => "@unknown".to_string(),
        }
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use guildmind_core::types::Member;

    #[test]
    fn replaces_known_and_unknown_mentions() {
        let re = mention_regex();
        let mut members = HashMap::new();
        members.insert(
            42,
            Member {
                member_id: 42,
                username: "alice".into(),
                ..Default::default()
            },
        );
        let out = replace_with(&re, "thanks <@42> and <@!77>!", &members);
        assert_eq!(out, "thanks @alice and @unknown!");
    }
}
