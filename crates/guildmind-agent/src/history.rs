use dashmap::DashMap;

/// Turns kept per user before trimming (each turn is a user + assistant
/// entry, so the stored cap is twice this).
pub const MAX_TURNS: usize = 20;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub role: &'static str,
    pub content: String,
}

/// Per-user conversation history. In memory only; resets on restart.
#[derive(Default)]
pub struct ConversationHistory {
    entries: DashMap<u64, Vec<HistoryEntry>>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self, user_id: u64) {
        self.entries.remove(&user_id);
    }

    pub fn record_turn(&self, user_id: u64, user_text: &str, reply: Option<&str>) {
        let mut entry = self.entries.entry(user_id).or_default();
        entry.push(HistoryEntry {
            role: "User",
            content: user_text.to_string(),
        });
        if let Some(reply) = reply {
            entry.push(HistoryEntry {
                role: "Bot",
                content: reply.to_string(),
            });
        }
        let len = entry.len();
        if len > MAX_TURNS * 2 {
            entry.drain(..len - MAX_TURNS * 2);
        }
    }

    /// Render recent history for prompt context: last 20 entries, each
    /// truncated so prompt growth stays bounded.
    pub fn render(&self, user_id: u64) -> Option<String> {
        let entries = self.entries.get(&user_id)?;
        if entries.is_empty() {
            return None;
        }
        let text = entries
            .iter()
            .rev()
            .take(MAX_TURNS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .map(|e| {
                let content: String = e.content.chars().take(500).collect();
                format!("{}: {}", e.role, content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_caps_at_twice_max_turns() {
        let h = ConversationHistory::new();
        for i in 0..60 {
            h.record_turn(1, &format!("q{i}"), Some(&format!("a{i}")));
        }
        let stored = h.entries.get(&1).unwrap().len();
        assert_eq!(stored, MAX_TURNS * 2);
        // Oldest entries were dropped.
        assert!(h.render(1).unwrap().contains("q59"));
        assert!(!h.render(1).unwrap().contains("q10:"));
    }

    #[test]
    fn clear_empties_history() {
        let h = ConversationHistory::new();
        h.record_turn(1, "hello", Some("hi"));
        h.clear(1);
        assert!(h.render(1).is_none());
    }
}
