use chrono::{DateTime, Utc};

/// One message rendered into a summary prompt, display names resolved.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub reaction_count: u32,
    /// (filename, url) pairs.
    pub attachments: Vec<(String, String)>,
    pub message_id: u64,
    pub channel_id: u64,
}

/// System prompt for per-channel news generation. The model must answer
/// with ONLY a JSON array in the documented shape, or the literal
/// `[NO SIGNIFICANT NEWS]` sentinel.
pub fn news_system_prompt() -> String {
    r#"You MUST respond with ONLY a JSON array containing news items. NO introduction text, NO explanation, NO markdown formatting.

If there are no significant news items, respond with exactly "[NO SIGNIFICANT NEWS]".
Otherwise, respond with ONLY a JSON array in this exact format:

[
 {
   "title": "Example tool ships new ControlNets",
   "mainText": "A new analytics node has been developed to track and analyze data pipeline components, including inputs, outputs, and embeddings:",
   "mainFile": "https://cdn.discordapp.com/attachments/123/987/example_video.mp4, https://cdn.discordapp.com/attachments/123/988/example_image.png",
   "message_id": "4532454353425342",
   "channel_id": "1138865343314530324",
   "subTopics": [
     {
       "text": "Here's another example of **username** using it in combination with **Redux** - they noted it worked better than the previous version:",
       "file": "https://cdn.discordapp.com/attachments/124/989/another_example.png",
       "message_id": "4532454353425343",
       "channel_id": "1138865343314530324"
     }
   ]
 }
]

Focus on these types of content:
1. New features or tools that were announced or people are excited about
2. Demos or images that got a lot of attention, especially messages with many reactions
3. The things people seem most excited about or commented/reacted to a lot
4. AI art and AI art-related tools, open source tools and projects
5. Notable achievements, demonstrations or work that people did
6. Don't avoid negative news but try to frame it constructively

IMPORTANT REQUIREMENTS FOR MEDIA AND LINKS:
1. Each topic MUST have message_id and channel_id for linking back to the original message
2. AGGRESSIVELY search for related media; include ALL images, videos or links that are part of the same discussion, prioritising ones people reacted to
3. If you find multiple related pieces of media, include them all in mainFile as a comma-separated list
4. For each subtopic that references media or a demo, you MUST include message_id and channel_id
5. Prioritize messages with reactions or responses when selecting media to include
6. Be careful not to bias towards just the first messages about a topic
7. Include interesting follow-up discussions as subtopics even without media
8. Always end with a colon ":" if there are attachments or links
9. Don't share the same attachment or link multiple times, even across different subtopics
10. file and mainFile must always be a direct link to the file

Requirements for the response:
1. Must be valid JSON in exactly the above format
2. Each news item must have all fields: title, mainText, mainFile (can be multiple comma-separated), message_id, channel_id, and subTopics
3. All usernames must be in bold with ** (e.g., "**username**") - always credit the creator and attribute opinions to the person holding them
4. If there are no significant news items, respond with exactly "[NO SIGNIFICANT NEWS]"
5. Include NOTHING other than the JSON response or "[NO SIGNIFICANT NEWS]"
6. Don't repeat the same item or leave any empty fields
7. Don't be hyperbolic or overly enthusiastic"#
        .to_string()
}

/// Render messages into the sectioned format the news prompt expects.
pub fn format_messages(messages: &[PromptMessage]) -> String {
    let mut out = String::from("Here are the messages to analyze:\n\n");
    for msg in messages {
        out.push_str(&format!("=== Message from {} ===\n", msg.author_name));
        out.push_str(&format!(
            "Time: {}\n",
            msg.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("Content: {}\n", msg.content));
        if msg.reaction_count > 0 {
            out.push_str(&format!("Reactions: {}\n", msg.reaction_count));
        }
        if !msg.attachments.is_empty() {
            out.push_str("Attachments:\n");
            for (filename, url) in &msg.attachments {
                out.push_str(&format!("- {filename}: {url}\n"));
            }
        }
        out.push_str(&format!("Message ID: {}\n", msg.message_id));
        out.push_str(&format!("Channel ID: {}\n\n", msg.channel_id));
    }
    out.push_str("\nRemember: Respond with ONLY the JSON array or '[NO SIGNIFICANT NEWS]'. NO other text.");
    out
}

/// Wrap a chunk prompt with the outputs of earlier chunks so topics are not
/// repeated across chunk boundaries.
pub fn with_prior_context(prior: &str, chunk_prompt: &str) -> String {
    format!(
        "Previous summary chunk(s) contained these items:\n{prior}\n\n\
         DO NOT duplicate or repeat any of the topics, ideas, or media from above.\n\
         Only include NEW and DIFFERENT topics from the messages below.\n\
         If all significant topics have already been covered, respond with \"[NO SIGNIFICANT NEWS]\".\n\n\
         {chunk_prompt}"
    )
}

/// Merge several JSON chunk outputs into the top 3-5 items, preserving the
/// item structure exactly. Also used for the cross-channel aggregate.
pub fn merge_prompt(summaries: &[String]) -> String {
    let mut prompt = String::from(
        "You are analyzing multiple JSON summaries.\n\
         Each summary is in the same format: an array of objects with fields:\n\
         title, mainText, mainFile, message_id, channel_id, subTopics (an array of objects with text, file, message_id, channel_id).\n\
         Combine them into a single JSON array that contains the top 3-5 most interesting items overall.\n\
         You MUST keep each chosen item in the exact same structure (all fields) as it appeared in the original input.\n\n\
         If no interesting items, respond with \"[NO SIGNIFICANT NEWS]\".\n\
         Otherwise, respond with ONLY a JSON array. No extra text.\n\n\
         Here are the input summaries:\n",
    );
    for s in summaries {
        prompt.push('\n');
        prompt.push_str(s);
        prompt.push('\n');
    }
    prompt.push_str("\nReturn just the final JSON array with the top items (or '[NO SIGNIFICANT NEWS]').");
    prompt
}

/// Three-bullet digest. The first line is a hard contract checked by tests:
/// `📨 __{N} messages sent__` with the exact message count.
pub fn short_summary_prompt(full_summary: &str, message_count: usize) -> String {
    format!(
        "Create exactly 3 bullet points summarizing key developments. STRICT format requirements:\n\
         1. The FIRST LINE MUST BE EXACTLY: 📨 __{message_count} messages sent__\n\
         2. Then three bullet points that:\n\
         - Start with -\n\
         - Give a short summary of one of the main topics from the full summary, prioritising topics likely to be useful to others\n\
         - Bold the most important finding/result/insight using **\n\
         - Keep each to a single line\n\
         3. DO NOT MODIFY THE MESSAGE COUNT OR FORMAT IN ANY WAY\n\n\
         Required format:\n\
         \"📨 __{message_count} messages sent__\n\
         • [Main topic 1]\n\
         • [Main topic 2]\n\
         • [Main topic 3]\"\n\
         DO NOT CHANGE THE MESSAGE COUNT LINE. IT MUST BE EXACTLY AS SHOWN ABOVE. DO NOT INCLUDE ANYTHING ELSE IN THE MESSAGE OTHER THAN THE ABOVE.\n\n\
         Full summary to work from:\n{full_summary}"
    )
}

/// Fallback digest line used when the short-summary call fails outright.
pub fn short_summary_fallback(message_count: usize) -> String {
    format!(
        "📨 __{message_count} messages sent__\n• Unable to generate short summary due to API error after retries."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn message_sections_have_required_fields() {
        let msg = PromptMessage {
            author_name: "alice".into(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap(),
            content: "shipped a thing".into(),
            reaction_count: 4,
            attachments: vec![("demo.mp4".into(), "https://cdn/demo.mp4".into())],
            message_id: 11,
            channel_id: 22,
        };
        let out = format_messages(&[msg]);
        assert!(out.contains("=== Message from alice ==="));
        assert!(out.contains("Time: 2025-03-10 08:00:00"));
        assert!(out.contains("Reactions: 4"));
        assert!(out.contains("- demo.mp4: https://cdn/demo.mp4"));
        assert!(out.contains("Message ID: 11"));
        assert!(out.contains("Channel ID: 22"));
    }

    #[test]
    fn prior_context_carries_dedup_instruction() {
        let wrapped = with_prior_context("[{\"title\":\"x\"}]", "PROMPT");
        assert!(wrapped.contains("DO NOT duplicate"));
        assert!(wrapped.ends_with("PROMPT"));
    }

    #[test]
    fn short_summary_first_line_contract() {
        let p = short_summary_prompt("stuff", 42);
        assert!(p.contains("📨 __42 messages sent__"));
        assert!(short_summary_fallback(42).starts_with("📨 __42 messages sent__"));
    }
}
