use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use guildmind_llm::{ChatRequest, Dispatcher};

use crate::context::AgentContext;
use crate::error::AgentError;
use crate::history::ConversationHistory;
use crate::tools::{self, reply, Tool};

/// Iteration cap so a confused model cannot loop forever.
const MAX_ITERATIONS: usize = 50;

const SYSTEM_PROMPT: &str = "You are an assistant for the Discord community bot admin.

Tools available:
- reply: Send message(s) to the user. Can send multiple messages via the \"messages\" array.
- end_turn: End without sending a message (for silent actions)
- share_to_social: Share a message to the community's social platforms (needs message_id or link)
- get_top_messages: Find popular messages by reactions (can filter by channel, media-only)
- search_content: Search messages by text content
- get_message_context: Get a message with its replies and community response
- get_active_channels: List channels by activity
- get_member_info: Look up a guild member
- get_bot_status: Check bot health
- refresh_media: Get fresh, working URLs for a message's attachments (Discord URLs expire)

END EVERY TURN with either reply or end_turn.

CRITICAL - SHOWING RESULTS:
Search tools (get_top_messages, search_content) return a \"summary\" field that's pre-formatted for display.
ALWAYS include this summary in your reply. NEVER say \"here are options\" without showing them.

CHAINING WORKFLOW:
When asked to \"find and share\" or similar multi-step tasks:
1. Use search tools to find candidates
2. Show results to the user with message IDs
3. Wait for the user to pick one, OR pick the best one if explicitly asked
4. Use share_to_social with the message_id to share
5. Reply with confirmation

SHOWING MEDIA IN DMs:
Discord CDN URLs expire. To show actual images/videos in the chat:
1. Find messages with get_top_messages or search_content
2. Use refresh_media(message_id) to get fresh URLs
3. Include the URLs in your reply - Discord will auto-embed them

IMPORTANT:
- share_to_social requires messages with attachments (has_media=true)
- Use has_media=true in get_top_messages to find shareable content
- Always show message_id so the user can reference specific messages";

/// Drives the admin tool-use loop: prompt → tool calls → results → repeat,
/// stopping on reply/end_turn or the iteration cap.
pub struct AgentRunner {
    dispatcher: Arc<Dispatcher>,
    tools: Vec<Box<dyn Tool>>,
    history: ConversationHistory,
    model: String,
}

impl AgentRunner {
    pub fn new(dispatcher: Arc<Dispatcher>, ctx: Arc<AgentContext>, model: String) -> Self {
        Self {
            dispatcher,
            tools: tools::build_tools(ctx),
            history: ConversationHistory::new(),
            model,
        }
    }

    /// Handle one admin DM. `None` means the agent ended the turn silently.
    pub async fn handle_message(
        &self,
        user_id: u64,
        user_message: &str,
    ) -> Result<Option<Vec<String>>, AgentError> {
        let trimmed = user_message.trim();
        if matches!(
            trimmed.to_lowercase().as_str(),
            "clear" | "reset" | "/clear" | "/reset"
        ) {
            self.history.clear(user_id);
            return Ok(Some(vec!["Conversation cleared!".to_string()]));
        }

        // Recent history rides inside the first user block for context.
        let full_message = match self.history.render(user_id) {
            Some(history_text) => {
                format!("{trimmed}\n\n---\nPREVIOUS CONVERSATION:\n{history_text}")
            }
            None => trimmed.to_string(),
        };

        let mut raw_messages =
            vec![json!({"role": "user", "content": full_message})];
        let mut final_replies: Vec<String> = Vec::new();

        for iteration in 0..MAX_ITERATIONS {
            debug!(iteration, "agent loop iteration");

            let mut req = ChatRequest::new(&self.model, SYSTEM_PROMPT, Vec::new());
            req.tools = tools::to_definitions(&self.tools);
            req.raw_messages = Some(raw_messages.clone());

            let response = self.dispatcher.send("claude", &req).await?;

            if response.tool_calls.is_empty() {
                // Plain text answer: treat it as the reply.
                if !response.content.trim().is_empty() {
                    final_replies.push(response.content.trim().to_string());
                }
                break;
            }

            let mut assistant_content: Vec<serde_json::Value> = Vec::new();
            if !response.content.is_empty() {
                assistant_content.push(json!({"type": "text", "text": response.content}));
            }
            for call in &response.tool_calls {
                assistant_content.push(json!({
                    "type": "tool_use",
                    "id": call.id,
                    "name": call.name,
                    "input": call.input,
                }));
            }
            raw_messages.push(json!({"role": "assistant", "content": assistant_content}));

            let mut tool_results: Vec<serde_json::Value> = Vec::new();
            let mut turn_over = false;

            for call in &response.tool_calls {
                info!(tool = %call.name, "agent tool call");

                if call.name == "reply" {
                    final_replies.extend(reply::extract_messages(&call.input));
                    turn_over = true;
                }
                if call.name == "end_turn" {
                    turn_over = true;
                }

                let result = match self.tools.iter().find(|t| t.name() == call.name) {
                    Some(tool) => tool.execute(call.input.clone()).await,
                    None => tools::ToolResult::error(format!("unknown tool: {}", call.name)),
                };
                if result.is_error {
                    warn!(tool = %call.name, error = %result.content, "tool execution failed");
                }
                tool_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": result.content,
                    "is_error": result.is_error,
                }));
            }

            raw_messages.push(json!({"role": "user", "content": tool_results}));

            if turn_over {
                break;
            }
        }

        let combined = if final_replies.is_empty() {
            None
        } else {
            Some(final_replies.join("\n---\n"))
        };
        self.history
            .record_turn(user_id, trimmed, combined.as_deref());

        Ok(if final_replies.is_empty() {
            None
        } else {
            Some(final_replies)
        })
    }
}
