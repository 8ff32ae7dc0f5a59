use std::sync::Arc;
use std::time::Duration;

use serenity::builder::{CreateActionRow, CreateButton, CreateMessage};
use serenity::http::Http;
use serenity::model::application::ButtonStyle;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::id::{ChannelId, MessageId, UserId};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use guildmind_core::config::{DiscordSettings, LlmSettings, DIALOG_TIMEOUT_SECS};
use guildmind_discord::send::{safe_dm, safe_send};
use guildmind_discord::{fetch, RateLimiter};
use guildmind_llm::Dispatcher;
use guildmind_store::{records, Store};

use crate::dialog::{consent_custom_id, ConsentChoice, DialogRegistry};
use crate::error::ShareError;
use crate::handles::{author_identifier, compose_share_text};
use crate::moderate::{self, ModerationOutcome, SharePath};
use crate::publisher::Publisher;

/// Reaction trigger, already reduced to ids by the event handler.
#[derive(Debug, Clone)]
pub struct ShareTrigger {
    pub channel_id: u64,
    pub message_id: u64,
    pub reactor_id: u64,
}

/// Drives the consent → moderation → publish pipeline for one trigger.
pub struct ShareFlow {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<DialogRegistry>,
    publishers: Vec<Arc<dyn Publisher>>,
    http: Arc<Http>,
    rl: Arc<RateLimiter>,
    llm: LlmSettings,
    discord: DiscordSettings,
    guild_id: u64,
}

impl ShareFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<DialogRegistry>,
        publishers: Vec<Arc<dyn Publisher>>,
        http: Arc<Http>,
        rl: Arc<RateLimiter>,
        llm: LlmSettings,
        discord: DiscordSettings,
        guild_id: u64,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry,
            publishers,
            http,
            rl,
            llm,
            discord,
            guild_id,
        }
    }

    pub fn registry(&self) -> &Arc<DialogRegistry> {
        &self.registry
    }

    /// Entry point, spawned per share reaction. All outcomes end with a
    /// closing DM to the reactor; errors are logged, never surfaced raw.
    pub async fn handle_trigger(&self, trigger: ShareTrigger) {
        if let Err(e) = self.run_dialog(&trigger).await {
            warn!(
                message_id = trigger.message_id,
                reactor_id = trigger.reactor_id,
                error = %e,
                "share dialog aborted"
            );
        }
    }

    async fn run_dialog(&self, trigger: &ShareTrigger) -> Result<(), ShareError> {
        let reactor = UserId::new(trigger.reactor_id);
        let message = fetch::fetch_message(
            &self.http,
            &self.rl,
            ChannelId::new(trigger.channel_id),
            MessageId::new(trigger.message_id),
        )
        .await?;

        if message.author.bot {
            info!(message_id = trigger.message_id, "author is a bot, ignoring share reaction");
            return Ok(());
        }

        let jump = guildmind_core::types::jump_url(
            self.guild_id,
            trigger.channel_id,
            trigger.message_id,
        );

        // NSFW short-circuit happens before any DM is sent.
        if let Some(channel) = records::get_channel(&self.store, trigger.channel_id).await? {
            if channel.is_nsfw_by_name() {
                self.dm_reactor(
                    reactor,
                    &format!(
                        "Sorry, content from channels marked as NSFW (like '{}') cannot be shared \
                         using this feature. The message was: {jump}",
                        channel.name
                    ),
                )
                .await;
                return Ok(());
            }
        }

        let author_id = message.author.id.get();
        let dialog_id = Uuid::new_v4();
        let Some(_author_lock) = self.registry.try_lock_author(author_id, dialog_id) else {
            self.dm_reactor(
                reactor,
                &format!(
                    "A sharing request for this author is already in progress; please try again \
                     once it completes. The message was: {jump}"
                ),
            )
            .await;
            return Ok(());
        };

        // AWAIT_REACTOR_COMMENT
        let Some(comment) = self.collect_reactor_comment(reactor, &message, &jump).await? else {
            return Ok(());
        };

        // RESOLVE_AUTHOR_PREFERENCE
        let member = records::get_member(&self.store, author_id).await?;
        let sharing_consent = member.as_ref().and_then(|m| m.sharing_consent);
        let dm_preference = member.as_ref().map(|m| m.dm_preference).unwrap_or(true);

        match sharing_consent {
            Some(true) => {
                info!(author_id, "pre-approved path");
                let outcome = moderate::moderate(
                    &self.dispatcher,
                    &self.llm.moderation_model_preapproved,
                    SharePath::PreApproved,
                    &message.content,
                    &comment,
                )
                .await;
                self.finish(SharePath::PreApproved, &message, reactor, &comment, &jump, outcome)
                    .await?;
            }
            Some(false) => {
                self.dm_reactor(
                    reactor,
                    &format!(
                        "The author of {jump} has chosen not to have their content shared. \
                         Your request cannot be processed."
                    ),
                )
                .await;
            }
            None if !dm_preference => {
                self.dm_reactor(
                    reactor,
                    &format!(
                        "The author of the message has chosen not to receive direct messages for \
                         sharing requests at this time. Your request to share {jump} cannot be \
                         processed."
                    ),
                )
                .await;
            }
            None => {
                self.consent_path(&dialog_id, &message, reactor, &comment, &jump)
                    .await?;
            }
        }

        Ok(())
    }

    /// DM the reactor for a comment and wait up to six hours. `n` means no
    /// comment. `None` means the dialog ended (timeout or DM failure).
    async fn collect_reactor_comment(
        &self,
        reactor: UserId,
        message: &DiscordMessage,
        jump: &str,
    ) -> Result<Option<String>, ShareError> {
        let Some(rx) = self.registry.register_comment_waiter(reactor.get()) else {
            self.dm_reactor(
                reactor,
                "You already have a sharing request in progress; please finish that one first.",
            )
            .await;
            return Ok(None);
        };

        let mut prompt = format!(
            "You reacted to <@{}>'s message to share it: {jump}\n\n\
             What comment would you like to leave with the post? Reply with your comment, or \
             type `n` if you don't want to add one.\n",
            message.author.id.get()
        );
        let cleaned = message.content.trim();
        if cleaned.is_empty() {
            prompt.push_str("\nOriginal Post Text:\n[No text content]");
        } else {
            let excerpt: String = cleaned.chars().take(1000).collect();
            let single_url = excerpt.starts_with("http") && excerpt.split_whitespace().count() == 1;
            if single_url {
                prompt.push_str(&format!("\nOriginal Post Text:\n{excerpt}"));
            } else {
                prompt.push_str(&format!("\nOriginal Post Text:\n```{excerpt}```"));
            }
        }

        if self.try_dm_reactor(reactor, &prompt).await.is_err() {
            self.registry.cancel_comment_waiter(reactor.get());
            return Ok(None);
        }
        for att in &message.attachments {
            self.dm_reactor(reactor, att.url.trim()).await;
        }

        match timeout(Duration::from_secs(DIALOG_TIMEOUT_SECS), rx).await {
            Ok(Ok(reply)) => {
                let comment = crate::handles::normalize_comment(&reply);
                if comment.is_empty() && !reply.trim().is_empty() {
                    info!(reactor_id = reactor.get(), "reactor chose not to add a comment");
                }
                Ok(Some(comment))
            }
            _ => {
                self.registry.cancel_comment_waiter(reactor.get());
                self.dm_reactor(
                    reactor,
                    "You didn't provide a comment in time, so the process to request sharing \
                     from the original author could not proceed.",
                )
                .await;
                Ok(None)
            }
        }
    }

    /// AWAIT_AUTHOR_CONSENT: button DM to the author, 6h timeout, durable
    /// preference writes on either answer.
    async fn consent_path(
        &self,
        dialog_id: &Uuid,
        message: &DiscordMessage,
        reactor: UserId,
        comment: &str,
        jump: &str,
    ) -> Result<(), ShareError> {
        let author = message.author.id;
        let rx = self.registry.register_consent_waiter(dialog_id);

        let dm = self
            .rl
            .execute(&format!("dm-open:{author}"), || async move {
                author.create_dm_channel(&*self.http).await
            })
            .await
            .map_err(guildmind_discord::DiscordError::Api)?;
        let dm_id = dm.id;

        let content = format!(
            "Someone would like to share your post on the community's social accounts: {jump}\n\n\
             Are you happy for your content to be shared? This preference is remembered for \
             future posts."
        );
        let buttons = CreateActionRow::Buttons(vec![
            CreateButton::new(consent_custom_id(dialog_id, ConsentChoice::Allow))
                .label("I'm happy for my stuff to be shared")
                .style(ButtonStyle::Success),
            CreateButton::new(consent_custom_id(dialog_id, ConsentChoice::Deny))
                .label("Please don't share")
                .style(ButtonStyle::Danger),
        ]);

        let consent_dm = self
            .rl
            .execute(&format!("send:{}", dm_id), || {
                let builder = CreateMessage::new()
                    .content(content.clone())
                    .components(vec![buttons.clone()]);
                async move { dm_id.send_message(&*self.http, builder).await }
            })
            .await
            .map_err(guildmind_discord::DiscordError::Api)?;

        for att in &message.attachments {
            let _ = safe_send(&self.http, &self.rl, dm_id, att.url.trim()).await;
        }

        match timeout(Duration::from_secs(DIALOG_TIMEOUT_SECS), rx).await {
            Ok(Ok(ConsentChoice::Allow)) => {
                records::set_member_prefs(
                    &self.store,
                    author.get(),
                    &message.author.name,
                    serde_json::json!({"sharing_consent": true}),
                )
                .await?;
                info!(author_id = author.get(), "author granted sharing consent");
                let outcome = moderate::moderate(
                    &self.dispatcher,
                    &self.llm.moderation_model_consent,
                    SharePath::Consent,
                    &message.content,
                    comment,
                )
                .await;
                if outcome.approved {
                    let _ = safe_send(
                        &self.http,
                        &self.rl,
                        dm_id,
                        "Thanks! Your content is being shared.",
                    )
                    .await;
                } else {
                    let _ = safe_send(
                        &self.http,
                        &self.rl,
                        dm_id,
                        "Thank you for your consent. However, upon review by our automated \
                         system, the content was determined to be unsuitable for sharing at this \
                         time. An admin has been notified. Your general preference to share has \
                         been saved.",
                    )
                    .await;
                }
                self.finish(SharePath::Consent, message, reactor, comment, jump, outcome)
                    .await?;
            }
            Ok(Ok(ConsentChoice::Deny)) => {
                records::set_member_prefs(
                    &self.store,
                    author.get(),
                    &message.author.name,
                    serde_json::json!({"sharing_consent": false, "dm_preference": false}),
                )
                .await?;
                info!(author_id = author.get(), "author denied sharing consent");
                let _ = safe_send(
                    &self.http,
                    &self.rl,
                    dm_id,
                    "Your preference has been updated. This content will not be shared, and we \
                     won't ask again.",
                )
                .await;
                self.dm_reactor(
                    reactor,
                    &format!(
                        "The author of the message {jump} declined to have their content shared \
                         at this time."
                    ),
                )
                .await;
            }
            _ => {
                // Timeout: abandon, delete the consent DM, tell the reactor.
                self.registry.cancel_consent_waiter(dialog_id);
                let _ = fetch::delete_message(&self.http, &self.rl, dm_id, consent_dm.id).await;
                self.dm_reactor(
                    reactor,
                    &format!(
                        "The author of the message did not respond to the 6-hour request to \
                         share their content. Message: {jump}"
                    ),
                )
                .await;
            }
        }

        Ok(())
    }

    /// MODERATE outcome → PUBLISH or notify. Shared by every path.
    async fn finish(
        &self,
        path: SharePath,
        message: &DiscordMessage,
        reactor: UserId,
        comment: &str,
        jump: &str,
        outcome: ModerationOutcome,
    ) -> Result<(), ShareError> {
        if !outcome.approved {
            self.dm_reactor(
                reactor,
                &format!(
                    "The content you proposed for sharing from {jump} was reviewed by our \
                     automated system and determined to be unsuitable at this time.\n\
                     Reason: {}",
                    outcome.reason
                ),
            )
            .await;
            self.alert_admin_flagged(path, message, reactor, comment, &outcome)
                .await;
            return Ok(());
        }

        let member = records::get_member(&self.store, message.author.id.get()).await?;
        let display_name = member
            .as_ref()
            .map(|m| m.display_name().to_string())
            .unwrap_or_else(|| message.author.name.clone());
        let identity = author_identifier(
            member.as_ref().and_then(|m| m.twitter_handle.as_deref()),
            &display_name,
        );

        let text = compose_share_text(comment, &identity);
        // Text-only posts are allowed; publishers receive an empty media
        // list and decide for themselves.
        let media_urls: Vec<String> =
            message.attachments.iter().map(|a| a.url.clone()).collect();

        for publisher in &self.publishers {
            let result = publisher
                .send(
                    &text,
                    &media_urls,
                    &message.id.get().to_string(),
                    &message.author.id.get().to_string(),
                )
                .await;
            if result.ok {
                let confirm = match result.url {
                    Some(url) => format!(
                        "Your comment on {jump} has been shared on {}! View it here: {url}",
                        publisher.name()
                    ),
                    None => format!("Your comment on {jump} has been shared on {}!", publisher.name()),
                };
                self.dm_reactor(reactor, &confirm).await;
            } else {
                warn!(publisher = publisher.name(), message_id = message.id.get(), "publish failed");
                self.dm_reactor(
                    reactor,
                    &format!(
                        "Sorry, there was an issue sharing your comment for {jump} on {}. \
                         Please try again later or contact an admin.",
                        publisher.name()
                    ),
                )
                .await;
            }
        }

        Ok(())
    }

    /// Agent-initiated share: enters the pre-approved publish path, still
    /// running moderation (admin initiation is not a consent bypass).
    pub async fn admin_share(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<String, ShareError> {
        let message = fetch::fetch_message(
            &self.http,
            &self.rl,
            ChannelId::new(channel_id),
            MessageId::new(message_id),
        )
        .await?;

        if let Some(channel) = records::get_channel(&self.store, channel_id).await? {
            if channel.is_nsfw_by_name() {
                return Err(ShareError::Refused("source channel is NSFW".into()));
            }
        }
        if message.attachments.is_empty() {
            return Err(ShareError::NoMedia(message_id));
        }

        let outcome = moderate::moderate(
            &self.dispatcher,
            &self.llm.moderation_model_preapproved,
            SharePath::AdminInitiated,
            &message.content,
            "",
        )
        .await;
        if !outcome.approved {
            return Err(ShareError::Refused(format!(
                "flagged by moderation: {}",
                outcome.reason
            )));
        }

        let jump = guildmind_core::types::jump_url(self.guild_id, channel_id, message_id);
        let admin = UserId::new(self.discord.admin_user_id);
        self.finish(SharePath::AdminInitiated, &message, admin, "", &jump, outcome)
            .await?;
        Ok(format!("shared {jump}"))
    }

    async fn alert_admin_flagged(
        &self,
        path: SharePath,
        message: &DiscordMessage,
        reactor: UserId,
        comment: &str,
        outcome: &ModerationOutcome,
    ) {
        let comment_snippet: String = comment.chars().take(200).collect();
        let content_snippet: String = message.content.chars().take(200).collect();
        let body = format!(
            "**Content Flagged by LLM**\n\
             Path: {}\n\
             Decision: {}\n\
             Reason: {}\n\
             Original Poster: {} (`{}`)\n\
             Reactor: `{}`\n\
             Comment: ```{}```\n\
             Original Content: ```{}```\n\
             Message: {}",
            path.label(),
            outcome.decision,
            outcome.reason,
            message.author.name,
            message.author.id.get(),
            reactor.get(),
            comment_snippet,
            content_snippet,
            guildmind_core::types::jump_url(
                self.guild_id,
                message.channel_id.get(),
                message.id.get()
            ),
        );
        if let Err(e) = safe_dm(
            &self.http,
            &self.rl,
            UserId::new(self.discord.admin_user_id),
            &body,
        )
        .await
        {
            warn!(error = %e, "admin flag DM failed");
        }
    }

    async fn dm_reactor(&self, reactor: UserId, content: &str) {
        if let Err(e) = self.try_dm_reactor(reactor, content).await {
            warn!(reactor_id = reactor.get(), error = %e, "reactor DM failed");
        }
    }

    async fn try_dm_reactor(
        &self,
        reactor: UserId,
        content: &str,
    ) -> Result<(), guildmind_discord::DiscordError> {
        safe_dm(&self.http, &self.rl, reactor, content).await.map(|_| ())
    }
}
