use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serenity::builder::{CreateActionRow, CreateButton, CreateMessage};
use serenity::http::Http;
use serenity::model::application::ButtonStyle;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::id::{ChannelId, MessageId, UserId};
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use guildmind_core::config::{LlmSettings, DIALOG_TIMEOUT_SECS};
use guildmind_discord::send::safe_dm;
use guildmind_discord::{fetch, RateLimiter};
use guildmind_llm::Dispatcher;
use guildmind_share::dialog::{consent_custom_id, ConsentChoice, DialogRegistry};
use guildmind_store::{records, Store};

use crate::classify;
use crate::error::CuratorError;
use crate::media;
use crate::png;

/// Context messages collected around the curated post: same author,
/// ±12 hours, capped.
const CONTEXT_HALF_WINDOW_HOURS: i64 = 12;
const CONTEXT_CAP: usize = 200;

/// The workflow file found on a post.
enum WorkflowSource {
    JsonAttachment { filename: String, bytes: Vec<u8> },
    PngMetadata { json: String },
}

pub struct Curator {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<DialogRegistry>,
    http: Arc<Http>,
    rl: Arc<RateLimiter>,
    llm: LlmSettings,
    client: reqwest::Client,
}

impl Curator {
    pub fn new(
        store: Arc<Store>,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<DialogRegistry>,
        http: Arc<Http>,
        rl: Arc<RateLimiter>,
        llm: LlmSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry,
            http,
            rl,
            llm,
            client: reqwest::Client::new(),
        }
    }

    /// Entry point, spawned per curator reaction.
    pub async fn handle_trigger(&self, channel_id: u64, message_id: u64, curator_id: u64) {
        if let Err(e) = self.run(channel_id, message_id, curator_id).await {
            warn!(message_id, error = %e, "curation aborted");
            let note = match e {
                CuratorError::NoWorkflow(_) => {
                    "No workflow found on that post (needs a .json attachment or a PNG with \
                     embedded workflow metadata)."
                        .to_string()
                }
                other => format!("Curation failed: {other}"),
            };
            let _ = safe_dm(&self.http, &self.rl, UserId::new(curator_id), &note).await;
        }
    }

    async fn run(
        &self,
        channel_id: u64,
        message_id: u64,
        curator_id: u64,
    ) -> Result<(), CuratorError> {
        let message = fetch::fetch_message(
            &self.http,
            &self.rl,
            ChannelId::new(channel_id),
            MessageId::new(message_id),
        )
        .await?;
        if message.author.bot {
            return Ok(());
        }

        let workflow = self
            .find_workflow(&message)
            .await?
            .ok_or(CuratorError::NoWorkflow(message_id))?;

        // Respect a standing refusal before any DM goes out.
        let author_id = message.author.id.get();
        let member = records::get_member(&self.store, author_id).await?;
        if member.as_ref().and_then(|m| m.permission_to_curate) == Some(false) {
            let _ = safe_dm(
                &self.http,
                &self.rl,
                UserId::new(curator_id),
                "The author has opted out of workflow curation.",
            )
            .await;
            return Ok(());
        }

        let already_granted =
            member.as_ref().and_then(|m| m.permission_to_curate) == Some(true);
        if !already_granted && !self.ask_author_consent(&message).await? {
            let _ = safe_dm(
                &self.http,
                &self.rl,
                UserId::new(curator_id),
                "The author declined workflow curation for this post.",
            )
            .await;
            return Ok(());
        }

        let asset_url = self
            .build_asset(&message, workflow)
            .await?;

        let note = format!("Your workflow has been added to the library: {asset_url}");
        let _ = safe_dm(&self.http, &self.rl, message.author.id, &note).await;
        let _ = safe_dm(
            &self.http,
            &self.rl,
            UserId::new(curator_id),
            &format!("Workflow curated: {asset_url}"),
        )
        .await;
        info!(message_id, "workflow curated");
        Ok(())
    }

    async fn find_workflow(
        &self,
        message: &DiscordMessage,
    ) -> Result<Option<WorkflowSource>, CuratorError> {
        for att in &message.attachments {
            let lower = att.filename.to_lowercase();
            if lower.ends_with(".json") {
                let bytes = self.download(&att.url).await?;
                if serde_json::from_slice::<serde_json::Value>(&bytes).is_ok() {
                    return Ok(Some(WorkflowSource::JsonAttachment {
                        filename: att.filename.clone(),
                        bytes,
                    }));
                }
            }
        }
        for att in &message.attachments {
            if att.filename.to_lowercase().ends_with(".png") {
                let bytes = self.download(&att.url).await?;
                if let Some(json) = png::extract_workflow(&bytes) {
                    return Ok(Some(WorkflowSource::PngMetadata { json }));
                }
            }
        }
        Ok(None)
    }

    /// Consent DM with Allow/Deny buttons, 6h timeout. Records the durable
    /// permission either way.
    async fn ask_author_consent(&self, message: &DiscordMessage) -> Result<bool, CuratorError> {
        let author = message.author.id;
        let dialog_id = Uuid::new_v4();
        let rx = self.registry.register_consent_waiter(&dialog_id);

        let dm = self
            .rl
            .execute(&format!("dm-open:{author}"), || async move {
                author.create_dm_channel(&*self.http).await
            })
            .await
            .map_err(guildmind_discord::DiscordError::Api)?;
        let dm_id = dm.id;

        let jump = message.link();
        let content = format!(
            "A curator would like to add the workflow from your post to the community library: \
             {jump}\n\nThe workflow file and its media would be publicly browsable. Is that okay?"
        );
        let buttons = CreateActionRow::Buttons(vec![
            CreateButton::new(consent_custom_id(&dialog_id, ConsentChoice::Allow))
                .label("Add it to the library")
                .style(ButtonStyle::Success),
            CreateButton::new(consent_custom_id(&dialog_id, ConsentChoice::Deny))
                .label("No thanks")
                .style(ButtonStyle::Danger),
        ]);

        self.rl
            .execute(&format!("send:{dm_id}"), || {
                let builder = CreateMessage::new()
                    .content(content.clone())
                    .components(vec![buttons.clone()]);
                async move { dm_id.send_message(&*self.http, builder).await }
            })
            .await
            .map_err(guildmind_discord::DiscordError::Api)?;

        match timeout(Duration::from_secs(DIALOG_TIMEOUT_SECS), rx).await {
            Ok(Ok(ConsentChoice::Allow)) => {
                records::set_member_prefs(
                    &self.store,
                    author.get(),
                    &message.author.name,
                    serde_json::json!({"permission_to_curate": true}),
                )
                .await?;
                Ok(true)
            }
            Ok(Ok(ConsentChoice::Deny)) => {
                records::set_member_prefs(
                    &self.store,
                    author.get(),
                    &message.author.name,
                    serde_json::json!({"permission_to_curate": false}),
                )
                .await?;
                Ok(false)
            }
            _ => {
                self.registry.cancel_consent_waiter(&dialog_id);
                Ok(false)
            }
        }
    }

    /// Upload workflow + media, classify, and record the asset rows.
    /// Returns the public workflow URL.
    async fn build_asset(
        &self,
        message: &DiscordMessage,
        workflow: WorkflowSource,
    ) -> Result<String, CuratorError> {
        let author_id = message.author.id.get();
        let message_id = message.id.get();
        let asset_id = Uuid::new_v4().to_string();

        let (workflow_filename, workflow_bytes, workflow_json) = match workflow {
            WorkflowSource::JsonAttachment { filename, bytes } => {
                let json = String::from_utf8_lossy(&bytes).to_string();
                (filename, bytes, json)
            }
            WorkflowSource::PngMetadata { json } => (
                format!("workflow-{message_id}.json"),
                json.clone().into_bytes(),
                json,
            ),
        };

        let workflow_path = format!("{author_id}/{message_id}/{workflow_filename}");
        let workflow_url = self
            .store
            .bucket("workflows")
            .upload(&workflow_path, workflow_bytes, "application/json")
            .await
            .map_err(CuratorError::Store)?;

        let classification =
            classify::classify_workflow(&self.dispatcher, &self.llm.classify_model, &workflow_json)
                .await;
        records::insert_asset(
            &self.store,
            &asset_id,
            author_id,
            message_id,
            &workflow_url,
            classification.as_ref().map(|(m, _)| m.as_str()),
            classification.as_ref().map(|(_, v)| v.as_str()),
        )
        .await?;

        // Media from the post plus the author's surrounding context posts.
        let mut media_messages = vec![message.clone()];
        let center = chrono::DateTime::<chrono::Utc>::from_timestamp(
            message.timestamp.unix_timestamp(),
            0,
        )
        .unwrap_or_else(chrono::Utc::now);
        let context = records::messages_by_author_around(
            &self.store,
            author_id,
            &center,
            ChronoDuration::hours(CONTEXT_HALF_WINDOW_HOURS),
            CONTEXT_CAP,
        )
        .await?;
        for ctx_msg in context {
            if ctx_msg.message_id == message_id || ctx_msg.attachments.is_empty() {
                continue;
            }
            if let Ok(live) = fetch::fetch_message(
                &self.http,
                &self.rl,
                ChannelId::new(ctx_msg.channel_id),
                MessageId::new(ctx_msg.message_id),
            )
            .await
            {
                media_messages.push(live);
            }
        }

        for msg in &media_messages {
            for att in &msg.attachments {
                let lower = att.filename.to_lowercase();
                if lower.ends_with(".json") {
                    continue;
                }
                let bytes = match self.download(&att.url).await {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(filename = %att.filename, error = %e, "media download failed");
                        continue;
                    }
                };

                let (filename, bytes, content_type) = if lower.ends_with(".gif") {
                    match media::gif_to_mp4(&bytes).await {
                        Ok(mp4) => (
                            media::mp4_filename(&att.filename),
                            mp4,
                            "video/mp4".to_string(),
                        ),
                        Err(e) => {
                            warn!(error = %e, "gif conversion failed, keeping original");
                            (att.filename.clone(), bytes, "image/gif".to_string())
                        }
                    }
                } else {
                    let content_type = att
                        .content_type
                        .clone()
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    (att.filename.clone(), bytes, content_type)
                };

                let path = format!("{author_id}/{message_id}/{filename}");
                match self
                    .store
                    .bucket("videos")
                    .upload(&path, bytes, &content_type)
                    .await
                {
                    Ok(url) => {
                        records::insert_asset_media(
                            &self.store,
                            &asset_id,
                            &url,
                            Some(&content_type),
                        )
                        .await?;
                    }
                    Err(e) => warn!(filename, error = %e, "media upload failed"),
                }
            }
        }

        Ok(workflow_url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CuratorError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }
}
