use std::sync::{Arc, OnceLock};

use chrono::Utc;
use serenity::async_trait;
use serenity::builder::CreateInteractionResponse;
use serenity::model::application::Interaction;
use serenity::model::channel::{Message, Reaction, ReactionType};
use serenity::model::event::{MessageUpdateEvent, ResumedEvent};
use serenity::model::gateway::Ready;
use serenity::model::guild::Member as GuildMember;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::prelude::{Context, EventHandler};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use guildmind_agent::AgentRunner;
use guildmind_core::types::Channel;
use guildmind_curator::Curator;
use guildmind_discord::send::send_chunked;
use guildmind_discord::{ConnectionMonitor, RateLimiter};
use guildmind_indexer::adapter;
use guildmind_indexer::{IndexEvent, Indexer};
use guildmind_share::flow::ShareTrigger;
use guildmind_share::{DialogRegistry, ShareFlow};

/// Everything the event handler needs, wired after the client exists.
pub struct HandlerDeps {
    pub monitor: Arc<ConnectionMonitor>,
    pub registry: Arc<DialogRegistry>,
    pub indexer: Arc<Indexer>,
    pub share: Arc<ShareFlow>,
    pub curator: Arc<Curator>,
    pub agent: Arc<AgentRunner>,
    pub rl: Arc<RateLimiter>,
    pub event_tx: mpsc::Sender<IndexEvent>,
    pub guild_id: u64,
    pub admin_user_id: u64,
    pub share_emoji: String,
    pub curator_emoji: String,
}

/// serenity event handler: adapts gateway events and fans them out to the
/// indexer queue and the interactive flows. Long work always runs on
/// spawned tasks so the gateway task never blocks.
pub struct GatewayHandler {
    deps: Arc<OnceLock<Arc<HandlerDeps>>>,
}

impl GatewayHandler {
    pub fn new() -> (Self, Arc<OnceLock<Arc<HandlerDeps>>>) {
        let slot = Arc::new(OnceLock::new());
        (
            Self {
                deps: Arc::clone(&slot),
            },
            slot,
        )
    }

    fn deps(&self) -> Option<&Arc<HandlerDeps>> {
        self.deps.get()
    }
}

#[async_trait]
impl EventHandler for GatewayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(name = %ready.user.name, "gateway READY");
        if let Some(deps) = self.deps() {
            deps.indexer.set_bot_id(ready.user.id.get());
            deps.monitor.on_ready(Some(ready.session_id.clone()));
        }
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        if let Some(deps) = self.deps() {
            deps.monitor.on_resumed();
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(deps) = self.deps() else { return };
        if msg.author.bot {
            return;
        }

        let Some(guild_id) = msg.guild_id else {
            self.handle_dm(deps, &ctx, &msg).await;
            return;
        };

        let channel = channel_meta(&ctx, guild_id, msg.channel_id);
        let event = IndexEvent::MessageCreate {
            message: Box::new(adapter::message_from_discord(&msg, deps.guild_id, Utc::now())),
            channel,
            author: adapter::member_from_user(&msg.author),
        };
        // Bounded queue: when full this await is the backpressure point.
        if deps.event_tx.send(event).await.is_err() {
            warn!("index event queue closed");
        }
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let Some(deps) = self.deps() else { return };
        let update = IndexEvent::MessageUpdate {
            message_id: event.id.get(),
            content: event.content.clone().unwrap_or_default(),
            edited_at: event
                .edited_timestamp
                .and_then(|t| chrono::DateTime::from_timestamp(t.unix_timestamp(), 0)),
            embeds: event
                .embeds
                .unwrap_or_default()
                .iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .collect(),
        };
        let _ = deps.event_tx.send(update).await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        _channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        let Some(deps) = self.deps() else { return };
        let _ = deps
            .event_tx
            .send(IndexEvent::MessageDelete {
                message_id: deleted_message_id.get(),
            })
            .await;
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        let Some(deps) = self.deps() else { return };
        let Some(user_id) = reaction.user_id.map(|u| u.get()) else {
            return;
        };

        let emoji_name = emoji_name(&reaction.emoji);

        // The share/curator emojis trigger their flows in addition to the
        // plain reaction index write.
        if user_id != deps.indexer.bot_id() {
            if emoji_name == deps.share_emoji {
                let share = Arc::clone(&deps.share);
                let trigger = ShareTrigger {
                    channel_id: reaction.channel_id.get(),
                    message_id: reaction.message_id.get(),
                    reactor_id: user_id,
                };
                tokio::spawn(async move { share.handle_trigger(trigger).await });
            } else if emoji_name == deps.curator_emoji {
                let curator = Arc::clone(&deps.curator);
                let channel_id = reaction.channel_id.get();
                let message_id = reaction.message_id.get();
                tokio::spawn(async move {
                    curator.handle_trigger(channel_id, message_id, user_id).await
                });
            }
        }

        let _ = deps
            .event_tx
            .send(IndexEvent::ReactionAdd {
                message_id: reaction.message_id.get(),
                channel_id: reaction.channel_id.get(),
                user_id,
            })
            .await;
    }

    async fn reaction_remove(&self, _ctx: Context, reaction: Reaction) {
        let Some(deps) = self.deps() else { return };
        let Some(user_id) = reaction.user_id.map(|u| u.get()) else {
            return;
        };
        let _ = deps
            .event_tx
            .send(IndexEvent::ReactionRemove {
                message_id: reaction.message_id.get(),
                user_id,
            })
            .await;
    }

    async fn guild_member_update(
        &self,
        _ctx: Context,
        _old: Option<GuildMember>,
        new: Option<GuildMember>,
        _event: serenity::model::event::GuildMemberUpdateEvent,
    ) {
        let Some(deps) = self.deps() else { return };
        let Some(member) = new else { return };
        let _ = deps
            .event_tx
            .send(IndexEvent::MemberUpdate {
                member: Box::new(adapter::member_from_guild_member(&member)),
            })
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Some(deps) = self.deps() else { return };
        if let Interaction::Component(component) = interaction {
            if deps.registry.deliver_consent(&component.data.custom_id) {
                let _ = component
                    .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                    .await;
            } else {
                debug!(custom_id = %component.data.custom_id, "unrouted component interaction");
            }
        }
    }
}

impl GatewayHandler {
    async fn handle_dm(&self, deps: &Arc<HandlerDeps>, ctx: &Context, msg: &Message) {
        let user_id = msg.author.id.get();

        // A pending share dialog owns this user's next DM.
        if deps.registry.deliver_comment(user_id, &msg.content) {
            debug!(user_id, "DM consumed by dialog");
            return;
        }

        if user_id != deps.admin_user_id {
            return;
        }

        let agent = Arc::clone(&deps.agent);
        let rl = Arc::clone(&deps.rl);
        let http = Arc::clone(&ctx.http);
        let channel_id = msg.channel_id;
        let content = msg.content.clone();

        tokio::spawn(async move {
            match agent.handle_message(user_id, &content).await {
                Ok(Some(replies)) => {
                    for reply in replies {
                        if let Err(e) = send_chunked(&http, &rl, channel_id, &reply).await {
                            warn!(error = %e, "agent reply send failed");
                        }
                    }
                }
                Ok(None) => debug!("agent ended turn silently"),
                Err(e) => {
                    warn!(error = %e, "agent turn failed");
                    let _ = send_chunked(
                        &http,
                        &rl,
                        channel_id,
                        "Something went wrong handling that. Please try again.",
                    )
                    .await;
                }
            }
        });
    }
}

fn emoji_name(emoji: &ReactionType) -> String {
    match emoji {
        ReactionType::Unicode(s) => s.clone(),
        ReactionType::Custom { name, .. } => name.clone().unwrap_or_default(),
        _ => String::new(),
    }
}

fn channel_meta(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> Option<Channel> {
    let guild = ctx.cache.guild(guild_id)?;
    let channel = guild.channels.get(&channel_id)?;
    Some(Channel {
        channel_id: channel_id.get(),
        name: channel.name.clone(),
        category_id: channel.parent_id.map(|p| p.get()),
        nsfw: channel.nsfw,
        ..Default::default()
    })
}
