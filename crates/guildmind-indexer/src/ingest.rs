use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use guildmind_core::types::{Channel, Member, Message};
use guildmind_discord::RateLimiter;
use guildmind_store::{records, Store};

use crate::adapter;
use crate::batch::WriteBatcher;
use crate::breaker::CircuitBreaker;
use crate::error::IndexError;

/// One gateway observation, already adapted to internal types.
#[derive(Debug)]
pub enum IndexEvent {
    MessageCreate {
        message: Box<Message>,
        channel: Option<Channel>,
        author: Member,
    },
    MessageUpdate {
        message_id: u64,
        content: String,
        edited_at: Option<DateTime<Utc>>,
        embeds: Vec<serde_json::Value>,
    },
    MessageDelete {
        message_id: u64,
    },
    ReactionAdd {
        message_id: u64,
        channel_id: u64,
        user_id: u64,
    },
    ReactionRemove {
        message_id: u64,
        user_id: u64,
    },
    MemberUpdate {
        member: Box<Member>,
    },
}

/// Consumes the gateway event stream and reflects it into the store.
pub struct Indexer {
    store: Arc<Store>,
    http: Arc<Http>,
    rl: Arc<RateLimiter>,
    guild_id: u64,
    bot_id: AtomicU64,
    batcher: WriteBatcher,
    breaker: Arc<CircuitBreaker>,
}

impl Indexer {
    pub fn new(
        store: Arc<Store>,
        http: Arc<Http>,
        rl: Arc<RateLimiter>,
        guild_id: u64,
        alerts: mpsc::Sender<String>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new("quarantine.jsonl"));
        let batcher = WriteBatcher::spawn(Arc::clone(&store), Arc::clone(&breaker), alerts);
        Self {
            store,
            http,
            rl,
            guild_id,
            bot_id: AtomicU64::new(0),
            batcher,
            breaker,
        }
    }

    pub fn set_bot_id(&self, id: u64) {
        self.bot_id.store(id, Ordering::Relaxed);
    }

    pub fn bot_id(&self) -> u64 {
        self.bot_id.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Drive the event queue until the sender side closes. Within a channel
    /// events arrive in gateway order and are not reordered here.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<IndexEvent>) {
        info!("indexer started");
        while let Some(event) = rx.recv().await {
            // An open breaker pauses consumption; the bounded queue pushes
            // backpressure toward the gateway.
            if let Some(pause) = self.breaker.pause_remaining() {
                warn!(secs = pause.as_secs(), "ingestion paused by circuit breaker");
                tokio::time::sleep(pause).await;
            }

            if let Err(e) = self.apply(event).await {
                warn!(error = %e, "event apply failed");
                if self.breaker.record_failure() {
                    warn!("breaker tripped from event apply path");
                }
            } else {
                self.breaker.record_success();
            }
        }
        info!("indexer stopped (event stream closed)");
    }

    async fn apply(&self, event: IndexEvent) -> Result<(), IndexError> {
        match event {
            IndexEvent::MessageCreate {
                message,
                channel,
                author,
            } => {
                if let Some(ch) = channel {
                    records::upsert_channel_identity(&self.store, &ch).await?;
                }
                records::upsert_member_identity(&self.store, &author).await?;
                self.batcher.push(*message).await;
            }
            IndexEvent::MessageUpdate {
                message_id,
                content,
                edited_at,
                embeds,
            } => {
                records::update_message_edit(&self.store, message_id, &content, edited_at, &embeds)
                    .await?;
            }
            IndexEvent::MessageDelete { message_id } => {
                records::mark_message_deleted(&self.store, message_id).await?;
            }
            IndexEvent::ReactionAdd {
                message_id,
                channel_id,
                user_id,
            } => {
                let applied = records::apply_reaction(
                    &self.store,
                    message_id,
                    user_id,
                    true,
                    self.bot_id(),
                )
                .await?;
                if !applied {
                    // Reaction on a message we never saw (pre-dates the
                    // bot); pull it over REST, then replay the reaction.
                    debug!(message_id, "reaction for unindexed message, fetching");
                    self.index_from_rest(channel_id, message_id).await?;
                    records::apply_reaction(
                        &self.store,
                        message_id,
                        user_id,
                        true,
                        self.bot_id(),
                    )
                    .await?;
                }
            }
            IndexEvent::ReactionRemove {
                message_id,
                user_id,
            } => {
                records::apply_reaction(&self.store, message_id, user_id, false, self.bot_id())
                    .await?;
            }
            IndexEvent::MemberUpdate { member } => {
                records::upsert_member_identity(&self.store, &member).await?;
            }
        }
        Ok(())
    }

    /// Fetch one live message over REST and upsert it.
    pub async fn index_from_rest(
        &self,
        channel_id: u64,
        message_id: u64,
    ) -> Result<Message, IndexError> {
        let live = guildmind_discord::fetch::fetch_message(
            &self.http,
            &self.rl,
            ChannelId::new(channel_id),
            MessageId::new(message_id),
        )
        .await?;
        let msg = adapter::message_from_discord(&live, self.guild_id, Utc::now());
        records::upsert_member_identity(&self.store, &adapter::member_from_user(&live.author))
            .await?;
        records::upsert_messages(&self.store, std::slice::from_ref(&msg)).await?;
        Ok(msg)
    }
}
