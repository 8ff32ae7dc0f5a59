use std::sync::Arc;

use serenity::http::Http;

use guildmind_discord::{ConnectionMonitor, RateLimiter};
use guildmind_share::ShareFlow;
use guildmind_store::Store;

/// Dependencies every tool may reach. Assembled once in the daemon and
/// shared across tool executions.
pub struct AgentContext {
    pub store: Arc<Store>,
    pub http: Arc<Http>,
    pub rl: Arc<RateLimiter>,
    pub share: Arc<ShareFlow>,
    pub monitor: Arc<ConnectionMonitor>,
    pub guild_id: u64,
}
