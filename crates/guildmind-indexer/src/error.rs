use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] guildmind_store::error::StoreError),

    #[error("discord error: {0}")]
    Discord(#[from] guildmind_discord::DiscordError),

    #[error("message {0} not indexed")]
    MessageMissing(u64),
}
