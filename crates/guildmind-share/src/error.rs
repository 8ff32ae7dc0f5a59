use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("store error: {0}")]
    Store(#[from] guildmind_store::error::StoreError),

    #[error("discord error: {0}")]
    Discord(#[from] guildmind_discord::DiscordError),

    #[error("message {0} has no attachments to share")]
    NoMedia(u64),

    #[error("share refused: {0}")]
    Refused(String),
}
