use thiserror::Error;

#[derive(Debug, Error)]
pub enum CuratorError {
    #[error("store error: {0}")]
    Store(#[from] guildmind_store::error::StoreError),

    #[error("discord error: {0}")]
    Discord(#[from] guildmind_discord::DiscordError),

    #[error("download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("no workflow found on message {0}")]
    NoWorkflow(u64),

    #[error("media conversion failed: {0}")]
    Conversion(String),
}
