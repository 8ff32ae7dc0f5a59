use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuildmindError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Discord error: {0}")]
    Discord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timeout after {secs}s")]
    Timeout { secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuildmindError {
    /// Short error code string used in admin alerts and system log rows.
    pub fn code(&self) -> &'static str {
        match self {
            GuildmindError::Config(_) => "CONFIG_ERROR",
            GuildmindError::AuthFailed(_) => "AUTH_FAILED",
            GuildmindError::Store(_) => "STORE_ERROR",
            GuildmindError::LlmProvider(_) => "LLM_PROVIDER_ERROR",
            GuildmindError::Discord(_) => "DISCORD_ERROR",
            GuildmindError::Serialization(_) => "SERIALIZATION_ERROR",
            GuildmindError::Io(_) => "IO_ERROR",
            GuildmindError::Timeout { .. } => "TIMEOUT",
            GuildmindError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GuildmindError>;
