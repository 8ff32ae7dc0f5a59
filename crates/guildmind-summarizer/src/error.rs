use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("store error: {0}")]
    Store(#[from] guildmind_store::error::StoreError),

    #[error("discord error: {0}")]
    Discord(#[from] guildmind_discord::DiscordError),

    #[error("llm error: {0}")]
    Llm(#[from] guildmind_llm::ProviderError),

    /// Unparseable LLM output after the retry. The raw payload travels
    /// with the error so it can be stored on the failed summary row.
    #[error("summary output invalid: {reason}")]
    InvalidOutput { reason: String, raw: String },
}
