use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm error: {0}")]
    Llm(#[from] guildmind_llm::ProviderError),

    #[error("store error: {0}")]
    Store(#[from] guildmind_store::error::StoreError),
}
