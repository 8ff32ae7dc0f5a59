use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Network trouble, 5xx or 429 — safe to retry with backoff.
    #[error("transient store error: {0}")]
    Transient(String),

    /// 4xx-class validation failure — retrying cannot help.
    #[error("store validation error: {0}")]
    Validation(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("object store error: {0}")]
    Object(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sql(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        // Connection-level reqwest failures are retryable by policy.
        StoreError::Transient(e.to_string())
    }
}
