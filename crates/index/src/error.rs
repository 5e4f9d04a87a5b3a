use thiserror::Error;

/// Errors surfaced by the account index manager and the search index engine.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("account not found: {account_id}")]
    NotFound { account_id: String },

    #[error("index not initialized; call initialize() first")]
    NotInitialized,

    #[error("document does not match index schema: {0}")]
    SchemaMismatch(String),

    #[error("account store unavailable: {0}")]
    StorageUnavailable(#[source] anyhow::Error),

    #[error("index snapshot is corrupt: {0}")]
    Corrupt(String),

    #[error("embedding provider failed: {0}")]
    EmbeddingProvider(#[source] anyhow::Error),
}

impl IndexError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    /// Whether the failure came from the storage layer and may succeed on retry.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
