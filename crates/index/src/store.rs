//! Storage abstraction for accounts and their persisted index snapshots.
use async_trait::async_trait;

/// An account row as seen by the index manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub id: String,
    pub email_address: Option<String>,
    /// Serialized search index, absent until the first initialization.
    pub binary_index: Option<Vec<u8>>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account; `Ok(None)` when the id is unknown.
    async fn find_account(&self, account_id: &str) -> anyhow::Result<Option<AccountRecord>>;

    /// Replace the account's snapshot in a single write.
    async fn write_snapshot(&self, account_id: &str, snapshot: &[u8]) -> anyhow::Result<()>;
}
