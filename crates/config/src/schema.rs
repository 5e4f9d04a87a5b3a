//! Config schema types (database, embeddings, index, sync).
use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailsageConfig {
    pub database: DatabaseConfig,
    pub embeddings: EmbeddingsConfig,
    pub index: IndexConfig,
    pub sync: SyncConfig,
}

/// Placeholder printed in place of secrets.
pub const REDACTED: &str = "[REDACTED]";

impl MailsageConfig {
    /// A copy safe to display: API keys are replaced by [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.embeddings.api_key.is_some() {
            copy.embeddings.api_key = Some(REDACTED.to_string());
        }
        copy
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL. When unset, `mailsage.db` in the data directory is used.
    pub url: Option<String>,
}

/// Embedding provider settings (any OpenAI-compatible endpoint).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingsConfig {
    /// API key; `OPENAI_API_KEY` is used when unset.
    pub api_key: Option<String>,

    /// Override the base URL (e.g. a DeepSeek or local gateway).
    pub base_url: Option<String>,

    pub model: String,

    /// Must match the index schema's vector length.
    pub dimensions: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "text-embedding-3-small".into(),
            dimensions: 1536,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Json,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Encoding of the snapshot stored on each account row.
    pub format: SnapshotFormat,

    /// Hits returned when a search does not ask for a specific number.
    pub default_limit: usize,

    /// Drop vector hits below this cosine similarity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            format: SnapshotFormat::Json,
            default_limit: 10,
            min_similarity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Embedding requests allowed in flight during a sync batch.
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}
