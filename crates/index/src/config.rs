use crate::engine::PersistFormat;

/// Runtime settings for account index managers.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Encoding used when writing and restoring snapshots.
    pub format: PersistFormat,
    /// Result limit applied when a caller does not pass one.
    pub default_limit: usize,
    /// Cosine similarity floor for vector search hits. `None` keeps every hit.
    pub min_similarity: Option<f32>,
    /// Maximum embedding requests in flight during a sync batch.
    pub sync_concurrency: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            format: PersistFormat::Json,
            default_limit: 10,
            min_similarity: None,
            sync_concurrency: 10,
        }
    }
}
