//! Builds the store, embedding provider and index registry from config.

use std::{str::FromStr, sync::Arc};

use {
    anyhow::Result,
    async_trait::async_trait,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tracing::{debug, warn},
};

use {
    mailsage_config::{MailsageConfig, SnapshotFormat},
    mailsage_index::{
        EMBEDDING_DIMENSIONS, EmbeddingProvider, IndexRegistry, IndexSettings,
        OpenAiEmbeddingProvider, PersistFormat, SqliteAccountStore,
    },
};

/// Resolve the database URL, defaulting to `~/.mailsage/mailsage.db`.
pub fn database_url(config: &MailsageConfig) -> Result<String> {
    if let Some(url) = &config.database.url {
        return Ok(url.clone());
    }
    let dir = mailsage_config::data_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(format!("sqlite://{}", dir.join("mailsage.db").display()))
}

pub async fn connect_store(config: &MailsageConfig) -> Result<SqliteAccountStore> {
    let url = database_url(config)?;
    debug!(url = %url, "opening account database");
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    SqliteAccountStore::init(&pool).await?;
    Ok(SqliteAccountStore::new(pool))
}

pub fn index_settings(config: &MailsageConfig) -> IndexSettings {
    IndexSettings {
        format: match config.index.format {
            SnapshotFormat::Json => PersistFormat::Json,
            SnapshotFormat::Binary => PersistFormat::Binary,
        },
        default_limit: config.index.default_limit,
        min_similarity: config.index.min_similarity,
        sync_concurrency: config.sync.concurrency,
    }
}

/// Stand-in used when no API key is configured. Text search keeps working;
/// vector search degrades to no results and sync reports every email failed.
struct UnconfiguredEmbedder;

#[async_trait]
impl EmbeddingProvider for UnconfiguredEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("no embeddings API key configured (set OPENAI_API_KEY or embeddings.api_key)")
    }

    fn model_name(&self) -> &str {
        "unconfigured"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

pub fn embedder(config: &MailsageConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let cfg = &config.embeddings;
    if cfg.dimensions != EMBEDDING_DIMENSIONS {
        anyhow::bail!(
            "embeddings.dimensions is {}, but the account index stores {EMBEDDING_DIMENSIONS}-dimensional vectors",
            cfg.dimensions
        );
    }

    let api_key = cfg
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    let Some(api_key) = api_key else {
        warn!("no embeddings API key configured, semantic search is disabled");
        return Ok(Arc::new(UnconfiguredEmbedder));
    };

    let mut provider =
        OpenAiEmbeddingProvider::new(api_key).with_model(cfg.model.clone(), cfg.dimensions);
    if let Some(url) = &cfg.base_url {
        provider = provider.with_base_url(url.clone());
    }
    Ok(Arc::new(provider))
}

pub async fn registry(config: &MailsageConfig) -> Result<IndexRegistry> {
    let store = connect_store(config).await?;
    Ok(IndexRegistry::new(
        Arc::new(store),
        embedder(config)?,
        index_settings(config),
    ))
}
