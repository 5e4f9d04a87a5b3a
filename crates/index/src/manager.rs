//! Account index manager: owns one account's search index, restores it
//! lazily from the account store and writes a full snapshot back after every
//! mutation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::IndexSettings,
    embeddings::EmbeddingProvider,
    engine::{SearchIndex, SearchResults, TextQuery, VectorQuery},
    error::{IndexError, Result},
    schema::{EMBEDDING_DIMENSIONS, EMBEDDINGS_FIELD, EmailDocument, IndexSchema},
    store::AccountStore,
    sync::EmailMessage,
};

/// Mediates every read and write of a single account's index.
///
/// Not meant to be shared between concurrent operations directly; wrap it in
/// [`crate::registry::IndexRegistry`] when several tasks touch one account.
pub struct AccountIndexManager {
    account_id: String,
    store: Arc<dyn AccountStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: IndexSettings,
    index: Option<SearchIndex>,
}

impl AccountIndexManager {
    pub fn new(
        account_id: impl Into<String>,
        store: Arc<dyn AccountStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            store,
            embedder,
            settings,
            index: None,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    /// Number of indexed emails; zero before initialization.
    pub fn document_count(&self) -> usize {
        self.index.as_ref().map_or(0, SearchIndex::len)
    }

    /// Load the account's index, creating and persisting an empty one if the
    /// account has never been indexed. No-op when already initialized.
    pub async fn initialize(&mut self) -> Result<()> {
        if self.index.is_some() {
            return Ok(());
        }

        let account = self
            .store
            .find_account(&self.account_id)
            .await
            .map_err(IndexError::StorageUnavailable)?
            .ok_or_else(|| IndexError::NotFound {
                account_id: self.account_id.clone(),
            })?;

        let index = match account.binary_index {
            Some(bytes) if !bytes.is_empty() => {
                let index = SearchIndex::restore(&bytes)?;
                info!(
                    account_id = %self.account_id,
                    documents = index.len(),
                    "restored account index"
                );
                index
            },
            _ => {
                let index = SearchIndex::create(IndexSchema::email());
                let snapshot = index.persist(self.settings.format)?;
                self.write_snapshot(&snapshot).await?;
                info!(account_id = %self.account_id, "created empty account index");
                index
            },
        };

        self.index = Some(index);
        Ok(())
    }

    /// Append an email and persist the whole index. Initializes on first use.
    ///
    /// A document that violates the schema is rejected before anything
    /// changes. If the snapshot write fails the in-memory index keeps the
    /// document while the stored copy does not.
    pub async fn insert(&mut self, document: EmailDocument) -> Result<String> {
        self.initialize().await?;
        let index = self.index.as_mut().ok_or(IndexError::NotInitialized)?;
        let id = index.insert(document.into_document())?;
        debug!(account_id = %self.account_id, id = %id, "inserted email into index");
        self.save_index().await?;
        Ok(id)
    }

    /// Embed a provider message and insert it. Embedding failures propagate
    /// as [`IndexError::EmbeddingProvider`]; nothing is inserted in that case.
    pub async fn insert_message(&mut self, message: EmailMessage) -> Result<String> {
        let vector = self
            .embedder
            .embed(&message.embedding_payload())
            .await
            .map_err(IndexError::EmbeddingProvider)?;
        self.insert(message.into_document(vector)).await
    }

    /// Rank emails by similarity to `prompt`.
    ///
    /// Embedding failures are logged and yield an empty result instead of an
    /// error, so the chat flow continues without context.
    pub async fn vector_search(
        &self,
        prompt: &str,
        limit: Option<usize>,
    ) -> Result<SearchResults<EmailDocument>> {
        let index = self.ready()?;

        let vector = match self.embedder.embed(prompt).await {
            Ok(v) if v.len() == EMBEDDING_DIMENSIONS => v,
            Ok(v) => {
                warn!(
                    account_id = %self.account_id,
                    dimensions = v.len(),
                    "prompt embedding has wrong dimensionality, returning no results"
                );
                return Ok(SearchResults::empty());
            },
            Err(e) => {
                warn!(
                    account_id = %self.account_id,
                    error = %e,
                    "prompt embedding failed, returning no results"
                );
                return Ok(SearchResults::empty());
            },
        };

        let results = index.search_vector(&VectorQuery {
            vector,
            property: EMBEDDINGS_FIELD.to_string(),
            limit: limit.unwrap_or(self.settings.default_limit),
            min_similarity: self.settings.min_similarity,
        })?;
        debug!(account_id = %self.account_id, count = results.count, "vector search");
        results.try_map(|doc| EmailDocument::from_document(&doc))
    }

    /// Full-text search over every string field with the default limit.
    pub async fn search(&self, term: &str) -> Result<SearchResults<EmailDocument>> {
        self.search_with_limit(term, self.settings.default_limit)
            .await
    }

    pub async fn search_with_limit(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<SearchResults<EmailDocument>> {
        let index = self.ready()?;
        let results = index.search(&TextQuery {
            term: term.to_string(),
            limit,
        });
        debug!(account_id = %self.account_id, count = results.count, "text search");
        results.try_map(|doc| EmailDocument::from_document(&doc))
    }

    /// Serialize the full index and overwrite the account's snapshot.
    pub async fn save_index(&self) -> Result<()> {
        let snapshot = self.ready()?.persist(self.settings.format)?;
        self.write_snapshot(&snapshot).await
    }

    fn ready(&self) -> Result<&SearchIndex> {
        self.index.as_ref().ok_or(IndexError::NotInitialized)
    }

    async fn write_snapshot(&self, snapshot: &[u8]) -> Result<()> {
        self.store
            .write_snapshot(&self.account_id, snapshot)
            .await
            .map_err(IndexError::StorageUnavailable)
    }
}
