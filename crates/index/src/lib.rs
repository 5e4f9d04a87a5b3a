//! Per-account email index: emails → embedded → in-process hybrid index,
//! persisted as one snapshot blob on the account row.

pub mod config;
pub mod embeddings;
pub mod embeddings_openai;
pub mod engine;
pub mod error;
pub mod manager;
pub mod registry;
pub mod schema;
pub mod store;
pub mod store_sqlite;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use {
    config::IndexSettings,
    embeddings::EmbeddingProvider,
    embeddings_openai::OpenAiEmbeddingProvider,
    engine::{PersistFormat, SearchHit, SearchResults},
    error::IndexError,
    manager::AccountIndexManager,
    registry::{IndexRegistry, SharedManager},
    schema::{EMBEDDING_DIMENSIONS, EmailDocument},
    store::{AccountRecord, AccountStore},
    store_sqlite::SqliteAccountStore,
    sync::{EmailMessage, SyncReport, sync_emails},
};
