//! Process-wide owner of account index managers.
//!
//! Every caller touching an account goes through the same
//! [`AccountIndexManager`], guarded by an async mutex, so a chat request and a
//! sync batch for one account can no longer each hold a private copy of the
//! index and overwrite one another's snapshot.

use std::{collections::HashMap, sync::Arc};

use {
    tokio::sync::{Mutex, RwLock},
    tracing::debug,
};

use crate::{
    config::IndexSettings, embeddings::EmbeddingProvider, error::Result,
    manager::AccountIndexManager, store::AccountStore,
};

pub type SharedManager = Arc<Mutex<AccountIndexManager>>;

pub struct IndexRegistry {
    store: Arc<dyn AccountStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: IndexSettings,
    managers: RwLock<HashMap<String, SharedManager>>,
}

impl IndexRegistry {
    pub fn new(
        store: Arc<dyn AccountStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            settings,
            managers: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    /// The shared manager for `account_id`, created uninitialized on first use.
    pub async fn manager(&self, account_id: &str) -> SharedManager {
        if let Some(existing) = self.managers.read().await.get(account_id) {
            return Arc::clone(existing);
        }
        let mut managers = self.managers.write().await;
        Arc::clone(managers.entry(account_id.to_string()).or_insert_with(|| {
            debug!(account_id, "creating account index manager");
            Arc::new(Mutex::new(AccountIndexManager::new(
                account_id,
                Arc::clone(&self.store),
                Arc::clone(&self.embedder),
                self.settings.clone(),
            )))
        }))
    }

    /// Like [`IndexRegistry::manager`], but initialized before it is returned.
    ///
    /// A failed initialization drops the cached entry again, so unknown
    /// account ids do not accumulate.
    pub async fn open(&self, account_id: &str) -> Result<SharedManager> {
        let manager = self.manager(account_id).await;
        let result = manager.lock().await.initialize().await;
        if let Err(e) = result {
            self.discard_uninitialized(account_id, &manager).await;
            return Err(e);
        }
        Ok(manager)
    }

    async fn discard_uninitialized(&self, account_id: &str, manager: &SharedManager) {
        let mut managers = self.managers.write().await;
        let Some(cached) = managers.get(account_id) else {
            return;
        };
        // A manager locked by someone else is in use; leave it cached.
        let unused = manager.try_lock().is_ok_and(|m| !m.is_initialized());
        if Arc::ptr_eq(cached, manager) && unused {
            managers.remove(account_id);
            debug!(account_id, "dropped manager after failed initialization");
        }
    }

    /// Drop the cached manager so the next caller reloads from the store.
    pub async fn evict(&self, account_id: &str) -> bool {
        self.managers.write().await.remove(account_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.managers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.managers.read().await.is_empty()
    }
}
