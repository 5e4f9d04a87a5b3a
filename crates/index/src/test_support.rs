//! Fakes shared by the unit tests of this crate.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    embeddings::EmbeddingProvider,
    schema::{EMBEDDING_DIMENSIONS, EmailDocument},
    store::{AccountRecord, AccountStore},
};

const KEYWORDS: &[&str] = &[
    "invoice", "payment", "team", "offsite", "travel", "meeting", "contract", "lunch",
];

/// Deterministic embedder: one dimension per known keyword plus a small
/// constant component so no vector has zero norm.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub fail_on: Option<&'static str>,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
        for (i, kw) in KEYWORDS.iter().enumerate() {
            if text.contains(kw) {
                v[i] = 1.0;
            }
        }
        v[EMBEDDING_DIMENSIONS - 1] = 0.1;
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = self.fail_on
            && text.contains(marker)
        {
            anyhow::bail!("embedding refused for {marker}");
        }
        Ok(self.vector(text))
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding provider unreachable")
    }

    fn model_name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }
}

/// In-memory account store that counts calls and can be told to fail writes.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<String, Option<Vec<u8>>>>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl MemoryAccountStore {
    pub fn with_accounts(ids: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut accounts = store.accounts.lock().unwrap();
            for id in ids {
                accounts.insert(id.to_string(), None);
            }
        }
        store
    }

    pub fn snapshot(&self, id: &str) -> Option<Vec<u8>> {
        self.accounts.lock().unwrap().get(id).cloned().flatten()
    }

    pub fn put_snapshot(&self, id: &str, bytes: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(id.to_string(), Some(bytes));
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_account(&self, account_id: &str) -> anyhow::Result<Option<AccountRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(account_id)
            .map(|snapshot| AccountRecord {
                id: account_id.to_string(),
                email_address: None,
                binary_index: snapshot.clone(),
            }))
    }

    async fn write_snapshot(&self, account_id: &str, snapshot: &[u8]) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        let mut accounts = self.accounts.lock().unwrap();
        let Some(slot) = accounts.get_mut(account_id) else {
            anyhow::bail!("account {account_id} does not exist");
        };
        *slot = Some(snapshot.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn email(title: &str, body: &str, thread_id: &str, embeddings: Vec<f32>) -> EmailDocument {
    EmailDocument {
        title: title.to_string(),
        body: body.to_string(),
        raw_body: body.chars().take(40).collect(),
        from: "Sender <sender@example.com>".to_string(),
        to: vec!["Recipient <rcpt@example.com>".to_string()],
        sent_at: "1/2/2025, 10:00:00 AM".to_string(),
        embeddings,
        thread_id: thread_id.to_string(),
    }
}
