//! Index half of the mail sync: embed each email with bounded fan-out, then
//! insert the results one at a time through the account's shared manager.

use std::{fmt, sync::Arc};

use {
    chrono::DateTime,
    futures::{StreamExt, stream},
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use crate::{error::Result, registry::IndexRegistry, schema::EmailDocument};

/// An email as delivered by the mail provider's sync API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub body_snippet: Option<String>,
    pub from: EmailAddress,
    #[serde(default)]
    pub to: Vec<EmailAddress>,
    /// RFC 3339 timestamp.
    pub sent_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    pub address: String,
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Outcome of one sync batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub indexed: usize,
    /// Ids of emails skipped because their embedding could not be computed.
    pub failed: Vec<String>,
}

impl EmailMessage {
    fn body_text(&self) -> &str {
        self.body
            .as_deref()
            .or(self.body_snippet.as_deref())
            .unwrap_or_default()
    }

    fn recipients(&self) -> Vec<String> {
        self.to.iter().map(ToString::to_string).collect()
    }

    /// Text sent to the embedding provider for this email.
    pub fn embedding_payload(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nBody: {}\n SentAt: {}",
            self.from,
            self.recipients().join(", "),
            self.subject,
            self.body_text(),
            display_timestamp(&self.sent_at)
        )
    }

    pub fn into_document(self, embeddings: Vec<f32>) -> EmailDocument {
        EmailDocument {
            title: self.subject.clone(),
            body: self.body_text().to_string(),
            raw_body: self.body_snippet.clone().unwrap_or_default(),
            from: self.from.to_string(),
            to: self.recipients(),
            sent_at: display_timestamp(&self.sent_at),
            embeddings,
            thread_id: self.thread_id,
        }
    }
}

/// Render an RFC 3339 timestamp as `M/D/YYYY, h:mm:ss AM` in its own offset.
/// Unparseable input is returned unchanged.
pub fn display_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Embed and index a batch of emails for one account.
///
/// At most `sync_concurrency` embedding requests run at once. Emails whose
/// embedding fails are skipped and reported; any index or storage error
/// aborts the batch. The index is saved once more after the last insert.
pub async fn sync_emails(
    registry: &IndexRegistry,
    account_id: &str,
    emails: Vec<EmailMessage>,
) -> Result<SyncReport> {
    let manager = registry.open(account_id).await?;
    let embedder = registry.embedder();
    let concurrency = registry.settings().sync_concurrency.max(1);
    info!(account_id, emails = emails.len(), concurrency, "syncing emails to index");

    let mut embedded = stream::iter(emails.into_iter().map(|email| {
        let embedder = Arc::clone(&embedder);
        async move {
            let result = embedder.embed(&email.embedding_payload()).await;
            (email, result)
        }
    }))
    .buffer_unordered(concurrency);

    let mut report = SyncReport::default();
    while let Some((email, result)) = embedded.next().await {
        match result {
            Ok(vector) => {
                manager
                    .lock()
                    .await
                    .insert(email.into_document(vector))
                    .await?;
                report.indexed += 1;
            },
            Err(e) => {
                warn!(account_id, email_id = %email.id, error = %e, "embedding failed, email not indexed");
                report.failed.push(email.id);
            },
        }
    }

    manager.lock().await.save_index().await?;
    info!(
        account_id,
        indexed = report.indexed,
        failed = report.failed.len(),
        "email sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use super::*;
    use crate::{
        config::IndexSettings,
        error::IndexError,
        test_support::{KeywordEmbedder, MemoryAccountStore},
    };

    fn message(id: &str, subject: &str, body: &str) -> EmailMessage {
        EmailMessage {
            id: id.into(),
            thread_id: format!("thread-{id}"),
            subject: subject.into(),
            body: Some(body.into()),
            body_snippet: Some(body.chars().take(20).collect()),
            from: EmailAddress {
                name: Some("Ana".into()),
                address: "ana@example.com".into(),
            },
            to: vec![
                EmailAddress {
                    name: Some("Bo".into()),
                    address: "bo@example.com".into(),
                },
                EmailAddress {
                    name: None,
                    address: "cy@example.com".into(),
                },
            ],
            sent_at: "2025-03-04T15:07:09Z".into(),
        }
    }

    fn registry(
        store: &Arc<MemoryAccountStore>,
        embedder: &Arc<KeywordEmbedder>,
        concurrency: usize,
    ) -> IndexRegistry {
        IndexRegistry::new(store.clone(), embedder.clone(), IndexSettings {
            sync_concurrency: concurrency,
            ..Default::default()
        })
    }

    #[test]
    fn timestamps_render_for_display() {
        assert_eq!(display_timestamp("2025-03-04T15:07:09Z"), "3/4/2025, 3:07:09 PM");
        assert_eq!(display_timestamp("2025-11-20T00:30:00+01:00"), "11/20/2025, 12:30:00 AM");
        assert_eq!(display_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn payload_lists_sender_recipients_and_body() {
        let payload = message("m1", "Invoice", "Please pay").embedding_payload();
        assert_eq!(
            payload,
            "From: Ana <ana@example.com>\nTo: Bo <bo@example.com>, cy@example.com\n\
             Subject: Invoice\nBody: Please pay\n SentAt: 3/4/2025, 3:07:09 PM"
        );
    }

    #[test]
    fn body_falls_back_to_snippet() {
        let mut msg = message("m1", "Hi", "ignored");
        msg.body = None;
        msg.body_snippet = Some("short snippet".into());
        let doc = msg.into_document(vec![]);
        assert_eq!(doc.body, "short snippet");
        assert_eq!(doc.raw_body, "short snippet");
        assert_eq!(doc.to, vec!["Bo <bo@example.com>", "cy@example.com"]);
        assert_eq!(doc.thread_id, "thread-m1");
    }

    #[test]
    fn messages_deserialize_from_sync_api_json() {
        let raw = r#"{
            "id": "m9", "threadId": "t9", "subject": "Lunch",
            "bodySnippet": "see you", "sentAt": "2025-01-01T12:00:00Z",
            "from": { "name": "Ana", "address": "ana@example.com" },
            "to": [{ "address": "bo@example.com" }]
        }"#;
        let msg: EmailMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.thread_id, "t9");
        assert!(msg.body.is_none());
        assert_eq!(msg.to[0].to_string(), "bo@example.com");
    }

    #[tokio::test]
    async fn sync_indexes_embedded_emails_and_skips_failures() {
        let store = Arc::new(MemoryAccountStore::with_accounts(&["acct-1"]));
        let embedder = Arc::new(KeywordEmbedder {
            fail_on: Some("BROKEN"),
            ..Default::default()
        });
        let registry = registry(&store, &embedder, 10);

        let report = sync_emails(&registry, "acct-1", vec![
            message("m1", "Invoice", "Please pay the invoice"),
            message("m2", "BROKEN", "cannot embed"),
            message("m3", "Team offsite", "Agenda attached"),
        ])
        .await
        .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.failed, vec!["m2".to_string()]);

        let manager = registry.open("acct-1").await.unwrap();
        let guard = manager.lock().await;
        assert_eq!(guard.document_count(), 2);
        let hits = guard.search("invoice").await.unwrap();
        assert_eq!(hits.hits[0].document.title, "Invoice");
        assert_eq!(hits.hits[0].document.sent_at, "3/4/2025, 3:07:09 PM");
        let hits = guard.vector_search("offsite plans", Some(1)).await.unwrap();
        assert_eq!(hits.hits[0].document.title, "Team offsite");
    }

    #[tokio::test]
    async fn sync_bounds_embedding_fan_out() {
        let store = Arc::new(MemoryAccountStore::with_accounts(&["acct-1"]));
        let embedder = Arc::new(KeywordEmbedder {
            delay: Duration::from_millis(20),
            ..Default::default()
        });
        let registry = registry(&store, &embedder, 2);

        let emails = (0..6)
            .map(|i| message(&format!("m{i}"), "Meeting", "notes"))
            .collect();
        let report = sync_emails(&registry, "acct-1", emails).await.unwrap();

        assert_eq!(report.indexed, 6);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 6);
        assert!(embedder.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn sync_persists_for_fresh_manager() {
        let store = Arc::new(MemoryAccountStore::with_accounts(&["acct-1"]));
        let embedder = Arc::new(KeywordEmbedder::default());
        let registry = registry(&store, &embedder, 10);
        sync_emails(&registry, "acct-1", vec![message("m1", "Contract", "signed")])
            .await
            .unwrap();

        let other = IndexRegistry::new(store.clone(), embedder.clone(), IndexSettings::default());
        let manager = other.open("acct-1").await.unwrap();
        assert_eq!(manager.lock().await.search("contract").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn sync_for_unknown_account_fails() {
        let store = Arc::new(MemoryAccountStore::default());
        let embedder = Arc::new(KeywordEmbedder::default());
        let registry = registry(&store, &embedder, 10);

        let err = sync_emails(&registry, "ghost", vec![]).await.unwrap_err();
        assert!(matches!(err, IndexError::NotFound { .. }));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
