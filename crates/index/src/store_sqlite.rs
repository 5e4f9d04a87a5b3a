use std::time::{SystemTime, UNIX_EPOCH};

use {anyhow::Result, async_trait::async_trait, tracing::debug};

use crate::store::{AccountRecord, AccountStore};

/// SQLite-backed account store. Snapshots live in `accounts.binary_index`.
#[derive(Clone)]
pub struct SqliteAccountStore {
    pool: sqlx::SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    email_address: Option<String>,
    binary_index: Option<Vec<u8>>,
}

impl From<AccountRow> for AccountRecord {
    fn from(r: AccountRow) -> Self {
        Self {
            id: r.id,
            email_address: r.email_address,
            binary_index: r.binary_index,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl SqliteAccountStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `accounts` table if it doesn't exist.
    pub async fn init(pool: &sqlx::SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS accounts (
                id            TEXT PRIMARY KEY,
                email_address TEXT,
                binary_index  BLOB,
                created_at    INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Register an account. Existing accounts keep their snapshot.
    pub async fn create_account(&self, account_id: &str, email_address: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO accounts (id, email_address, created_at)
               VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 email_address = COALESCE(excluded.email_address, accounts.email_address)"#,
        )
        .bind(account_id)
        .bind(email_address)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountRecord>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email_address, binary_index FROM accounts ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn find_account(&self, account_id: &str) -> Result<Option<AccountRecord>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email_address, binary_index FROM accounts WHERE id = ?",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn write_snapshot(&self, account_id: &str, snapshot: &[u8]) -> Result<()> {
        let res = sqlx::query("UPDATE accounts SET binary_index = ? WHERE id = ?")
            .bind(snapshot)
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            anyhow::bail!("account {account_id} does not exist");
        }
        debug!(account_id, bytes = snapshot.len(), "wrote index snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteAccountStore {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteAccountStore::init(&pool).await.unwrap();
        SqliteAccountStore::new(pool)
    }

    #[tokio::test]
    async fn unknown_account_is_none() {
        let store = store().await;
        assert!(store.find_account("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn new_account_has_no_snapshot() {
        let store = store().await;
        store
            .create_account("acct-1", Some("me@example.com"))
            .await
            .unwrap();
        let account = store.find_account("acct-1").await.unwrap().unwrap();
        assert_eq!(account.email_address.as_deref(), Some("me@example.com"));
        assert!(account.binary_index.is_none());
    }

    #[tokio::test]
    async fn write_snapshot_replaces_previous_value() {
        let store = store().await;
        store.create_account("acct-1", None).await.unwrap();
        store.write_snapshot("acct-1", b"first").await.unwrap();
        store.write_snapshot("acct-1", b"second").await.unwrap();
        let account = store.find_account("acct-1").await.unwrap().unwrap();
        assert_eq!(account.binary_index.as_deref(), Some(&b"second"[..]));
    }

    #[tokio::test]
    async fn write_snapshot_for_unknown_account_fails() {
        let store = store().await;
        assert!(store.write_snapshot("ghost", b"x").await.is_err());
    }

    #[tokio::test]
    async fn create_account_is_idempotent_and_keeps_snapshot() {
        let store = store().await;
        store.create_account("acct-1", Some("a@example.com")).await.unwrap();
        store.write_snapshot("acct-1", b"snap").await.unwrap();
        store.create_account("acct-1", None).await.unwrap();

        let accounts = store.list_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].email_address.as_deref(), Some("a@example.com"));
        assert_eq!(accounts[0].binary_index.as_deref(), Some(&b"snap"[..]));
    }
}
