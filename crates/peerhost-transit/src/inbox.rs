//! Durable inbox of accepted transfers.
//!
//! The perimeter only ever adds. The inbox worker pops items (stamping them with a
//! popstamp so no other pop sees them), then either completes them (delete) or
//! reports a failure (back to pending, attempts + 1). Items popped by a worker that
//! died are returned to pending by [`InboxStorage::recover_dead`].

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use peerhost_core::models::{InboxStatus, TransferInboxItem};
use peerhost_core::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_inbox (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    drive_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    sender TEXT NOT NULL,
    instruction_type TEXT NOT NULL,
    added_at_ms INTEGER NOT NULL,
    popstamp TEXT,
    popped_at_ms INTEGER,
    attempts INTEGER NOT NULL DEFAULT 0,
    value TEXT NOT NULL
)
"#;

const PENDING_INDEX_SQL: &str =
    "CREATE INDEX IF NOT EXISTS idx_transfer_inbox_pending ON transfer_inbox (popstamp, drive_id, added_at_ms)";

#[async_trait]
pub trait InboxStorage: Send + Sync {
    /// Durably store an item. Returns once the write is committed.
    async fn add(&self, item: &TransferInboxItem) -> Result<(), AppError>;

    /// Pop up to `count` pending items, oldest first.
    async fn pop(&self, count: u32) -> Result<Vec<TransferInboxItem>, AppError>;

    /// Pop up to `count` pending items for one drive, oldest first.
    async fn pop_for_drive(
        &self,
        drive_id: Uuid,
        count: u32,
    ) -> Result<Vec<TransferInboxItem>, AppError>;

    /// Remove a popped item. `false` if the popstamp no longer matches.
    async fn mark_complete(&self, item_id: Uuid, popstamp: Uuid) -> Result<bool, AppError>;

    /// Return a popped item to pending and count the attempt.
    async fn mark_failure(&self, item_id: Uuid, popstamp: Uuid) -> Result<bool, AppError>;

    /// Return items popped before `older_than` to pending. Returns how many.
    async fn recover_dead(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;

    async fn status(&self, drive_id: Option<Uuid>) -> Result<InboxStatus, AppError>;
}

/// SQLite-backed inbox.
pub struct SqliteInbox {
    pool: Pool<Sqlite>,
}

impl SqliteInbox {
    /// Open (or create) the inbox database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // Accepted means durable, so fsync on every commit.
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let inbox = Self { pool };
        inbox.migrate().await?;
        tracing::info!(path = %path.display(), "Inbox database opened");
        Ok(inbox)
    }

    /// Private in-memory inbox. Contents are lost on drop.
    pub async fn in_memory() -> Result<Self, AppError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let inbox = Self { pool };
        inbox.migrate().await?;
        Ok(inbox)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        sqlx::query(PENDING_INDEX_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn pop_where(
        &self,
        drive_id: Option<Uuid>,
        count: u32,
    ) -> Result<Vec<TransferInboxItem>, AppError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        let rows: Vec<(String, i64, String)> = match drive_id {
            Some(drive_id) => {
                sqlx::query_as(
                    "SELECT id, attempts, value FROM transfer_inbox \
                     WHERE popstamp IS NULL AND drive_id = ? \
                     ORDER BY added_at_ms, seq LIMIT ?",
                )
                .bind(drive_id.to_string())
                .bind(i64::from(count))
                .fetch_all(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT id, attempts, value FROM transfer_inbox \
                     WHERE popstamp IS NULL \
                     ORDER BY added_at_ms, seq LIMIT ?",
                )
                .bind(i64::from(count))
                .fetch_all(&mut *tx)
                .await?
            }
        };

        let popstamp = Uuid::new_v4();
        let popped_at_ms = Utc::now().timestamp_millis();
        let mut items = Vec::with_capacity(rows.len());

        for (id, attempts, value) in rows {
            sqlx::query(
                "UPDATE transfer_inbox SET popstamp = ?, popped_at_ms = ? \
                 WHERE id = ? AND popstamp IS NULL",
            )
            .bind(popstamp.to_string())
            .bind(popped_at_ms)
            .bind(&id)
            .execute(&mut *tx)
            .await?;

            let mut item = decode_item(&id, &value)?;
            item.popstamp = Some(popstamp);
            item.attempts = u32::try_from(attempts).unwrap_or(u32::MAX);
            items.push(item);
        }

        tx.commit().await?;

        if !items.is_empty() {
            tracing::debug!(
                popstamp = %popstamp,
                count = items.len(),
                drive_id = ?drive_id,
                "Inbox items popped"
            );
        }
        Ok(items)
    }
}

fn decode_item(id: &str, value: &str) -> Result<TransferInboxItem, AppError> {
    serde_json::from_str(value)
        .map_err(|e| AppError::Internal(format!("Corrupt inbox item {}: {}", id, e)))
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

#[async_trait]
impl InboxStorage for SqliteInbox {
    #[tracing::instrument(
        skip(self, item),
        fields(
            db.table = "transfer_inbox",
            db.operation = "insert",
            item_id = %item.id,
            drive_id = %item.drive_id,
            instruction = %item.instruction_type
        )
    )]
    async fn add(&self, item: &TransferInboxItem) -> Result<(), AppError> {
        let mut stored = item.clone();
        stored.popstamp = None;
        stored.attempts = 0;
        let value = serde_json::to_string(&stored)
            .map_err(|e| AppError::Internal(format!("Failed to encode inbox item: {}", e)))?;

        sqlx::query(
            "INSERT INTO transfer_inbox \
             (id, drive_id, file_id, sender, instruction_type, added_at_ms, value) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.id.to_string())
        .bind(item.drive_id.to_string())
        .bind(item.file_id.to_string())
        .bind(item.sender.as_str())
        .bind(item.instruction_type.to_string())
        .bind(item.added_timestamp.timestamp_millis())
        .bind(value)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Inbox item added");
        Ok(())
    }

    async fn pop(&self, count: u32) -> Result<Vec<TransferInboxItem>, AppError> {
        self.pop_where(None, count).await
    }

    async fn pop_for_drive(
        &self,
        drive_id: Uuid,
        count: u32,
    ) -> Result<Vec<TransferInboxItem>, AppError> {
        self.pop_where(Some(drive_id), count).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "transfer_inbox", db.operation = "delete"))]
    async fn mark_complete(&self, item_id: Uuid, popstamp: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM transfer_inbox WHERE id = ? AND popstamp = ?")
            .bind(item_id.to_string())
            .bind(popstamp.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "transfer_inbox", db.operation = "update"))]
    async fn mark_failure(&self, item_id: Uuid, popstamp: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE transfer_inbox \
             SET popstamp = NULL, popped_at_ms = NULL, attempts = attempts + 1 \
             WHERE id = ? AND popstamp = ?",
        )
        .bind(item_id.to_string())
        .bind(popstamp.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn recover_dead(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE transfer_inbox SET popstamp = NULL, popped_at_ms = NULL \
             WHERE popstamp IS NOT NULL AND popped_at_ms < ?",
        )
        .bind(older_than.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            tracing::warn!(recovered, cutoff = %older_than, "Recovered stale inbox items");
        }
        Ok(recovered)
    }

    async fn status(&self, drive_id: Option<Uuid>) -> Result<InboxStatus, AppError> {
        let (total, popped, oldest): (i64, i64, Option<i64>) = match drive_id {
            Some(drive_id) => {
                sqlx::query_as(
                    "SELECT COUNT(*), COUNT(popstamp), MIN(added_at_ms) \
                     FROM transfer_inbox WHERE drive_id = ?",
                )
                .bind(drive_id.to_string())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT COUNT(*), COUNT(popstamp), MIN(added_at_ms) FROM transfer_inbox",
                )
                .fetch_one(&self.pool)
                .await?
            }
        };

        Ok(InboxStatus {
            total_items: u64::try_from(total).unwrap_or(0),
            popped_count: u64::try_from(popped).unwrap_or(0),
            oldest_item_timestamp: oldest.and_then(from_millis),
        })
    }
}
