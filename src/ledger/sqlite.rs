//! SQLite-backed correlation ledger.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::common::error::LedgerResult;
use crate::ledger::{CorrelationId, CorrelationLedger, Delivery, MirroredCopy};

/// Correlation ledger stored in two SQLite tables, `messages` and `bridge`.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `url` and create the schema.
    pub async fn connect(url: &str) -> LedgerResult<Self> {
        // An in-memory database exists per connection, so it must not be pooled.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let ledger = Self::new(pool);
        ledger.init().await?;
        info!("Correlation ledger ready at {}", url);
        Ok(ledger)
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CorrelationLedger for SqliteLedger {
    async fn init(&self) -> LedgerResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                adapter           TEXT    NOT NULL,
                channel           TEXT    NOT NULL,
                native_message_id TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_triple
             ON messages (adapter, channel, native_message_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bridge (
                from_id INTEGER NOT NULL REFERENCES messages(id),
                to_id   INTEGER NOT NULL REFERENCES messages(id),
                PRIMARY KEY (from_id, to_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_origin(
        &self,
        adapter_id: &str,
        channel_id: &str,
        native_message_id: &str,
    ) -> LedgerResult<CorrelationId> {
        let id = sqlx::query(
            "INSERT INTO messages (adapter, channel, native_message_id) VALUES (?, ?, ?)",
        )
        .bind(adapter_id)
        .bind(channel_id)
        .bind(native_message_id)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(adapter_id, channel_id, native_message_id, "Recorded origin #{}", id);
        Ok(CorrelationId(id))
    }

    async fn record_copy(
        &self,
        origin: CorrelationId,
        adapter_id: &str,
        channel_id: &str,
        delivery: &Delivery,
    ) -> LedgerResult<CorrelationId> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO messages (adapter, channel, native_message_id) VALUES (?, ?, ?)",
        )
        .bind(adapter_id)
        .bind(channel_id)
        .bind(delivery.native_id())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("INSERT INTO bridge (from_id, to_id) VALUES (?, ?)")
            .bind(origin.0)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            adapter_id,
            channel_id,
            delivered = delivery.is_delivered(),
            "Recorded copy #{} of {}",
            id,
            origin
        );
        Ok(CorrelationId(id))
    }

    async fn find_origin(
        &self,
        adapter_id: &str,
        channel_id: &str,
        native_message_id: &str,
    ) -> LedgerResult<Option<CorrelationId>> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM messages
             WHERE adapter = ? AND channel = ? AND native_message_id = ?
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(adapter_id)
        .bind(channel_id)
        .bind(native_message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.map(CorrelationId))
    }

    async fn children_of(&self, origin: CorrelationId) -> LedgerResult<Vec<MirroredCopy>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT m.adapter, m.channel, m.native_message_id
             FROM bridge b
             JOIN messages m ON m.id = b.to_id
             WHERE b.from_id = ? AND m.native_message_id IS NOT NULL",
        )
        .bind(origin.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MirroredCopy {
                adapter_id: r.0,
                channel_id: r.1,
                native_message_id: r.2,
            })
            .collect())
    }

    async fn purge(&self) -> LedgerResult<()> {
        sqlx::query("DROP TABLE IF EXISTS bridge")
            .execute(&self.pool)
            .await?;
        sqlx::query("DROP TABLE IF EXISTS messages")
            .execute(&self.pool)
            .await?;
        info!("Correlation ledger purged");
        Ok(())
    }
}
