// File: pecosa-sync/src/change_tracker.rs
// Purpose: Record row changes in the change log and broadcast them to subscribers

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tokio::sync::broadcast;

use crate::error::{Result, SyncError};

/// Kind of row-level change carried by the feed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Insert => write!(f, "insert"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for ChangeAction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(ChangeAction::Insert),
            "update" => Ok(ChangeAction::Update),
            "delete" => Ok(ChangeAction::Delete),
            other => Err(SyncError::InvalidChange(format!("unknown action '{}'", other))),
        }
    }
}

/// A single entry of the change feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub id: i64,
    pub table: String,
    pub record_id: String,
    pub action: ChangeAction,
    /// Row after the change (insert/update)
    pub record: Option<Value>,
    /// Row before the change (update/delete), when known
    pub old_record: Option<Value>,
    /// Per-table version, strictly increasing
    pub version: i64,
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ChangeRow {
    id: i64,
    table_name: String,
    record_id: String,
    action: String,
    record: Option<String>,
    old_record: Option<String>,
    version: i64,
    client_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl ChangeRow {
    fn into_event(self) -> Result<ChangeEvent> {
        let record = self.record.map(|s| serde_json::from_str(&s)).transpose()?;
        let old_record = self.old_record.map(|s| serde_json::from_str(&s)).transpose()?;

        Ok(ChangeEvent {
            id: self.id,
            table: self.table_name,
            record_id: self.record_id,
            action: self.action.parse()?,
            record,
            old_record,
            version: self.version,
            client_id: self.client_id,
            created_at: self.created_at,
        })
    }
}

/// Manages the change log and the live broadcast of new entries
pub struct ChangeTracker {
    pool: SqlitePool,
    broadcast_tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeTracker {
    /// Create a tracker, creating the change log table if needed
    pub async fn new(pool: SqlitePool, capacity: usize) -> Result<Self> {
        Self::init_table(&pool).await?;

        let (broadcast_tx, _) = broadcast::channel(capacity.max(1));

        Ok(Self {
            pool,
            broadcast_tx,
        })
    }

    async fn init_table(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _pecosa_change_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT NOT NULL,
                record_id TEXT NOT NULL,
                action TEXT NOT NULL,
                record TEXT,
                old_record TEXT,
                version INTEGER NOT NULL,
                client_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_change_log_table_version
            ON _pecosa_change_log(table_name, version)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Append a change to the log and broadcast it
    pub async fn record_change(
        &self,
        table: &str,
        record_id: &str,
        action: ChangeAction,
        record: Option<Value>,
        old_record: Option<Value>,
        client_id: Option<String>,
    ) -> Result<ChangeEvent> {
        let mut conn = self.pool.acquire().await?;
        let change = self
            .append(&mut conn, table, record_id, action, record, old_record, client_id)
            .await?;
        drop(conn);

        self.publish(&change);
        Ok(change)
    }

    /// Append a change on the caller's connection without broadcasting it.
    ///
    /// Pass the transaction that wrote the row so the row and its log entry
    /// commit or roll back together, then [`publish`](Self::publish) the
    /// event once the commit succeeded. The version is assigned in the same
    /// statement as the insert, so concurrent writers never share a version.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        record_id: &str,
        action: ChangeAction,
        record: Option<Value>,
        old_record: Option<Value>,
        client_id: Option<String>,
    ) -> Result<ChangeEvent> {
        let record_json = record.as_ref().map(serde_json::to_string).transpose()?;
        let old_json = old_record.as_ref().map(serde_json::to_string).transpose()?;
        let created_at = Utc::now();

        let (id, version): (i64, i64) = sqlx::query_as(
            r#"
            INSERT INTO _pecosa_change_log
                (table_name, record_id, action, record, old_record, version, client_id, created_at)
            SELECT ?1, ?2, ?3, ?4, ?5, COALESCE(MAX(version), 0) + 1, ?6, ?7
            FROM _pecosa_change_log WHERE table_name = ?1
            RETURNING id, version
            "#,
        )
        .bind(table)
        .bind(record_id)
        .bind(action.to_string())
        .bind(record_json)
        .bind(old_json)
        .bind(&client_id)
        .bind(created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(ChangeEvent {
            id,
            table: table.to_string(),
            record_id: record_id.to_string(),
            action,
            record,
            old_record,
            version,
            client_id,
            created_at,
        })
    }

    /// Broadcast an already committed change to live subscribers
    pub fn publish(&self, change: &ChangeEvent) {
        // No receivers is not an error: nobody is watching this table yet
        let _ = self.broadcast_tx.send(change.clone());
        tracing::debug!(
            table = %change.table,
            record_id = %change.record_id,
            action = %change.action,
            version = change.version,
            "change recorded"
        );
    }

    /// All changes for a table with a version greater than `since_version`
    pub async fn changes_since(&self, table: &str, since_version: i64) -> Result<Vec<ChangeEvent>> {
        let rows = sqlx::query_as::<_, ChangeRow>(
            r#"
            SELECT id, table_name, record_id, action, record, old_record, version, client_id, created_at
            FROM _pecosa_change_log
            WHERE table_name = ? AND version > ?
            ORDER BY version ASC
            "#,
        )
        .bind(table)
        .bind(since_version)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChangeRow::into_event).collect()
    }

    /// Latest version for a table (0 when nothing was recorded yet)
    pub async fn latest_version(&self, table: &str) -> Result<i64> {
        let version: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM _pecosa_change_log WHERE table_name = ?",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    /// Latest version at which a given row changed
    pub async fn record_version(&self, table: &str, record_id: &str) -> Result<Option<i64>> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM _pecosa_change_log WHERE table_name = ? AND record_id = ?",
        )
        .bind(table)
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(version)
    }

    /// Subscribe to live change events
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Number of live subscribers
    pub fn receiver_count(&self) -> usize {
        self.broadcast_tx.receiver_count()
    }

    /// Remove change log entries older than `days`.
    /// The newest entry of each table survives so versions never restart.
    pub async fn cleanup_old_entries(&self, days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(days);

        let result = sqlx::query(
            r#"
            DELETE FROM _pecosa_change_log
            WHERE created_at < ?
              AND id NOT IN (SELECT MAX(id) FROM _pecosa_change_log GROUP BY table_name)
            "#,
        )
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
