// File: pecosa-sync/src/queue.rs
// Purpose: Changes made while offline, persisted until the next sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::change_tracker::ChangeAction;
use crate::storage::LocalStorage;

/// Storage key prefix for queued changes.
///
/// Each change lives under its own key, `pecosa.sync_queue/<enqueued>-<seq>/<id>`,
/// so writers never rewrite each other's entries, even across processes.
pub const QUEUE_PREFIX: &str = "pecosa.sync_queue/";

/// A change waiting to be pushed upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: Uuid,
    pub table: String,
    /// Absent for inserts whose key the server assigns
    pub record_id: Option<String>,
    pub action: ChangeAction,
    pub data: Option<Value>,
    /// Table version the client had seen when the change was made
    pub base_version: Option<i64>,
    pub queued_at: DateTime<Utc>,
}

impl PendingChange {
    pub fn new(
        table: impl Into<String>,
        record_id: Option<String>,
        action: ChangeAction,
        data: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.into(),
            record_id,
            action,
            data,
            base_version: None,
            queued_at: Utc::now(),
        }
    }

    pub fn with_base_version(mut self, version: i64) -> Self {
        self.base_version = Some(version);
        self
    }
}

/// FIFO queue of pending changes kept in local storage
#[derive(Clone)]
pub struct SyncQueue {
    storage: LocalStorage,
}

impl SyncQueue {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    /// Key sorting after every entry queued before it
    fn entry_key(change: &PendingChange) -> String {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}{}-{:012}/{}",
            QUEUE_PREFIX,
            Utc::now().format("%Y%m%dT%H%M%S%.9fZ"),
            seq,
            change.id
        )
    }

    /// Queue keys, oldest first
    async fn keys(&self) -> Vec<String> {
        self.storage
            .keys()
            .await
            .into_iter()
            .filter(|key| key.starts_with(QUEUE_PREFIX))
            .collect()
    }

    /// Pending changes in the order they were queued
    pub async fn pending(&self) -> Vec<PendingChange> {
        let mut pending = Vec::new();
        for key in self.keys().await {
            // Removed by another writer since the listing: skip
            if let Some(change) = self.storage.get_json::<PendingChange>(&key).await {
                pending.push(change);
            }
        }
        pending
    }

    pub async fn len(&self) -> usize {
        self.keys().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys().await.is_empty()
    }

    pub async fn enqueue(&self, change: PendingChange) {
        tracing::debug!("Queued {} on {} ({})", change.action, change.table, change.id);
        self.storage.set_json(&Self::entry_key(&change), &change).await;
    }

    /// Drop the given changes; unknown ids are ignored
    pub async fn remove(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let ids: HashSet<String> = ids.iter().map(Uuid::to_string).collect();
        for key in self.keys().await {
            if key.rsplit('/').next().is_some_and(|id| ids.contains(id)) {
                self.storage.remove_item(&key).await;
            }
        }
    }

    pub async fn clear(&self) {
        for key in self.keys().await {
            self.storage.remove_item(&key).await;
        }
    }
}
