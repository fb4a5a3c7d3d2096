// File: pecosa-sync/src/sync.rs
// Purpose: Push queued offline changes upstream, manually or on reconnect

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::client::BackendClient;
use crate::connection::ConnectionMonitor;
use crate::error::Result;
use crate::queue::{PendingChange, SyncQueue};
use crate::sync_api::SyncPushResponse;

/// Result of a sync run, shown to the user as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
}

impl SyncOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Reconciles locally accumulated state with the backend
#[async_trait]
pub trait SyncService: Send + Sync {
    async fn sync_all(&self) -> SyncOutcome;
}

/// Where pushed batches go
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn push(&self, table: &str, changes: Vec<PendingChange>) -> Result<SyncPushResponse>;
}

#[async_trait]
impl SyncTransport for BackendClient {
    async fn push(&self, table: &str, changes: Vec<PendingChange>) -> Result<SyncPushResponse> {
        BackendClient::push(self, table, changes).await
    }
}

/// Sync service draining the local queue through a transport
pub struct QueueSyncService<T> {
    queue: SyncQueue,
    transport: T,
}

impl<T: SyncTransport> QueueSyncService<T> {
    pub fn new(queue: SyncQueue, transport: T) -> Self {
        Self { queue, transport }
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }
}

/// Group changes by table, tables in order of first appearance
fn batches(pending: Vec<PendingChange>) -> Vec<(String, Vec<PendingChange>)> {
    let mut batches: Vec<(String, Vec<PendingChange>)> = Vec::new();
    for change in pending {
        match batches.iter_mut().find(|(table, _)| *table == change.table) {
            Some((_, batch)) => batch.push(change),
            None => batches.push((change.table.clone(), vec![change])),
        }
    }
    batches
}

#[async_trait]
impl<T: SyncTransport> SyncService for QueueSyncService<T> {
    async fn sync_all(&self) -> SyncOutcome {
        let pending = self.queue.pending().await;
        if pending.is_empty() {
            return SyncOutcome::ok("No hay cambios pendientes");
        }

        let mut applied = 0usize;
        let mut rejected = 0usize;
        let mut failure = None;

        for (table, batch) in batches(pending) {
            match self.transport.push(&table, batch).await {
                Ok(response) => {
                    let mut done: Vec<Uuid> = response.applied.clone();
                    done.extend(response.conflicts.iter().map(|c| c.change_id));
                    for conflict in &response.conflicts {
                        tracing::warn!(
                            "Discarding change {} on {}: {}",
                            conflict.change_id,
                            table,
                            conflict.reason
                        );
                    }
                    applied += response.applied.len();
                    rejected += response.conflicts.len();
                    self.queue.remove(&done).await;
                }
                Err(e) => {
                    tracing::error!("Sync of {} failed: {}", table, e);
                    failure = Some(e);
                    break;
                }
            }
        }

        let remaining = self.queue.len().await;
        match failure {
            Some(e) => SyncOutcome::failed(format!(
                "Error al sincronizar: {}. Quedan {} cambios pendientes",
                e, remaining
            )),
            None if rejected > 0 => SyncOutcome::ok(format!(
                "Sincronización completada: {} cambios aplicados, {} descartados por conflicto",
                applied, rejected
            )),
            None if remaining > 0 => SyncOutcome::ok(format!(
                "Sincronización parcial: {} cambios aplicados, {} pendientes",
                applied, remaining
            )),
            None => SyncOutcome::ok(format!(
                "Sincronización completada: {} cambios aplicados",
                applied
            )),
        }
    }
}

/// Run `service` every time the monitor reports the connection is back.
/// Clears `was_offline` after a successful run.
pub fn spawn_auto_sync(monitor: ConnectionMonitor, service: Arc<dyn SyncService>) -> JoinHandle<()> {
    let mut status = monitor.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            if !(current.is_online && current.was_offline) {
                continue;
            }

            tracing::info!("Connection restored, syncing pending changes");
            let outcome = service.sync_all().await;
            if outcome.success {
                tracing::info!("{}", outcome.message);
                monitor.reset_was_offline();
            } else {
                tracing::warn!("{}", outcome.message);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_tracker::ChangeAction;
    use crate::conflict::Conflict;
    use crate::error::SyncError;
    use crate::storage::LocalStorage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Applies everything except changes whose data carries `"reject": true`
    #[derive(Default)]
    struct FakeTransport {
        calls: Mutex<Vec<(String, usize)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl SyncTransport for FakeTransport {
        async fn push(&self, table: &str, changes: Vec<PendingChange>) -> Result<SyncPushResponse> {
            self.calls.lock().unwrap().push((table.to_string(), changes.len()));
            if self.fail_on.as_deref() == Some(table) {
                return Err(SyncError::Rejected {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            let mut response = SyncPushResponse::default();
            for change in changes {
                let reject = change.data.as_ref().and_then(|d| d.get("reject")).is_some();
                if reject {
                    response.conflicts.push(Conflict::new(change.id, change.record_id, Some(9), "stale"));
                } else {
                    response.applied.push(change.id);
                }
            }
            Ok(response)
        }
    }

    fn change(table: &str, data: serde_json::Value) -> PendingChange {
        PendingChange::new(table, Some("1".into()), ChangeAction::Update, Some(data))
    }

    async fn queue_with(changes: Vec<PendingChange>) -> SyncQueue {
        let queue = SyncQueue::new(LocalStorage::memory());
        for c in changes {
            queue.enqueue(c).await;
        }
        queue
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let service = QueueSyncService::new(queue_with(vec![]).await, FakeTransport::default());
        let outcome = service.sync_all().await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "No hay cambios pendientes");
    }

    #[tokio::test]
    async fn test_groups_by_table_in_queue_order() {
        let queue = queue_with(vec![
            change("orders", json!({"status": "listo"})),
            change("customers", json!({"name": "Ana"})),
            change("orders", json!({"status": "entregado"})),
        ])
        .await;
        let service = QueueSyncService::new(queue, FakeTransport::default());

        let outcome = service.sync_all().await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Sincronización completada: 3 cambios aplicados");
        assert_eq!(
            *service.transport.calls.lock().unwrap(),
            vec![("orders".to_string(), 2), ("customers".to_string(), 1)]
        );
        assert!(service.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_conflicts_are_dropped_and_reported() {
        let queue = queue_with(vec![
            change("orders", json!({"status": "listo"})),
            change("orders", json!({"reject": true})),
        ])
        .await;
        let service = QueueSyncService::new(queue, FakeTransport::default());

        let outcome = service.sync_all().await;
        assert!(outcome.success);
        assert!(outcome.message.contains("1 descartados por conflicto"));
        assert!(service.queue().is_empty().await);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_remaining_changes() {
        let queue = queue_with(vec![
            change("orders", json!({"status": "listo"})),
            change("customers", json!({"name": "Ana"})),
        ])
        .await;
        let transport = FakeTransport {
            fail_on: Some("customers".to_string()),
            ..Default::default()
        };
        let service = QueueSyncService::new(queue, transport);

        let outcome = service.sync_all().await;
        assert!(!outcome.success);
        assert!(outcome.message.starts_with("Error al sincronizar"));

        let left = service.queue().pending().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].table, "customers");
    }

    struct CountingService(Mutex<usize>);

    #[async_trait]
    impl SyncService for CountingService {
        async fn sync_all(&self) -> SyncOutcome {
            *self.0.lock().unwrap() += 1;
            SyncOutcome::ok("ok")
        }
    }

    #[tokio::test]
    async fn test_auto_sync_on_reconnect() {
        let monitor = ConnectionMonitor::new(Some(true));
        let service = Arc::new(CountingService(Mutex::new(0)));
        let handle = spawn_auto_sync(monitor.clone(), service.clone());
        let mut status = monitor.subscribe();

        monitor.set_online(false);
        monitor.set_online(true);

        // The auto-sync task acknowledges the outage once it has synced
        loop {
            let current = *status.borrow_and_update();
            if current.is_online && !current.was_offline {
                break;
            }
            status.changed().await.unwrap();
        }
        assert_eq!(*service.0.lock().unwrap(), 1);
        handle.abort();
    }
}
