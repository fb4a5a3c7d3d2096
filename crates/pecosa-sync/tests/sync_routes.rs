use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::{Extension, Router};
use pecosa_sync::{
    ChangeAction, ChangeEvent, ChangeTracker, PendingChange, PushActor, SyncConfig, SyncEngine, SyncError,
    SyncPushRequest, SyncPushResponse, SyncResponse, SyncStrategy, TableStore,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

/// Rows kept in memory, keyed by table and id; ids are assigned on insert.
/// Inserted rows are stamped with the pushing role, if any.
struct MemoryTables {
    tracker: Arc<ChangeTracker>,
    rows: Mutex<HashMap<(String, String), Value>>,
    next_id: Mutex<i64>,
}

#[async_trait]
impl TableStore for MemoryTables {
    async fn apply_change(
        &self,
        change: &PendingChange,
        client_id: Option<&str>,
        actor: Option<&PushActor>,
    ) -> pecosa_sync::Result<ChangeEvent> {
        let mut rows = self.rows.lock().await;
        let (record_id, record, old) = match change.action {
            ChangeAction::Insert => {
                let mut next = self.next_id.lock().await;
                *next += 1;
                let mut row = change.data.clone().unwrap_or_else(|| json!({}));
                row["id"] = json!(*next);
                if let Some(actor) = actor {
                    row["pushed_by"] = json!(actor.role);
                }
                rows.insert((change.table.clone(), next.to_string()), row.clone());
                (next.to_string(), Some(row), None)
            }
            ChangeAction::Update => {
                let id = change
                    .record_id
                    .clone()
                    .ok_or_else(|| SyncError::InvalidChange("update without record id".into()))?;
                let slot = rows
                    .get_mut(&(change.table.clone(), id.clone()))
                    .ok_or_else(|| SyncError::InvalidChange(format!("unknown row {}", id)))?;
                let old = slot.clone();
                if let (Some(target), Some(Value::Object(patch))) = (slot.as_object_mut(), &change.data) {
                    for (k, v) in patch {
                        target.insert(k.clone(), v.clone());
                    }
                }
                (id, Some(slot.clone()), Some(old))
            }
            ChangeAction::Delete => {
                let id = change.record_id.clone().unwrap_or_default();
                let old = rows.remove(&(change.table.clone(), id.clone()));
                (id, None, old)
            }
        };

        self.tracker
            .record_change(
                &change.table,
                &record_id,
                change.action,
                record,
                old,
                client_id.map(str::to_string),
            )
            .await
    }
}

async fn app(strategy: SyncStrategy) -> (Router, Arc<ChangeTracker>) {
    let pool = pecosa_sync::db::connect("sqlite::memory:").await.unwrap();
    let tracker = Arc::new(ChangeTracker::new(pool, 64).await.unwrap());
    let store = Arc::new(MemoryTables {
        tracker: tracker.clone(),
        rows: Mutex::new(HashMap::new()),
        next_id: Mutex::new(0),
    });
    let engine = SyncEngine::new(
        tracker.clone(),
        store,
        SyncConfig::new(["orders", "customers"]).with_strategy(strategy),
    );
    (engine.routes(), tracker)
}

async fn push(router: &Router, table: &str, changes: Vec<PendingChange>) -> (StatusCode, Value) {
    let body = serde_json::to_vec(&SyncPushRequest {
        client_id: Some("caja-1".into()),
        changes,
    })
    .unwrap();
    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/api/sync/{}", table))
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn pull(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn push_then_pull() {
    let (router, _) = app(SyncStrategy::ClientWins).await;

    let insert = PendingChange::new("orders", None, ChangeAction::Insert, Some(json!({"status": "pendiente"})));
    let (status, body) = push(&router, "orders", vec![insert.clone()]).await;
    assert_eq!(status, StatusCode::OK);
    let ack: SyncPushResponse = serde_json::from_value(body).unwrap();
    assert_eq!(ack.applied, vec![insert.id]);
    assert_eq!(ack.version, 1);

    let (status, body) = pull(&router, "/api/sync/orders?since=0").await;
    assert_eq!(status, StatusCode::OK);
    let pulled: SyncResponse = serde_json::from_value(body).unwrap();
    assert_eq!(pulled.version, 1);
    assert_eq!(pulled.changes.len(), 1);
    assert_eq!(pulled.changes[0].client_id.as_deref(), Some("caja-1"));
    assert_eq!(pulled.changes[0].record.as_ref().unwrap()["status"], "pendiente");

    let (_, body) = pull(&router, "/api/sync/orders?since=1").await;
    assert_eq!(body["changes"], json!([]));
}

#[tokio::test]
async fn unknown_table_is_404() {
    let (router, _) = app(SyncStrategy::ClientWins).await;
    let (status, body) = pull(&router, "/api/sync/users").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("users"));
}

#[tokio::test]
async fn invalid_changes_are_reported_as_conflicts() {
    let (router, _) = app(SyncStrategy::ClientWins).await;
    let bad = PendingChange::new("orders", Some("99".into()), ChangeAction::Update, Some(json!({"status": "listo"})));
    let misplaced = PendingChange::new("customers", None, ChangeAction::Insert, None);

    let (_, body) = push(&router, "orders", vec![bad.clone(), misplaced.clone()]).await;
    let ack: SyncPushResponse = serde_json::from_value(body).unwrap();
    assert!(ack.applied.is_empty());
    let ids: Vec<_> = ack.conflicts.iter().map(|c| c.change_id).collect();
    assert_eq!(ids, vec![bad.id, misplaced.id]);
}

#[tokio::test]
async fn server_wins_rejects_stale_updates() {
    let (router, _) = app(SyncStrategy::ServerWins).await;

    let insert = PendingChange::new("orders", None, ChangeAction::Insert, Some(json!({"status": "pendiente"})));
    push(&router, "orders", vec![insert]).await;
    let newer = PendingChange::new("orders", Some("1".into()), ChangeAction::Update, Some(json!({"status": "preparando"})))
        .with_base_version(1);
    push(&router, "orders", vec![newer]).await;

    // Made offline before the update above reached the server
    let stale = PendingChange::new("orders", Some("1".into()), ChangeAction::Update, Some(json!({"status": "cancelado"})))
        .with_base_version(1);
    let (_, body) = push(&router, "orders", vec![stale.clone()]).await;
    let ack: SyncPushResponse = serde_json::from_value(body).unwrap();
    assert!(ack.applied.is_empty());
    assert_eq!(ack.conflicts[0].change_id, stale.id);
    assert_eq!(ack.conflicts[0].server_version, Some(2));
}

#[tokio::test]
async fn pushed_changes_reach_live_subscribers() {
    let (router, tracker) = app(SyncStrategy::ClientWins).await;
    let mut rx = tracker.subscribe();

    let insert = PendingChange::new("customers", None, ChangeAction::Insert, Some(json!({"name": "Lupita"})));
    push(&router, "customers", vec![insert]).await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event.table, "customers");
    assert_eq!(event.action, ChangeAction::Insert);
}

#[tokio::test]
async fn sse_rejects_bad_filter() {
    let (router, _) = app(SyncStrategy::ClientWins).await;
    let (status, _) = pull(&router, "/api/realtime/orders?filter=status").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn push_passes_the_signed_in_actor_to_the_store() {
    let (router, _) = app(SyncStrategy::ClientWins).await;
    let router = router.layer(Extension(PushActor {
        role: "cocina".into(),
        employee_id: None,
    }));

    let insert = PendingChange::new("orders", None, ChangeAction::Insert, Some(json!({"status": "pendiente"})));
    push(&router, "orders", vec![insert]).await;

    let (_, body) = pull(&router, "/api/sync/orders?since=0").await;
    assert_eq!(body["changes"][0]["record"]["pushed_by"], "cocina");
}
