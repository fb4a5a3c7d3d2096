// File: pecosa-sync/src/sync_api.rs
// Purpose: HTTP API endpoints for pulling and pushing changes

use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change_tracker::ChangeEvent;
use crate::conflict::Conflict;
use crate::engine::SyncState;
use crate::error::{Result, SyncError};
use crate::queue::PendingChange;

/// Signed-in user behind a push.
///
/// The host's auth middleware attaches it as a request extension so stores
/// can apply per-action rules and stamp rows with the real author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushActor {
    pub role: String,
    #[serde(default)]
    pub employee_id: Option<i64>,
}

/// Applies pushed changes to the real tables.
///
/// Implementations perform the mutation and record it through the change
/// tracker so live subscribers see it, returning the recorded event.
/// `actor` is `None` when no auth layer sits in front of the routes.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn apply_change(
        &self,
        change: &PendingChange,
        client_id: Option<&str>,
        actor: Option<&PushActor>,
    ) -> Result<ChangeEvent>;
}

/// Query parameters for the pull endpoint
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SyncQuery {
    /// Get changes since this version
    #[serde(default)]
    pub since: i64,
}

/// Response for a pull
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub table: String,
    pub version: i64,
    pub changes: Vec<ChangeEvent>,
}

/// Request body for a push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPushRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    pub changes: Vec<PendingChange>,
}

/// Response for a push.
///
/// Changes in neither list were not processed and stay queued on the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncPushResponse {
    pub version: i64,
    pub applied: Vec<Uuid>,
    pub conflicts: Vec<Conflict>,
}

/// Handler for GET /api/sync/:table
pub async fn get_sync_handler(
    State(state): State<SyncState>,
    Path(table): Path<String>,
    Query(params): Query<SyncQuery>,
) -> Result<Json<SyncResponse>> {
    state.ensure_table(&table)?;

    let changes = state.tracker.changes_since(&table, params.since).await?;
    let version = state.tracker.latest_version(&table).await?;

    Ok(Json(SyncResponse {
        table,
        version,
        changes,
    }))
}

/// Handler for POST /api/sync/:table
pub async fn post_sync_handler(
    State(state): State<SyncState>,
    Path(table): Path<String>,
    actor: Option<Extension<PushActor>>,
    Json(request): Json<SyncPushRequest>,
) -> Result<Json<SyncPushResponse>> {
    let actor = actor.map(|Extension(actor)| actor);
    let response = push_changes(&state, &table, request, actor.as_ref()).await?;
    Ok(Json(response))
}

/// Apply a batch of pushed changes in order.
///
/// Rejected changes are reported as conflicts. An internal failure stops the
/// batch; the changes after it are left unreported so the client retries them.
pub async fn push_changes(
    state: &SyncState,
    table: &str,
    request: SyncPushRequest,
    actor: Option<&PushActor>,
) -> Result<SyncPushResponse> {
    state.ensure_table(table)?;

    let client_id = request.client_id.as_deref();
    let mut response = SyncPushResponse::default();

    for change in request.changes {
        if change.table != table {
            response.conflicts.push(Conflict::new(
                change.id,
                change.record_id.clone(),
                None,
                format!("change targets '{}', not '{}'", change.table, table),
            ));
            continue;
        }

        let server_version = match &change.record_id {
            Some(record_id) => state.tracker.record_version(table, record_id).await?,
            None => None,
        };

        if state.config.strategy.rejects(change.base_version, server_version) {
            tracing::info!(
                table,
                record_id = ?change.record_id,
                "rejecting stale change (base {:?}, server {:?})",
                change.base_version,
                server_version
            );
            response.conflicts.push(Conflict::new(
                change.id,
                change.record_id.clone(),
                server_version,
                "record changed on the server",
            ));
            continue;
        }

        match state.store.apply_change(&change, client_id, actor).await {
            Ok(_) => response.applied.push(change.id),
            Err(
                e @ (SyncError::InvalidChange(_)
                | SyncError::Conflict { .. }
                | SyncError::UnknownTable(_)
                | SyncError::Rejected { .. }),
            ) => {
                response
                    .conflicts
                    .push(Conflict::new(change.id, change.record_id.clone(), server_version, e.to_string()));
            }
            Err(e) => {
                tracing::error!("Stopping push batch for {}: {}", table, e);
                break;
            }
        }
    }

    response.version = state.tracker.latest_version(table).await?;
    Ok(response)
}
