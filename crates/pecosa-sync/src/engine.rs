// File: pecosa-sync/src/engine.rs
// Purpose: Sync engine wiring: change tracker, table store and HTTP routes

use axum::{routing::get, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    change_tracker::ChangeTracker,
    conflict::SyncStrategy,
    error::{Result, SyncError},
    sse::realtime_events_handler,
    sync_api::{get_sync_handler, post_sync_handler, TableStore},
    websocket::ws_realtime_handler,
};

/// Configuration for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Tables exposed through the sync and realtime routes
    pub tables: Vec<String>,

    /// Conflict policy for pushed changes
    pub strategy: SyncStrategy,

    /// Buffered events per subscriber before it starts lagging
    pub channel_capacity: usize,

    /// Change log retention used by `cleanup`
    pub retention_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            strategy: SyncStrategy::default(),
            channel_capacity: 256,
            retention_days: 30,
        }
    }
}

impl SyncConfig {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Shared state behind the sync routes
#[derive(Clone)]
pub struct SyncState {
    pub tracker: Arc<ChangeTracker>,
    pub store: Arc<dyn TableStore>,
    pub config: Arc<SyncConfig>,
}

impl SyncState {
    /// Reject tables that are not synchronized
    pub fn ensure_table(&self, table: &str) -> Result<()> {
        if self.config.tables.iter().any(|t| t == table) {
            Ok(())
        } else {
            Err(SyncError::UnknownTable(table.to_string()))
        }
    }
}

/// Main sync engine
pub struct SyncEngine {
    state: SyncState,
}

impl SyncEngine {
    pub fn new(tracker: Arc<ChangeTracker>, store: Arc<dyn TableStore>, config: SyncConfig) -> Self {
        tracing::info!("Sync engine serving tables: {}", config.tables.join(", "));
        Self {
            state: SyncState {
                tracker,
                store,
                config: Arc::new(config),
            },
        }
    }

    /// Axum routes for the sync API and the realtime feeds
    pub fn routes<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route("/api/sync/:table", get(get_sync_handler).post(post_sync_handler))
            // WebSocket (bidirectional) and SSE (read-only) realtime feeds
            .route("/api/realtime/ws", get(ws_realtime_handler))
            .route("/api/realtime/:table", get(realtime_events_handler))
            .with_state(self.state.clone())
    }

    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.state.tracker
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Clean up change log entries past the retention window
    pub async fn cleanup(&self) -> Result<u64> {
        let removed = self
            .state
            .tracker
            .cleanup_old_entries(self.state.config.retention_days)
            .await?;
        if removed > 0 {
            tracing::info!("Removed {} old change log entries", removed);
        }
        Ok(removed)
    }
}
