// File: pecosa-sync/src/lib.rs
// Purpose: Main entry point for the pecosa-sync library

//! # pecosa-sync
//!
//! Realtime mirror lists and offline sync for the La Pecosa point of sale.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pecosa_sync::{BackendClient, Subscription, SubscriptionOptions, SortDirection};
//!
//! let client = BackendClient::new("http://localhost:3000", None);
//! client.login("cocina", "secreto").await?;
//!
//! let initial = client.fetch_rows("orders", &[]).await?;
//! let feed = client.poll_feed("orders", 0, Duration::from_secs(2));
//! let mut orders = Subscription::<serde_json::Value>::open(
//!     "orders",
//!     initial,
//!     feed,
//!     SubscriptionOptions::new()
//!         .filter("status", "pendiente")
//!         .order_by("created_at", SortDirection::Desc),
//! );
//!
//! while orders.changed().await {
//!     render(orders.data());
//! }
//! ```
//!
//! On the server side, [`SyncEngine::routes`] mounts the pull/push API and
//! the SSE and WebSocket feeds on an axum router.

pub mod change_tracker;
pub mod client;
pub mod conflict;
pub mod connection;
pub mod db;
pub mod engine;
pub mod error;
pub mod feed;
pub mod filter;
pub mod mirror;
pub mod queue;
pub mod record;
pub mod sse;
pub mod storage;
pub mod subscription;
pub mod sync;
pub mod sync_api;
pub mod websocket;

// Re-export main types
pub use change_tracker::{ChangeAction, ChangeEvent, ChangeTracker};
pub use client::{AuthUser, BackendClient, SESSION_COOKIE};
pub use conflict::{Conflict, SyncStrategy};
pub use connection::{spawn_probe, ConnectionMonitor, ConnectionStatus, ConnectivityProbe};
pub use engine::{SyncConfig, SyncEngine, SyncState};
pub use error::{Result, SyncError};
pub use feed::{ChangeFeed, FeedEvent};
pub use filter::EqFilter;
pub use mirror::{MirrorList, MirrorOp, SortDirection, SortSpec};
pub use queue::{PendingChange, SyncQueue};
pub use record::{Record, RecordKey};
pub use storage::{LocalStorage, LocalStore, StorageBackend};
pub use subscription::{Subscription, SubscriptionOptions, SubscriptionState};
pub use sync::{spawn_auto_sync, QueueSyncService, SyncOutcome, SyncService, SyncTransport};
pub use sync_api::{PushActor, SyncPushRequest, SyncPushResponse, SyncResponse, TableStore};
pub use websocket::{RealtimeMessage, TableAccess};

/// Version of the sync protocol
pub const SYNC_PROTOCOL_VERSION: &str = "1.0.0";
