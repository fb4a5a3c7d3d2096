// File: pecosa-sync/src/conflict.rs
// Purpose: Conflict policy for changes pushed by offline clients

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conflict resolution strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Pushed changes always apply (last write wins by arrival)
    #[default]
    ClientWins,
    /// A pushed change is rejected if the row changed after the client's base version
    ServerWins,
}

impl SyncStrategy {
    /// Whether a pushed change must be rejected.
    ///
    /// `base_version` is the table version the client had seen; `server_version`
    /// is the version of the row's latest change on the server.
    pub fn rejects(&self, base_version: Option<i64>, server_version: Option<i64>) -> bool {
        match (self, base_version, server_version) {
            (SyncStrategy::ServerWins, Some(base), Some(server)) => server > base,
            _ => false,
        }
    }
}

/// A pushed change that was not applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub change_id: Uuid,
    pub record_id: Option<String>,
    pub server_version: Option<i64>,
    pub reason: String,
}

impl Conflict {
    pub fn new(change_id: Uuid, record_id: Option<String>, server_version: Option<i64>, reason: impl Into<String>) -> Self {
        Self {
            change_id,
            record_id,
            server_version,
            reason: reason.into(),
        }
    }
}
