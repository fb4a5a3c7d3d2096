// File: pecosa-sync/src/error.rs
// Purpose: Error type shared by the sync library

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the change feed, storage adapters and backend client
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    /// The backend answered with a non-success status
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A pushed change lost against a newer server version
    #[error("conflict on {table}/{record_id}: server version {server_version}")]
    Conflict {
        table: String,
        record_id: String,
        server_version: i64,
    },

    /// The target table does not accept synced changes
    #[error("table not synchronized: {0}")]
    UnknownTable(String),

    #[error("invalid change: {0}")]
    InvalidChange(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl SyncError {
    pub fn status(&self) -> StatusCode {
        match self {
            SyncError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            SyncError::Http(_) => StatusCode::BAD_GATEWAY,
            SyncError::Conflict { .. } => StatusCode::CONFLICT,
            SyncError::UnknownTable(_) => StatusCode::NOT_FOUND,
            SyncError::InvalidChange(_) => StatusCode::BAD_REQUEST,
            SyncError::Database(_) | SyncError::Serialization(_) | SyncError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!("Sync request failed: {}", self);
            "Error interno del servidor".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
