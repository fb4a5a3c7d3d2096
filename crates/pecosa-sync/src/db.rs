// File: pecosa-sync/src/db.rs
// Purpose: SQLite connection pool setup

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

/// Open a SQLite pool for a `sqlite:` URL, creating the file if missing.
///
/// In-memory databases are pinned to a single long-lived connection,
/// otherwise every pooled connection would see its own empty database.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?
    };

    tracing::debug!(database_url, "database pool ready");
    Ok(pool)
}
