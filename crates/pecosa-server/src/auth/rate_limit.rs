// File: src/auth/rate_limit.rs
// Purpose: Failed-login lockout backed by the login_attempts table

use chrono::{Duration, Utc};
use sqlx::SqlitePool;

/// Counts failed logins per username inside a sliding window
#[derive(Clone)]
pub struct LoginRateLimiter {
    pool: SqlitePool,
    max_failures: i64,
    window: Duration,
}

impl LoginRateLimiter {
    pub fn new(pool: SqlitePool, max_failures: i64, window_minutes: i64) -> Self {
        Self {
            pool,
            max_failures,
            window: Duration::minutes(window_minutes),
        }
    }

    /// Whether `username` has used up its failures for the current window
    pub async fn is_locked(&self, username: &str) -> Result<bool, sqlx::Error> {
        let since = Utc::now() - self.window;
        let failures: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM login_attempts WHERE username = ? AND success = 0 AND attempted_at > ?",
        )
        .bind(username)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(failures >= self.max_failures)
    }

    pub async fn record(&self, username: &str, success: bool) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO login_attempts (username, success, attempted_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(success)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if !success {
            tracing::info!(username, "failed login attempt");
        }
        Ok(())
    }

    /// Drop attempts that can no longer affect a lockout
    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let since = Utc::now() - self.window;
        let result = sqlx::query("DELETE FROM login_attempts WHERE attempted_at <= ?")
            .bind(since)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn limiter(max: i64) -> LoginRateLimiter {
        let pool = crate::db::connect("sqlite::memory:").await.unwrap();
        LoginRateLimiter::new(pool, max, 15)
    }

    #[tokio::test]
    async fn test_locks_after_max_failures() {
        let limiter = limiter(3).await;
        for _ in 0..2 {
            limiter.record("admin", false).await.unwrap();
        }
        assert!(!limiter.is_locked("admin").await.unwrap());

        limiter.record("admin", false).await.unwrap();
        assert!(limiter.is_locked("admin").await.unwrap());
        assert!(!limiter.is_locked("cocina").await.unwrap());
    }

    #[tokio::test]
    async fn test_successes_do_not_count() {
        let limiter = limiter(1).await;
        limiter.record("admin", true).await.unwrap();
        assert!(!limiter.is_locked("admin").await.unwrap());
    }

    #[tokio::test]
    async fn test_window_expiry() {
        let pool = crate::db::connect("sqlite::memory:").await.unwrap();
        let limiter = LoginRateLimiter::new(pool.clone(), 1, 15);
        sqlx::query("INSERT INTO login_attempts (username, success, attempted_at) VALUES ('admin', 0, ?)")
            .bind(Utc::now() - Duration::minutes(30))
            .execute(&pool)
            .await
            .unwrap();

        assert!(!limiter.is_locked("admin").await.unwrap());
        assert_eq!(limiter.purge_expired().await.unwrap(), 1);
    }
}
