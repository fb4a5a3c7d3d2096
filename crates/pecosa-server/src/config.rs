// File: src/config.rs
// Purpose: Configuration parsing from pecosa.toml with environment overrides

use anyhow::{Context, Result};
use pecosa_sync::SyncStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::offline::OfflineConfig;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub offline: OfflineConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Create the demo users, category and product on an empty database
    #[serde(default = "default_true")]
    pub seed: bool,
}

/// Session and login configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for session cookies. Empty means a random key per process.
    #[serde(default)]
    pub session_secret: String,

    /// Only password accepted for accounts still holding a legacy hash
    #[serde(default = "default_legacy_password")]
    pub legacy_password: Option<String>,

    /// Public key clients send as `apikey`. Unset disables the check.
    #[serde(default)]
    pub anon_key: Option<String>,

    #[serde(default = "default_session_days")]
    pub session_days: i64,

    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: i64,

    #[serde(default = "default_lockout_minutes")]
    pub lockout_minutes: i64,

    /// Logout also clears every cookie whose name contains this marker
    #[serde(default = "default_cookie_marker")]
    pub backend_cookie_marker: String,

    /// Mark cookies `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

/// Sync engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub strategy: SyncStrategy,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// How often old change log entries are purged
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

// Default values
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_url() -> String {
    "sqlite://pecosa.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_legacy_password() -> Option<String> {
    Some("pecosa123".to_string())
}

fn default_session_days() -> i64 {
    7
}

fn default_max_failed_attempts() -> i64 {
    5
}

fn default_lockout_minutes() -> i64 {
    15
}

fn default_cookie_marker() -> String {
    "sb-".to_string()
}

fn default_channel_capacity() -> usize {
    256
}

fn default_retention_days() -> i64 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

// Default implementations
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            seed: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            legacy_password: default_legacy_password(),
            anon_key: None,
            session_days: default_session_days(),
            max_failed_attempts: default_max_failed_attempts(),
            lockout_minutes: default_lockout_minutes(),
            backend_cookie_marker: default_cookie_marker(),
            secure_cookies: false,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::default(),
            channel_capacity: default_channel_capacity(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from pecosa.toml
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // If file doesn't exist or is empty, return default config
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Load ./pecosa.toml (or `PECOSA_CONFIG`), then apply environment overrides
    pub fn load_default() -> Result<Self> {
        let path = std::env::var("PECOSA_CONFIG").unwrap_or_else(|_| "pecosa.toml".to_string());
        let mut config = Self::load(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override file values with environment variables.
    /// Takes a lookup function so tests don't touch the process environment.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = var("PECOSA_SESSION_SECRET") {
            self.auth.session_secret = secret;
        }
        if let Some(password) = var("PECOSA_LEGACY_PASSWORD") {
            self.auth.legacy_password = (!password.is_empty()).then_some(password);
        }
        if let Some(key) = var("PECOSA_ANON_KEY") {
            self.auth.anon_key = (!key.is_empty()).then_some(key);
        }
        if let Some(host) = var("PECOSA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PECOSA_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.session_days, 7);
        assert_eq!(config.auth.backend_cookie_marker, "sb-");
        assert_eq!(config.offline.cache_name, "lapecosa-cache-v1");
    }

    #[test]
    fn test_empty_config() {
        let config = toml::from_str::<Config>("").unwrap_or_default();
        assert_eq!(config.database.url, "sqlite://pecosa.db");
        assert!(config.database.seed);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [auth]
            max_failed_attempts = 3
            lockout_minutes = 1

            [sync]
            strategy = "server_wins"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.max_failed_attempts, 3);
        assert_eq!(config.auth.session_days, 7);
        assert_eq!(config.sync.strategy, SyncStrategy::ServerWins);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite::memory:"),
            ("PECOSA_SESSION_SECRET", "s3cret"),
            ("PECOSA_LEGACY_PASSWORD", ""),
            ("PECOSA_PORT", "8080"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.auth.session_secret, "s3cret");
        assert_eq!(config.auth.legacy_password, None);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("pecosa.toml")).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
