//! Local persistence adapter
//!
//! A string key-value store in the shape of browser `localStorage`. Backends
//! implement [`LocalStore`]; the rest of the crate talks to the
//! [`LocalStorage`] facade, which never lets a storage failure escape.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

pub mod filesystem;
pub mod memory;
pub mod noop;

pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
pub use noop::NoopStore;

/// Trait for local key-value backends
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; missing keys are not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// All stored keys
    async fn keys(&self) -> Result<Vec<String>>;

    /// Remove every key
    async fn clear(&self) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Backend selection, as read from configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Filesystem {
        path: PathBuf,
    },
    /// Storage unavailable (headless/server contexts): reads miss, writes vanish
    Noop,
}

impl StorageBackend {
    pub async fn build(&self) -> Result<Arc<dyn LocalStore>> {
        let store: Arc<dyn LocalStore> = match self {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Filesystem { path } => Arc::new(FilesystemStore::new(path).await?),
            StorageBackend::Noop => Arc::new(NoopStore),
        };
        tracing::debug!("Local storage backend: {}", store.name());
        Ok(store)
    }
}

/// Failure-isolating facade over a [`LocalStore`].
///
/// Reads that fail behave like misses and writes that fail are dropped,
/// both with a warning in the log.
#[derive(Clone)]
pub struct LocalStorage {
    store: Arc<dyn LocalStore>,
}

impl LocalStorage {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopStore))
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    pub async fn get_item(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Error reading '{}' from {} storage: {}", key, self.store.name(), e);
                None
            }
        }
    }

    pub async fn set_item(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            tracing::warn!("Error writing '{}' to {} storage: {}", key, self.store.name(), e);
        }
    }

    pub async fn remove_item(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            tracing::warn!("Error removing '{}' from {} storage: {}", key, self.store.name(), e);
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.store.keys().await.unwrap_or_else(|e| {
            tracing::warn!("Error listing {} storage: {}", self.store.name(), e);
            Vec::new()
        })
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!("Error clearing {} storage: {}", self.store.name(), e);
        }
    }

    /// Read and decode a JSON value. Corrupt entries read as missing.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_item(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring corrupt value under '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_item(key, &raw).await,
            Err(e) => tracing::warn!("Error serializing value for '{}': {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    struct Broken;

    #[async_trait]
    impl LocalStore for Broken {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(SyncError::Storage("quota exceeded".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(SyncError::Storage("quota exceeded".into()))
        }
        async fn remove(&self, _key: &str) -> Result<()> {
            Err(SyncError::Storage("quota exceeded".into()))
        }
        async fn keys(&self) -> Result<Vec<String>> {
            Err(SyncError::Storage("quota exceeded".into()))
        }
        async fn clear(&self) -> Result<()> {
            Err(SyncError::Storage("quota exceeded".into()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let storage = LocalStorage::new(Arc::new(Broken));
        storage.set_item("k", "v").await;
        assert_eq!(storage.get_item("k").await, None);
        assert!(storage.keys().await.is_empty());
        storage.remove_item("k").await;
        storage.clear().await;
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let storage = LocalStorage::memory();
        storage.set_json("cart", &vec![1, 2, 3]).await;
        assert_eq!(storage.get_json::<Vec<i32>>("cart").await, Some(vec![1, 2, 3]));

        storage.set_item("cart", "{not json").await;
        assert_eq!(storage.get_json::<Vec<i32>>("cart").await, None);
    }

    #[tokio::test]
    async fn test_noop_backend() {
        let storage = LocalStorage::noop();
        storage.set_item("k", "v").await;
        assert_eq!(storage.get_item("k").await, None);
        assert_eq!(storage.backend_name(), "noop");
    }

    #[test]
    fn test_backend_from_toml_shape() {
        let backend: StorageBackend =
            serde_json::from_str(r#"{"backend": "filesystem", "path": "/tmp/pecosa"}"#).unwrap();
        assert_eq!(
            backend,
            StorageBackend::Filesystem {
                path: PathBuf::from("/tmp/pecosa")
            }
        );
    }
}
