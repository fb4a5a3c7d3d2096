//! Filesystem local store
//!
//! One file per key under a directory. Keys are percent-encoded into file
//! names so that `keys()` can recover them exactly.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

use crate::error::{Result, SyncError};
use crate::storage::LocalStore;

const EXTENSION: &str = "val";

/// Persistent store for the terminal client's queue and session
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_to_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(key), EXTENSION))
    }

    fn path_to_key(path: &Path) -> Option<String> {
        if path.extension()?.to_str()? != EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        urlencoding::decode(stem).ok().map(|key| key.into_owned())
    }
}

#[async_trait]
impl LocalStore for FilesystemStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_to_path(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Storage(format!("failed to read '{}': {}", key, e))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.key_to_path(key);
        let value = value.to_owned();

        // Each write gets its own temp file, renamed over the value when complete
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(value.as_bytes())?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| SyncError::Storage(format!("write of '{}' did not complete: {}", key, e)))??;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_to_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(key) = Self::path_to_key(&entry.path()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<()> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();
        store.set("pecosa.session", "abc.def").await.unwrap();

        let reopened = FilesystemStore::new(dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("pecosa.session").await.unwrap().as_deref(),
            Some("abc.def")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_key() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();

        let mut tasks = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move { store.set("session", &n.to_string()).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let value: u32 = store.get("session").await.unwrap().unwrap().parse().unwrap();
        assert!(value < 16);
        // No temp files left behind
        assert_eq!(store.keys().await.unwrap(), vec!["session"]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_keys_round_trip_special_characters() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();
        store.set("orders/today:1", "x").await.unwrap();
        store.set("session", "y").await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["orders/today:1", "session"]);
    }

    #[tokio::test]
    async fn test_missing_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = FilesystemStore::new(dir.path().join("nested")).await.unwrap();
        assert_eq!(store.get("nope").await.unwrap(), None);
        store.remove("nope").await.unwrap();

        store.set("a", "1").await.unwrap();
        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }
}
