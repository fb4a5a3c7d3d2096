// File: src/context.rs
// Purpose: Backend client and local state shared by every command

use anyhow::{Context as _, Result};
use pecosa_sync::{BackendClient, LocalStorage, StorageBackend, SyncQueue};

use crate::GlobalArgs;

pub const SESSION_KEY: &str = "pecosa.session";
pub const CLIENT_ID_KEY: &str = "pecosa.client_id";

/// A backend client carrying the persisted session and client id
pub struct Context {
    pub client: BackendClient,
    pub storage: LocalStorage,
    pub queue: SyncQueue,
}

impl Context {
    pub async fn open(args: &GlobalArgs) -> Result<Self> {
        let backend = StorageBackend::Filesystem {
            path: args.data_dir.clone(),
        };
        let store = backend
            .build()
            .await
            .with_context(|| format!("Cannot open data directory {:?}", args.data_dir))?;
        let storage = LocalStorage::new(store);

        let client = BackendClient::new(&args.backend, args.anon_key.clone());
        let client = match storage.get_item(CLIENT_ID_KEY).await {
            Some(id) => client.with_client_id(id),
            None => {
                storage.set_item(CLIENT_ID_KEY, client.client_id()).await;
                client
            }
        };
        if let Some(session) = storage.get_item(SESSION_KEY).await {
            client.set_session_cookie(Some(session)).await;
        }

        Ok(Self {
            client,
            queue: SyncQueue::new(storage.clone()),
            storage,
        })
    }

    /// Persist (or forget) the client's current session
    pub async fn save_session(&self) {
        match self.client.session_cookie().await {
            Some(session) => self.storage.set_item(SESSION_KEY, &session).await,
            None => self.storage.remove_item(SESSION_KEY).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dir: &std::path::Path) -> GlobalArgs {
        GlobalArgs {
            backend: "http://127.0.0.1:9".to_string(),
            anon_key: None,
            data_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_client_id_and_session_persist() {
        let dir = tempfile::tempdir().unwrap();

        let first = Context::open(&args(dir.path())).await.unwrap();
        first.client.set_session_cookie(Some("abc.def".to_string())).await;
        first.save_session().await;

        let second = Context::open(&args(dir.path())).await.unwrap();
        assert_eq!(second.client.client_id(), first.client.client_id());
        assert_eq!(second.client.session_cookie().await.as_deref(), Some("abc.def"));

        second.client.set_session_cookie(None).await;
        second.save_session().await;
        let third = Context::open(&args(dir.path())).await.unwrap();
        assert_eq!(third.client.session_cookie().await, None);
    }
}
