//! Store used where no persistent storage exists

use async_trait::async_trait;

use crate::error::Result;
use crate::storage::LocalStore;

/// Every read misses and every write succeeds without effect
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl LocalStore for NoopStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
