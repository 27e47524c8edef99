//! Persistent key-value store collaborator
//!
//! The storage engine itself lives outside this crate. The result cache and
//! the provider status registry talk to it only through [`KeyValueStore`];
//! every caller treats store failures as best-effort.

use super::errors::StoreResult;
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Async string key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(Some(value))` on hit, `Ok(None)` on miss
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    async fn remove(&self, key: &str) -> StoreResult<()>;

    async fn clear(&self) -> StoreResult<()>;

    /// Name of the backing store for logging
    fn store_name(&self) -> &'static str;
}

/// Process-local store, useful for tests and single-process deployments
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: DashMap<String, String>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> StoreResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        debug!(entries = self.entries.len(), "Clearing in-memory store");
        self.entries.clear();
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "in-memory"
    }
}

/// Store that never keeps anything: reads miss, writes succeed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStore;

#[async_trait]
impl KeyValueStore for NoOpStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String) -> StoreResult<()> {
        Ok(())
    }

    async fn remove(&self, _key: &str) -> StoreResult<()> {
        Ok(())
    }

    async fn clear(&self) -> StoreResult<()> {
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "no-op"
    }
}
