use async_trait::async_trait;
use omnigate_core::OmnigateResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Key/value snapshot storage with optional expiry.
///
/// The coordinator treats every error from this trait as best-effort: it is
/// logged and never fails a task or workflow.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn store(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> OmnigateResult<()>;

    /// `None` when the key is missing or expired.
    async fn retrieve(&self, key: &str) -> OmnigateResult<Option<serde_json::Value>>;

    /// Drops expired entries and returns how many were removed. Stores that
    /// expire keys on their own keep the default.
    async fn purge_expired(&self) -> OmnigateResult<usize> {
        Ok(0)
    }

    async fn health(&self) -> OmnigateResult<()> {
        Ok(())
    }
}

struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local [`PersistenceStore`].
#[derive(Default)]
pub struct InMemoryPersistence {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryPersistence {
    async fn store(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
    ) -> OmnigateResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> OmnigateResult<Option<serde_json::Value>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone()))
    }

    async fn purge_expired(&self) -> OmnigateResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }
}
