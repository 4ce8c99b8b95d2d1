//! In-memory key-value store backed by a sharded map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::store::{KvStore, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A process-local [`KvStore`].
///
/// Expired entries are dropped lazily on read and by [`MemoryKvStore::purge_expired`].
/// When full, inserting a new key evicts an arbitrary existing one.
#[derive(Debug, Clone)]
pub struct MemoryKvStore {
    inner: Arc<DashMap<String, Entry>>,
    max_entries: usize,
}

impl MemoryKvStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.inner.len())
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_janitor(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Purged expired counters");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    fn make_room(&self) {
        if self.inner.len() < self.max_entries {
            return;
        }
        if self.purge_expired() > 0 && self.inner.len() < self.max_entries {
            return;
        }
        let victim = self.inner.iter().next().map(|r| r.key().clone());
        if let Some(key) = victim {
            self.inner.remove(&key);
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let value = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => None,
            None => return Ok(None),
        };
        // Expired: drop it outside the read guard.
        self.inner.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(value)
    }

    async fn put(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        if !self.inner.contains_key(key) {
            self.make_room();
        }
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.inner.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}
