//! Key/value cache storage.
//!
//! The pipeline only ever sees the [`CacheStore`] trait; the in-memory store
//! below is the shipped engine, and alternative backends plug in behind the
//! same seam.

use ahash::RandomState;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Storage interface for cached JSON-RPC results.
///
/// Implementations are internally synchronized; the pipeline shares one store
/// across all networks. A `ttl` of `None` means the entry never expires.
pub trait CacheStore: Send + Sync {
    /// Returns the cached result for `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Option<serde_json::Value>;

    /// Stores `value` under `key` with the given lifetime.
    fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>);

    /// Removes every entry.
    fn clear(&self);

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-memory cache store.
///
/// Expired entries are dropped lazily on read; when the store grows past
/// `max_entries`, an insertion sweeps out expired entries and, if still over
/// capacity, evicts arbitrary entries to make room. Eviction order is not
/// specified — the workload is dominated by immutable historical reads, so
/// anything evicted can be refetched.
pub struct MemoryStore {
    entries: DashMap<String, Entry, RandomState>,
    max_entries: usize,
}

impl MemoryStore {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self { entries: DashMap::with_hasher(RandomState::new()), max_entries }
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn put(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        if self.entries.len() >= self.max_entries {
            self.sweep_expired();
            if self.entries.len() >= self.max_entries {
                // Still full of live entries: evict enough to admit the write.
                let overflow = self.entries.len() + 1 - self.max_entries;
                let victims: Vec<String> = self
                    .entries
                    .iter()
                    .take(overflow)
                    .map(|e| e.key().clone())
                    .collect();
                for victim in victims {
                    self.entries.remove(&victim);
                }
            }
        }

        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), Entry { value, expires_at });
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
