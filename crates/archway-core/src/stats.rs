//! Process-wide runtime counters.
//!
//! Cheap monotonic atomics behind the `/stats` endpoint, complementing the
//! Prometheus series with an easily scrapeable JSON snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ProxyStats {
    requests_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    upstream_calls: AtomicU64,
    fallback_calls: AtomicU64,
    errors: AtomicU64,
    queue_rejections: AtomicU64,
    breaker_rejections: AtomicU64,
}

/// Serializable point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub requests_total: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub upstream_calls: u64,
    pub fallback_calls: u64,
    pub errors: u64,
    pub queue_rejections: u64,
    pub breaker_rejections: u64,
}

impl ProxyStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_upstream_calls(&self) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_fallback_calls(&self) {
        self.fallback_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_queue_rejections(&self) {
        self.queue_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_breaker_rejections(&self) {
        self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            fallback_calls: self.fallback_calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            queue_rejections: self.queue_rejections.load(Ordering::Relaxed),
            breaker_rejections: self.breaker_rejections.load(Ordering::Relaxed),
        }
    }
}
