//! Per-network block-number cache.
//!
//! Holds the most recently observed chain tip for each network, refreshed by
//! an out-of-band warmer. The pipeline reads it to rewrite `eth_call`
//! `"latest"` tags into concrete block numbers so that clients asking for
//! "latest" share cache entries during the freshness window. The pipeline
//! never refreshes this cache synchronously; a cold or stale entry simply
//! disables the rewrite.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Freshness window: within it, two `eth_call`s with `"latest"` share a
/// cache entry; beyond it they may not.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct TipEntry {
    last_block: u64,
    fetched_at: Instant,
}

/// Concurrent map network key → latest observed block number.
#[derive(Default)]
pub struct BlockNumberCache {
    tips: DashMap<String, TipEntry>,
}

impl BlockNumberCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly observed chain tip for `network`.
    pub fn record(&self, network: &str, block: u64) {
        self.tips.insert(
            network.to_string(),
            TipEntry { last_block: block, fetched_at: Instant::now() },
        );
    }

    /// Returns the cached tip if it is fresher than [`FRESHNESS_WINDOW`].
    #[must_use]
    pub fn fresh_block(&self, network: &str) -> Option<u64> {
        let entry = self.tips.get(network)?;
        if entry.fetched_at.elapsed() < FRESHNESS_WINDOW {
            Some(entry.last_block)
        } else {
            None
        }
    }

    /// Returns the cached tip regardless of age, for diagnostics.
    #[must_use]
    pub fn last_block(&self, network: &str) -> Option<u64> {
        self.tips.get(network).map(|entry| entry.last_block)
    }
}
