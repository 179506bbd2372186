//! Cacheability policy and the problematic-response guard.
//!
//! Methods fall into three sets: infinitely cacheable (immutable chain data),
//! time cacheable (data that moves with the chain tip), and everything else.
//! Two promotions lift time-cacheable calls to infinite when their params pin
//! them to a specific historical block.
//!
//! Responses that *look* successful but carry no usable data must never reach
//! the store — caching an upstream's transient "I don't know" would poison
//! every future read of that key.

use crate::{types::RpcParams, utils::block_param};
use std::time::Duration;

/// Methods whose results are immutable once observed.
pub const INFINITELY_CACHEABLE: &[&str] = &[
    "eth_chainId",
    "net_version",
    "eth_getTransactionReceipt",
    "eth_getTransactionByHash",
    "eth_getBlockByHash",
];

/// Methods whose results move with the chain tip and expire after
/// `cache.max_age`.
pub const TIME_CACHEABLE: &[&str] = &[
    "eth_blockNumber",
    "eth_gasPrice",
    "eth_getLogs",
    "eth_call",
    "eth_getBlockByNumber",
    "eth_getBalance",
    "eth_getCode",
    "eth_getStorageAt",
];

/// Result of classifying a request against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    /// Never expires.
    Infinite,
    /// Expires after the configured max age.
    Bounded(Duration),
    /// Never stored.
    None,
}

impl Cacheability {
    /// TTL to hand the store: `None` for infinite entries. Non-cacheable
    /// classifications are filtered out before a TTL is requested; a zero
    /// duration is returned as a backstop.
    #[must_use]
    pub fn ttl(self) -> Option<Duration> {
        match self {
            Cacheability::Infinite => None,
            Cacheability::Bounded(ttl) => Some(ttl),
            Cacheability::None => Some(Duration::ZERO),
        }
    }

    #[must_use]
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Cacheability::None)
    }
}

/// Reason a response was rejected by the problematic-response guard,
/// used as the `reason` label on `rpc_cache_invalid_entries_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    NullResult,
    EmptyArray,
    EmptyObject,
    ErrorString,
    Unknown,
}

impl InvalidReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::NullResult => "null_result",
            InvalidReason::EmptyArray => "empty_array",
            InvalidReason::EmptyObject => "empty_object",
            InvalidReason::ErrorString => "error_string",
            InvalidReason::Unknown => "unknown",
        }
    }
}

/// The cacheability policy: method sets plus the configured bounded TTL.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    max_age: Duration,
}

impl CachePolicy {
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// Classifies a request. Params participate through the two promotions:
    ///
    /// - `eth_call` pinned to a block hash (`params[0].blockHash`) or to a
    ///   hex block tag (`params[1]` is `0x…`) is immutable.
    /// - `eth_getBlockByNumber` with a concrete hex number is immutable.
    #[must_use]
    pub fn classify(&self, method: &str, params: Option<&RpcParams>) -> Cacheability {
        if INFINITELY_CACHEABLE.contains(&method) {
            return Cacheability::Infinite;
        }
        if !TIME_CACHEABLE.contains(&method) {
            return Cacheability::None;
        }

        match method {
            "eth_call" if Self::call_is_pinned(params) => Cacheability::Infinite,
            "eth_getBlockByNumber" if Self::block_param_is_specific(params) => {
                Cacheability::Infinite
            }
            _ => Cacheability::Bounded(self.max_age),
        }
    }

    fn call_is_pinned(params: Option<&RpcParams>) -> bool {
        let Some(params) = params else { return false };

        if params
            .position(0)
            .and_then(|call| call.get("blockHash"))
            .is_some()
        {
            return true;
        }

        params
            .position_str(1)
            .is_some_and(block_param::is_specific_block)
    }

    fn block_param_is_specific(params: Option<&RpcParams>) -> bool {
        params
            .and_then(|p| p.position_str(0))
            .is_some_and(block_param::is_specific_block)
    }
}

/// Checks a successful `result` payload against the cache-poisoning guard.
///
/// Returns the rejection reason, or `None` when the payload is safe to store.
#[must_use]
pub fn problematic_reason(result: &serde_json::Value) -> Option<InvalidReason> {
    match result {
        serde_json::Value::Null => Some(InvalidReason::NullResult),
        serde_json::Value::Array(values) if values.is_empty() => Some(InvalidReason::EmptyArray),
        serde_json::Value::Object(map) if map.is_empty() => Some(InvalidReason::EmptyObject),
        serde_json::Value::String(s)
            if s.contains("error") || s.contains("not found") || s.contains("unavailable") =>
        {
            Some(InvalidReason::ErrorString)
        }
        _ => None,
    }
}
