//! Prometheus metrics.
//!
//! A single recorder is installed process-wide; the server renders the handle
//! at `/metrics`. Counters and histograms are recorded through the `metrics`
//! facade — atomic on the hot path, no locks.
//!
//! Label cardinality is bounded: method names come from a fixed match table,
//! and network keys are interned once per process (the set is fixed at
//! startup, so the leak is bounded to a few short strings).

use crate::{cache::InvalidReason, network::UpstreamKind, types::CacheStatus, upstream::FailoverReason};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{borrow::Cow, sync::OnceLock};

pub const HTTP_REQUESTS_TOTAL: &str = "rpc_http_requests_total";
pub const UPSTREAM_RESPONSES_TOTAL: &str = "rpc_http_upstream_responses_total";
pub const CACHE_HITS_TOTAL: &str = "rpc_cache_hits_total";
pub const CACHE_MISSES_TOTAL: &str = "rpc_cache_misses_total";
pub const REQUEST_DURATION_MS: &str = "rpc_request_duration_ms";
pub const RESPONSE_SIZE_BYTES: &str = "rpc_response_size_bytes";
pub const FALLBACK_REQUESTS_TOTAL: &str = "rpc_fallback_requests_total";
pub const UPSTREAM_RESPONSE_TIME_MS: &str = "rpc_upstream_response_time_ms";
pub const NETWORK_REQUESTS_TOTAL: &str = "rpc_network_requests_total";
pub const ROUTING_DECISIONS_TOTAL: &str = "rpc_routing_decisions_total";
pub const ARCHIVE_NODE_REQUESTS_TOTAL: &str = "rpc_archive_node_requests_total";
pub const CACHE_INVALID_ENTRIES_TOTAL: &str = "rpc_cache_invalid_entries_total";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static NETWORK_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

/// Installs the Prometheus recorder, once. Later calls return the existing
/// handle (tests construct many pipelines in one process).
pub fn install_recorder() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                // A second recorder in the process: metrics silently no-op,
                // which is acceptable for embedded/test usage.
                tracing::warn!(error = %e, "prometheus recorder already installed");
                PrometheusBuilder::new().build_recorder().handle()
            }
        }
    })
}

/// Renders the current exposition text.
#[must_use]
pub fn render() -> String {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}

#[inline]
fn network_label(network: &str) -> Cow<'static, str> {
    let pool = NETWORK_NAME_POOL.get_or_init(dashmap::DashMap::new);
    if let Some(interned) = pool.get(network) {
        return Cow::Borrowed(*interned);
    }
    let leaked: &'static str = Box::leak(network.to_string().into_boxed_str());
    pool.insert(network.to_string(), leaked);
    Cow::Borrowed(leaked)
}

#[inline]
fn method_label(method: &str) -> Cow<'static, str> {
    match method {
        "net_version" => Cow::Borrowed("net_version"),
        "eth_blockNumber" => Cow::Borrowed("eth_blockNumber"),
        "eth_chainId" => Cow::Borrowed("eth_chainId"),
        "eth_gasPrice" => Cow::Borrowed("eth_gasPrice"),
        "eth_getBalance" => Cow::Borrowed("eth_getBalance"),
        "eth_getBlockByHash" => Cow::Borrowed("eth_getBlockByHash"),
        "eth_getBlockByNumber" => Cow::Borrowed("eth_getBlockByNumber"),
        "eth_getLogs" => Cow::Borrowed("eth_getLogs"),
        "eth_getTransactionByHash" => Cow::Borrowed("eth_getTransactionByHash"),
        "eth_getTransactionReceipt" => Cow::Borrowed("eth_getTransactionReceipt"),
        "eth_getCode" => Cow::Borrowed("eth_getCode"),
        "eth_getStorageAt" => Cow::Borrowed("eth_getStorageAt"),
        "eth_call" => Cow::Borrowed("eth_call"),
        _ => Cow::Owned(method.to_string()),
    }
}

pub fn record_http_request(method: &str, cache_status: CacheStatus, outcome: &'static str) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method_label(method),
        "cache_status" => cache_status.as_label(),
        "outcome" => outcome,
    )
    .increment(1);
}

pub fn record_upstream_status(status_code: u16) {
    counter!(UPSTREAM_RESPONSES_TOTAL, "status_code" => status_code.to_string()).increment(1);
}

pub fn record_cache_hit(method: &str) {
    counter!(CACHE_HITS_TOTAL, "method" => method_label(method)).increment(1);
}

pub fn record_cache_miss(method: &str) {
    counter!(CACHE_MISSES_TOTAL, "method" => method_label(method)).increment(1);
}

pub fn record_request_duration(method: &str, cache_status: CacheStatus, duration_ms: f64) {
    histogram!(
        REQUEST_DURATION_MS,
        "method" => method_label(method),
        "cache_status" => cache_status.as_label(),
    )
    .record(duration_ms);
}

pub fn record_response_size(method: &str, bytes: usize) {
    histogram!(RESPONSE_SIZE_BYTES, "method" => method_label(method)).record(bytes as f64);
}

pub fn record_fallback_request(network: &str, kind: UpstreamKind, reason: FailoverReason) {
    counter!(
        FALLBACK_REQUESTS_TOTAL,
        "network" => network_label(network),
        "upstream_type" => kind.as_label(),
        "reason" => reason.as_label(),
    )
    .increment(1);
}

pub fn record_upstream_response_time(network: &str, kind: UpstreamKind, duration_ms: f64) {
    histogram!(
        UPSTREAM_RESPONSE_TIME_MS,
        "network" => network_label(network),
        "upstream_type" => kind.as_label(),
    )
    .record(duration_ms);
}

pub fn record_network_request(network: &str, method: &str) {
    counter!(
        NETWORK_REQUESTS_TOTAL,
        "network" => network_label(network),
        "method" => method_label(method),
    )
    .increment(1);
}

pub fn record_routing_decision(network: &str, kind: UpstreamKind, reason: &'static str) {
    counter!(
        ROUTING_DECISIONS_TOTAL,
        "network" => network_label(network),
        "upstream_type" => kind.as_label(),
        "reason" => reason,
    )
    .increment(1);
}

pub fn record_archive_request(network: &str, method: &str) {
    counter!(
        ARCHIVE_NODE_REQUESTS_TOTAL,
        "network" => network_label(network),
        "method" => method_label(method),
    )
    .increment(1);
}

pub fn record_cache_invalid_entry(network: &str, method: &str, reason: InvalidReason) {
    counter!(
        CACHE_INVALID_ENTRIES_TOTAL,
        "network" => network_label(network),
        "method" => method_label(method),
        "reason" => reason.as_str(),
    )
    .increment(1);
}
