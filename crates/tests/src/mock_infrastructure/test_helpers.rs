//! Pipeline harness: a `RequestPipeline` + `Dispatcher` wired to mock
//! upstream URLs, with knobs the failure-path tests need.

use archway_core::{
    cache::{BlockNumberCache, CacheStore, MemoryStore},
    config::{AppConfig, NetworkConfig},
    network::NetworkRegistry,
    pipeline::{dispatcher::Dispatcher, RequestPipeline},
    stats::ProxyStats,
    types::JsonRpcRequest,
    upstream::UpstreamClient,
};
use serde_json::Value;
use std::sync::Arc;

/// Network key used by every harness test.
pub const NETWORK: &str = "mainnet";

pub struct Harness {
    pub pipeline: Arc<RequestPipeline>,
    pub dispatcher: Dispatcher,
    pub block_numbers: Arc<BlockNumberCache>,
    pub stats: Arc<ProxyStats>,
}

/// Harness tuning knobs; defaults fit the happy-path tests.
pub struct HarnessOptions {
    pub retries: u32,
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub cache_max_age_secs: u64,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self { retries: 0, timeout_ms: 2_000, failure_threshold: 5, cache_max_age_secs: 30 }
    }
}

impl Harness {
    pub fn new(primary_url: &str, fallback_url: Option<&str>) -> Self {
        Self::with_options(primary_url, fallback_url, HarnessOptions::default())
    }

    pub fn with_options(
        primary_url: &str,
        fallback_url: Option<&str>,
        options: HarnessOptions,
    ) -> Self {
        let mut config = AppConfig::default();
        config.rpc.networks.insert(
            NETWORK.to_string(),
            NetworkConfig {
                url: primary_url.to_string(),
                fallback_url: fallback_url.map(str::to_string),
                timeout: options.timeout_ms,
                retries: options.retries,
                retry_delay: 10,
                priority: None,
            },
        );
        config.cache.max_age = options.cache_max_age_secs;
        config.breaker.failure_threshold = options.failure_threshold;
        config.server.queue_timeout_ms = 2_000;

        let registry = Arc::new(NetworkRegistry::from_config(&config).expect("valid harness config"));
        let client = Arc::new(UpstreamClient::new().expect("http client"));
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryStore::new(1_024));
        let block_numbers = Arc::new(BlockNumberCache::new());
        let stats = Arc::new(ProxyStats::new());

        let pipeline = Arc::new(RequestPipeline::new(
            &config,
            registry,
            cache,
            client,
            Arc::clone(&block_numbers),
            Arc::clone(&stats),
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&pipeline), config.server.batch_concurrency_limit);

        Self { pipeline, dispatcher, block_numbers, stats }
    }
}

/// Builds a validated JSON-RPC request.
#[must_use]
pub fn request(method: &str, params: Value, id: Value) -> JsonRpcRequest {
    let params = match params {
        Value::Null => None,
        other => Some(serde_json::from_value(other).expect("array or object params")),
    };
    JsonRpcRequest::new(method, params, id)
}
