//! The request-processing pipeline.
//!
//! One request flows through: block-tag normalization → fingerprint → cache
//! lookup → in-flight coalescing → queue admission → breaker-guarded primary
//! call → archive-fallback decision → at most one fallback call →
//! problematic-response check → cache write → settlement.
//!
//! [`RequestPipeline::process`] is total: every failure mode becomes a
//! JSON-RPC error response, never a Rust error. The upstream leg runs in a
//! spawned task so a disconnecting client cannot cancel work that coalesced
//! waiters and the cache write depend on.

pub mod coalescer;
pub mod dispatcher;

use crate::{
    cache::{policy, BlockNumberCache, CachePolicy, CacheStore, Cacheability},
    config::AppConfig,
    metrics,
    network::{Network, NetworkRegistry, UpstreamDescriptor, UpstreamKind},
    stats::ProxyStats,
    types::{CacheStatus, JsonRpcRequest, JsonRpcResponse, RpcParams, UPSTREAM_ERROR_CODE},
    upstream::{
        failover, BreakerSnapshot, CircuitBreaker, FailoverReason, QueueError, QueueSnapshot,
        RequestQueue, UpstreamClient, UpstreamError, UpstreamReply,
    },
    utils::{block_param, fingerprint},
};
use coalescer::{FlightGuard, FlightOutcome, FlightSlot, InflightTable, Outcome};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Instant};

/// Per-network breaker and admission queue, partitioned so one network's
/// trouble never throttles another.
struct NetworkState {
    breaker: CircuitBreaker,
    queue: RequestQueue,
}

/// Per-network snapshot exposed by `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub network: String,
    pub breaker: BreakerSnapshot,
    pub queue: QueueSnapshot,
}

/// Shared pipeline state; cloned `Arc` rides into the detached fetch tasks.
struct PipelineInner {
    registry: Arc<NetworkRegistry>,
    cache: Arc<dyn CacheStore>,
    policy: CachePolicy,
    client: Arc<UpstreamClient>,
    inflight: InflightTable,
    block_numbers: Arc<BlockNumberCache>,
    stats: Arc<ProxyStats>,
    network_states: HashMap<Arc<str>, NetworkState>,
}

#[derive(Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

impl RequestPipeline {
    #[must_use]
    pub fn new(
        config: &AppConfig,
        registry: Arc<NetworkRegistry>,
        cache: Arc<dyn CacheStore>,
        client: Arc<UpstreamClient>,
        block_numbers: Arc<BlockNumberCache>,
        stats: Arc<ProxyStats>,
    ) -> Self {
        let network_states = registry
            .iter()
            .map(|network| {
                let state = NetworkState {
                    breaker: CircuitBreaker::new(
                        config.breaker.failure_threshold,
                        config.breaker_recovery_timeout(),
                        config.breaker_monitoring_period(),
                    ),
                    queue: RequestQueue::new(
                        config.server.queue_concurrency,
                        config.queue_timeout(),
                        config.server.queue_max_per_second,
                        std::time::Duration::from_secs(1),
                    ),
                };
                (Arc::clone(&network.key), state)
            })
            .collect();

        Self {
            inner: Arc::new(PipelineInner {
                registry,
                cache,
                policy: CachePolicy::new(config.cache_max_age()),
                client,
                inflight: InflightTable::new(),
                block_numbers,
                stats,
                network_states,
            }),
        }
    }

    /// Processes one validated JSON-RPC request against a network.
    ///
    /// Never fails: transport and internal errors surface as JSON-RPC error
    /// responses addressed to the caller's id.
    pub async fn process(&self, request: JsonRpcRequest, network_key: &str) -> JsonRpcResponse {
        self.process_with_status(request, network_key).await.0
    }

    /// [`Self::process`] plus how the request was served, for the
    /// `x-cache-status` response header.
    pub async fn process_with_status(
        &self,
        request: JsonRpcRequest,
        network_key: &str,
    ) -> (JsonRpcResponse, CacheStatus) {
        let started = Instant::now();
        let inner = &self.inner;
        inner.stats.incr_requests();
        metrics::record_network_request(network_key, &request.method);

        let caller_id = request.response_id();

        let Some(network) = inner.registry.get(network_key) else {
            // the server resolves network keys before dispatch; reaching here
            // means a routing bug, not a client mistake
            inner.stats.incr_errors();
            return (
                JsonRpcResponse::error(crate::types::INTERNAL_ERROR_CODE, "Internal error", caller_id),
                CacheStatus::Miss,
            );
        };

        let mut request = request;
        let call_targets_latest = inner.normalize_block_tag(&mut request, network_key);

        let cacheability = inner.policy.classify(&request.method, request.params.as_ref());
        let key = fingerprint::cache_key(network_key, &request.method, request.params.as_ref());

        if cacheability.is_cacheable() {
            if let Some(result) = inner.cache.get(&key) {
                inner.stats.incr_cache_hits();
                metrics::record_cache_hit(&request.method);
                let response = JsonRpcResponse::success(result, caller_id);
                inner.record_completion(
                    &request.method,
                    CacheStatus::Hit,
                    Outcome::Success,
                    started,
                    &response,
                );
                return (response, CacheStatus::Hit);
            }
            inner.stats.incr_cache_misses();
            metrics::record_cache_miss(&request.method);
        }

        let (receiver, cache_status) = match inner.inflight.join(&key) {
            FlightSlot::Leader(guard) => {
                let receiver = guard.subscribe();
                let task_inner = Arc::clone(inner);
                let network = network.clone();
                let fetch_request = request.clone();
                let fetch_key = key.clone();
                // Detached: a disconnecting leader must not cancel the call
                // other waiters are coalesced onto, and the cache write must
                // land before the flight settles.
                tokio::spawn(async move {
                    task_inner
                        .fetch_and_store(
                            &network,
                            fetch_request,
                            &fetch_key,
                            cacheability,
                            call_targets_latest,
                            guard,
                        )
                        .await;
                });
                (receiver, CacheStatus::Miss)
            }
            FlightSlot::Follower(receiver) => {
                inner.stats.incr_coalesced();
                (receiver, CacheStatus::Coalesced)
            }
        };

        let shared = InflightTable::wait(receiver).await;
        let response = shared.response.with_id(caller_id);
        inner.record_completion(&request.method, cache_status, shared.outcome, started, &response);
        (response, cache_status)
    }

    /// Exposes the cache store for administrative handlers (`/cache/clear`).
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.inner.cache
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.inner.stats
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.inner.registry
    }

    /// Breaker and queue snapshots for every network, for `/stats`.
    pub async fn network_snapshots(&self) -> Vec<NetworkSnapshot> {
        let mut snapshots = Vec::with_capacity(self.inner.network_states.len());
        for (key, state) in &self.inner.network_states {
            snapshots.push(NetworkSnapshot {
                network: key.to_string(),
                breaker: state.breaker.snapshot().await,
                queue: state.queue.snapshot(),
            });
        }
        snapshots.sort_by(|a, b| a.network.cmp(&b.network));
        snapshots
    }
}

impl PipelineInner {
    /// Rewrites `eth_call`'s `"latest"`/`"pending"` tag to the cached block
    /// number when the per-network block cache is fresh, so callers at the
    /// tip share cache entries. Returns whether the client asked for
    /// `"latest"` — the block-tolerance failover condition keys off the
    /// original tag, not the rewritten one.
    fn normalize_block_tag(&self, request: &mut JsonRpcRequest, network_key: &str) -> bool {
        if request.method != "eth_call" {
            return false;
        }
        let Some(RpcParams::ByPosition(values)) = &mut request.params else {
            return false;
        };
        let Some(tag) = values.get(1).and_then(serde_json::Value::as_str) else {
            return false;
        };
        if !block_param::is_moving_tag(tag) {
            return false;
        }

        let targets_latest = tag == "latest";
        if let Some(block) = self.block_numbers.fresh_block(network_key) {
            values[1] = serde_json::Value::String(block_param::to_hex(block));
        }
        targets_latest
    }

    /// The upstream leg: queue → breaker → primary → fallback decision →
    /// cache write → settle. Runs detached from the leader's request future.
    async fn fetch_and_store(
        &self,
        network: &Network,
        request: JsonRpcRequest,
        key: &str,
        cacheability: Cacheability,
        call_targets_latest: bool,
        guard: FlightGuard,
    ) {
        let outcome = self.fetch(network, &request, call_targets_latest).await;

        if outcome.outcome == Outcome::Success && cacheability.is_cacheable() {
            if let Some(response_error) = &outcome.response.error {
                tracing::debug!(code = response_error.code, "skipping cache write for rpc error");
            } else if let Some(result) = &outcome.response.result {
                match policy::problematic_reason(result) {
                    None => {
                        self.cache.put(key, result.clone(), cacheability.ttl());
                    }
                    Some(reason) => {
                        metrics::record_cache_invalid_entry(&network.key, &request.method, reason);
                        tracing::debug!(
                            method = %request.method,
                            reason = reason.as_str(),
                            "response rejected by cache guard"
                        );
                    }
                }
            }
        }

        // Settled after the cache write: a waiter arriving between settlement
        // and the write would otherwise re-fetch a key the store is about to
        // contain.
        guard.settle(outcome);
    }

    async fn fetch(
        &self,
        network: &Network,
        request: &JsonRpcRequest,
        call_targets_latest: bool,
    ) -> FlightOutcome {
        let Some(state) = self.network_states.get(&network.key) else {
            self.stats.incr_errors();
            return FlightOutcome {
                response: JsonRpcResponse::error(
                    crate::types::INTERNAL_ERROR_CODE,
                    "Internal error",
                    Arc::new(serde_json::Value::Null),
                ),
                outcome: Outcome::Error,
            };
        };

        let _permit = match state.queue.admit().await {
            Ok(permit) => permit,
            Err(QueueError::Saturated) => {
                self.stats.incr_queue_rejections();
                self.stats.incr_errors();
                return self.transport_failure(&UpstreamError::QueueSaturated);
            }
        };

        match self
            .guarded_call(state, network, &network.primary, UpstreamKind::Primary, request)
            .await
        {
            Ok(reply) => {
                let reason = archive_reason_for_reply(&reply, request, call_targets_latest);
                match (reason, &network.fallback) {
                    (Some(reason), Some(fallback)) => {
                        self.fallback_call(state, network, fallback, request, reason).await
                    }
                    _ => FlightOutcome { response: reply.response, outcome: Outcome::Success },
                }
            }
            Err(UpstreamError::CircuitBreakerOpen) => {
                // fail fast: no retry, no fallback
                self.stats.incr_errors();
                tracing::warn!(
                    network = %network.key,
                    method = %request.method,
                    "rejecting request, circuit breaker open"
                );
                FlightOutcome {
                    response: JsonRpcResponse::error(
                        UPSTREAM_ERROR_CODE,
                        "Upstream unavailable",
                        Arc::new(serde_json::Value::Null),
                    ),
                    outcome: Outcome::Error,
                }
            }
            Err(error) => {
                let reason = failover::error_needs_archive(
                    &request.method,
                    call_targets_latest,
                    &error.to_string(),
                );
                match (reason, &network.fallback) {
                    (Some(reason), Some(fallback)) => {
                        self.fallback_call(state, network, fallback, request, reason).await
                    }
                    _ => {
                        self.stats.incr_errors();
                        tracing::warn!(
                            network = %network.key,
                            method = %request.method,
                            error = %error,
                            "primary upstream failed"
                        );
                        self.transport_failure(&error)
                    }
                }
            }
        }
    }

    /// The single permitted fallback attempt; its failure goes to the caller.
    async fn fallback_call(
        &self,
        state: &NetworkState,
        network: &Network,
        fallback: &UpstreamDescriptor,
        request: &JsonRpcRequest,
        reason: FailoverReason,
    ) -> FlightOutcome {
        self.stats.incr_fallback_calls();
        metrics::record_fallback_request(&network.key, UpstreamKind::Fallback, reason);
        metrics::record_archive_request(&network.key, &request.method);
        tracing::debug!(
            network = %network.key,
            method = %request.method,
            reason = reason.as_label(),
            "routing to archive fallback"
        );

        match self
            .guarded_call(state, network, fallback, UpstreamKind::Fallback, request)
            .await
        {
            Ok(reply) => FlightOutcome { response: reply.response, outcome: Outcome::Success },
            Err(error) => {
                self.stats.incr_errors();
                tracing::warn!(
                    network = %network.key,
                    method = %request.method,
                    error = %error,
                    "archive fallback failed"
                );
                self.transport_failure(&error)
            }
        }
    }

    /// One breaker-guarded upstream call with success/failure accounting.
    async fn guarded_call(
        &self,
        state: &NetworkState,
        network: &Network,
        upstream: &UpstreamDescriptor,
        kind: UpstreamKind,
        request: &JsonRpcRequest,
    ) -> Result<UpstreamReply, UpstreamError> {
        if !state.breaker.try_acquire().await {
            self.stats.incr_breaker_rejections();
            metrics::record_routing_decision(&network.key, kind, "breaker_open");
            return Err(UpstreamError::CircuitBreakerOpen);
        }

        self.stats.incr_upstream_calls();
        metrics::record_routing_decision(&network.key, kind, "forward");

        let started = Instant::now();
        let result = self.client.call(upstream, request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        metrics::record_upstream_response_time(&network.key, kind, elapsed_ms);

        match &result {
            Ok(reply) => {
                // a reply carrying an rpc error object is a successful transport
                state.breaker.on_success().await;
                metrics::record_upstream_status(reply.status);
            }
            Err(error) => {
                if let UpstreamError::HttpStatus(code) = error {
                    metrics::record_upstream_status(*code);
                }
                if error.is_breaker_failure() {
                    state.breaker.on_failure().await;
                } else {
                    // non-breaker failures (e.g. HTTP 4xx) still settle a
                    // half-open probe
                    state.breaker.on_success().await;
                }
            }
        }

        result
    }

    fn transport_failure(&self, error: &UpstreamError) -> FlightOutcome {
        let response = match error {
            UpstreamError::CircuitBreakerOpen => JsonRpcResponse::error(
                UPSTREAM_ERROR_CODE,
                "Upstream unavailable",
                Arc::new(serde_json::Value::Null),
            ),
            other => JsonRpcResponse::upstream_error(
                other.to_string(),
                Arc::new(serde_json::Value::Null),
            ),
        };
        FlightOutcome { response, outcome: Outcome::Error }
    }

    fn record_completion(
        &self,
        method: &str,
        cache_status: CacheStatus,
        outcome: Outcome,
        started: Instant,
        response: &JsonRpcResponse,
    ) {
        metrics::record_http_request(method, cache_status, outcome.as_label());
        metrics::record_request_duration(
            method,
            cache_status,
            started.elapsed().as_secs_f64() * 1_000.0,
        );
        if let Ok(serialized) = serde_json::to_vec(response) {
            metrics::record_response_size(method, serialized.len());
        }
    }
}

fn archive_reason_for_reply(
    reply: &UpstreamReply,
    request: &JsonRpcRequest,
    call_targets_latest: bool,
) -> Option<FailoverReason> {
    if let Some(error) = &reply.response.error {
        return failover::error_needs_archive(
            &request.method,
            call_targets_latest,
            &error.combined_text(),
        );
    }

    let is_null = reply.response.result.as_ref().is_none_or(serde_json::Value::is_null);
    if is_null && failover::null_result_needs_archive(&request.method, request.params.as_ref()) {
        return Some(FailoverReason::NullResult);
    }

    None
}
