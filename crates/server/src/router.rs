//! HTTP handlers for the proxy surface.
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /` | RPC to the default network |
//! | `POST /:network` | RPC to a named network, `404` when unknown |
//! | `GET /health` | liveness + upstream reachability |
//! | `GET /stats` | runtime counters and breaker/queue snapshots |
//! | `GET /metrics` | Prometheus exposition |
//! | `POST /cache/clear` | flush the cache store |
//!
//! Protocol-level RPC errors ship with HTTP 200; only malformed JSON (400),
//! unknown networks (404), and internal faults (500) surface as HTTP errors.

use archway_core::{
    metrics,
    network::UpstreamDescriptor,
    pipeline::{dispatcher::Dispatcher, RequestPipeline},
    types::JsonRpcRequest,
    upstream::UpstreamClient,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub pipeline: Arc<RequestPipeline>,
    pub client: Arc<UpstreamClient>,
    pub started: Instant,
}

type RpcReply = (StatusCode, [(&'static str, String); 1], Json<Value>);

fn reply(status: StatusCode, cache_header: &str, body: Value) -> RpcReply {
    (status, [("x-cache-status", cache_header.to_string())], Json(body))
}

fn parse_error_reply(detail: &str) -> RpcReply {
    reply(
        StatusCode::BAD_REQUEST,
        "MISS",
        json!({
            "jsonrpc": "2.0",
            "error": {"code": -32700, "message": format!("Parse error: {detail}")},
            "id": null
        }),
    )
}

/// `POST /` — RPC against the default network.
pub async fn handle_rpc_default(State(state): State<AppState>, body: Bytes) -> RpcReply {
    let network = state.pipeline.registry().default_key().to_string();
    run_rpc(&state, &network, &body).await
}

/// `POST /:network` — RPC against a named network.
pub async fn handle_rpc_network(
    State(state): State<AppState>,
    Path(network): Path<String>,
    body: Bytes,
) -> RpcReply {
    if state.pipeline.registry().get(&network).is_none() {
        return reply(
            StatusCode::NOT_FOUND,
            "MISS",
            json!({"error": format!("unknown network: {network}")}),
        );
    }
    run_rpc(&state, &network, &body).await
}

async fn run_rpc(state: &AppState, network: &str, body: &[u8]) -> RpcReply {
    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => return parse_error_reply(&e.to_string()),
    };

    let outcome = state.dispatcher.dispatch(payload, network).await;
    reply(StatusCode::OK, outcome.cache_header, outcome.body)
}

/// `GET /health` — liveness plus a reachability probe against the default
/// network's primary upstream.
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let default = state.pipeline.registry().default_network();

    // short probe: health must answer quickly even when the upstream hangs
    let probe_target = UpstreamDescriptor {
        timeout: Duration::from_secs(3).min(default.primary.timeout),
        max_retries: 0,
        ..default.primary.clone()
    };
    let probe = JsonRpcRequest::new("eth_blockNumber", None, json!(1));
    let upstream_connected = state.client.call(&probe_target, &probe).await.is_ok();

    let body = json!({
        "status": if upstream_connected { "healthy" } else { "degraded" },
        "uptime": state.started.elapsed().as_secs(),
        "memory": {"rss_bytes": rss_bytes()},
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": if upstream_connected { "connected" } else { "disconnected" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    let status = if upstream_connected { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}

/// `GET /stats` — runtime counters plus per-network breaker and queue
/// snapshots.
pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    let counters = state.pipeline.stats().snapshot();
    let networks = state.pipeline.network_snapshots().await;

    Json(json!({
        "counters": counters,
        "networks": networks,
        "cache_entries": state.pipeline.cache().len(),
        "uptime": state.started.elapsed().as_secs(),
    }))
}

/// `GET /metrics` — Prometheus exposition format.
pub async fn handle_metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics::render(),
    )
}

/// `POST /cache/clear` — flush the cache store.
pub async fn handle_cache_clear(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.pipeline.cache().len();
    state.pipeline.cache().clear();
    tracing::info!(cleared_entries = entries, "cache flushed by operator");
    Json(json!({"cleared": true}))
}

/// Resident set size from procfs; zero where unavailable.
fn rss_bytes() -> u64 {
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|statm| {
            let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
            Some(pages * 4096)
        })
        .unwrap_or(0)
}
