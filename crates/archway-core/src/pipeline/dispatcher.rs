//! Batch dispatch.
//!
//! Splits a JSON payload into single requests, runs each through the
//! pipeline with bounded parallelism, and reassembles responses in request
//! order. Item failures are isolated: a malformed or failing item yields a
//! JSON-RPC error object at its position and never aborts the batch.

use crate::{
    pipeline::RequestPipeline,
    types::{CacheStatus, JsonRpcRequest, JsonRpcResponse},
};
use futures::{stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// Dispatch result: the JSON body plus the value for the `x-cache-status`
/// response header. Batches aggregate to `PARTIAL` when any item was served
/// from cache.
pub struct DispatchOutcome {
    pub body: Value,
    pub cache_header: &'static str,
}

pub struct Dispatcher {
    pipeline: Arc<RequestPipeline>,
    batch_concurrency_limit: usize,
}

impl Dispatcher {
    #[must_use]
    pub fn new(pipeline: Arc<RequestPipeline>, batch_concurrency_limit: usize) -> Self {
        Self { pipeline, batch_concurrency_limit: batch_concurrency_limit.max(1) }
    }

    /// Handles a parsed request body: a batch array or a single object.
    ///
    /// Batches map to arrays of the same length and order; an empty batch
    /// maps to an empty array.
    pub async fn dispatch(&self, payload: Value, network_key: &str) -> DispatchOutcome {
        match payload {
            Value::Array(items) => {
                let batch_size = items.len();
                tracing::debug!(batch_size, network = network_key, "dispatching batch");

                let results: Vec<(Value, bool)> = stream::iter(items)
                    .map(|item| self.dispatch_item(item, network_key))
                    // buffered preserves input order while bounding parallelism
                    .buffered(self.batch_concurrency_limit)
                    .collect()
                    .await;

                let any_hit = results.iter().any(|(_, hit)| *hit);
                let responses = results.into_iter().map(|(value, _)| value).collect();

                DispatchOutcome {
                    body: Value::Array(responses),
                    cache_header: if any_hit { "PARTIAL" } else { "MISS" },
                }
            }
            other => {
                let (body, status) = self.dispatch_single(other, network_key).await;
                DispatchOutcome { body, cache_header: status.as_str() }
            }
        }
    }

    async fn dispatch_item(&self, item: Value, network_key: &str) -> (Value, bool) {
        let (value, status) = self.dispatch_single(item, network_key).await;
        (value, matches!(status, CacheStatus::Hit | CacheStatus::Coalesced))
    }

    async fn dispatch_single(&self, item: Value, network_key: &str) -> (Value, CacheStatus) {
        // capture the id before the item is consumed, so parse failures can
        // still address their error response
        let item_id = item.get("id").cloned().unwrap_or(Value::Null);

        let request: JsonRpcRequest = match serde_json::from_value(item) {
            Ok(request) => request,
            Err(e) => {
                let response = JsonRpcResponse::error(
                    -32600,
                    format!("Invalid request: {e}"),
                    Arc::new(item_id),
                );
                return (
                    serde_json::to_value(response).unwrap_or(Value::Null),
                    CacheStatus::Miss,
                );
            }
        };

        if request.jsonrpc != crate::types::JSONRPC_VERSION {
            let response = JsonRpcResponse::error(
                -32600,
                "Invalid request: jsonrpc must be \"2.0\"",
                Arc::new(item_id),
            );
            return (
                serde_json::to_value(response).unwrap_or(Value::Null),
                CacheStatus::Miss,
            );
        }

        let (response, status) = self.pipeline.process_with_status(request, network_key).await;
        (serde_json::to_value(response).unwrap_or(Value::Null), status)
    }
}
