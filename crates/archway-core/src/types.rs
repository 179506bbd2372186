//! Core type definitions for the JSON-RPC 2.0 envelope.
//!
//! # Type Categories
//!
//! ## Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: protocol conformance
//! - [`RpcParams`]: tagged variant over by-position / by-name parameters
//! - [`CacheStatus`]: archway-specific extension reported in the `x-cache-status` header
//!
//! # Performance Notes
//!
//! - `jsonrpc`: `Cow<'static, str>` avoids an allocation when constructing with the
//!   static version string. Use [`JSONRPC_VERSION_COW`] for zero-cost construction.
//! - `id`: `Arc<serde_json::Value>` makes echoing the request id into responses a
//!   reference-count bump instead of a deep clone.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::Arc};

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version string.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// JSON-RPC request parameters.
///
/// The protocol allows `params` to be an array (by-position), an object (by-name),
/// or absent entirely; absence is modeled as `Option<RpcParams>` on the request.
/// The fingerprinting function in [`crate::utils::fingerprint`] is total over all
/// three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcParams {
    /// Positional parameters: `"params": ["0x1", true]`.
    ByPosition(Vec<serde_json::Value>),
    /// Named parameters: `"params": {"block": "0x1"}`.
    ByName(serde_json::Map<String, serde_json::Value>),
}

impl RpcParams {
    /// Returns the positional parameter at `index`, or `None` for by-name
    /// params and out-of-range indices.
    #[must_use]
    pub fn position(&self, index: usize) -> Option<&serde_json::Value> {
        match self {
            RpcParams::ByPosition(values) => values.get(index),
            RpcParams::ByName(_) => None,
        }
    }

    /// Returns the positional parameter at `index` as a string slice.
    #[must_use]
    pub fn position_str(&self, index: usize) -> Option<&str> {
        self.position(index).and_then(serde_json::Value::as_str)
    }

    /// True for `params: []` — the protocol treats it the same as absent params.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            RpcParams::ByPosition(values) => values.is_empty(),
            RpcParams::ByName(map) => map.is_empty(),
        }
    }

    /// Converts the params into a plain `serde_json::Value`.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            RpcParams::ByPosition(values) => serde_json::Value::Array(values.clone()),
            RpcParams::ByName(map) => serde_json::Value::Object(map.clone()),
        }
    }
}

/// JSON-RPC 2.0 request.
///
/// An absent `id` marks the request as a notification. The dispatcher still
/// produces a response object at the corresponding batch index (matching the
/// order-by-index behavior clients of this proxy rely on); the response id is
/// `null` in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<RpcParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Arc<serde_json::Value>>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<RpcParams>, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            method: method.into(),
            params,
            id: Some(Arc::new(id)),
        }
    }

    /// The id to echo into the response: the request id, or `null` for
    /// notifications.
    #[must_use]
    pub fn response_id(&self) -> Arc<serde_json::Value> {
        self.id.clone().unwrap_or_else(|| Arc::new(serde_json::Value::Null))
    }
}

/// JSON-RPC 2.0 response.
///
/// Exactly one of `result` / `error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(code: i32, message: impl Into<String>, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    /// Error response carrying the underlying failure text in `error.data`,
    /// as the pipeline reports upstream transport failures.
    #[must_use]
    pub fn upstream_error(detail: impl Into<String>, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: None,
            error: Some(JsonRpcError {
                code: UPSTREAM_ERROR_CODE,
                message: "Upstream error".to_string(),
                data: Some(serde_json::Value::String(detail.into())),
            }),
            id,
        }
    }

    /// Returns a copy of this response re-addressed to `id`.
    ///
    /// Coalesced waiters share one upstream result but must each receive
    /// their own caller id.
    #[must_use]
    pub fn with_id(&self, id: Arc<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            result: self.result.clone(),
            error: self.error.clone(),
            id,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// JSON-RPC 2.0 error object.
///
/// Standard codes follow the specification:
/// - `-32700`: parse error
/// - `-32600`: invalid request
/// - `-32601`: method not found
/// - `-32602`: invalid params
/// - `-32603`: internal error
/// - `-32000` to `-32099`: server-defined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// The error text the archive-fallback predicate inspects: the message
    /// joined with the `data` payload when that is a string.
    #[must_use]
    pub fn combined_text(&self) -> String {
        match self.data.as_ref().and_then(serde_json::Value::as_str) {
            Some(data) => format!("{} {}", self.message, data),
            None => self.message.clone(),
        }
    }
}

/// Server-defined code used for upstream transport failures.
pub const UPSTREAM_ERROR_CODE: i32 = -32000;

/// Code used for unexpected internal failures.
pub const INTERNAL_ERROR_CODE: i32 = -32603;

/// Describes how a request was served, reported in the `x-cache-status`
/// response header and as the `cache_status` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the cache store, no upstream call.
    Hit,
    /// Fetched from an upstream.
    Miss,
    /// Shared the result of a concurrent identical in-flight request.
    Coalesced,
}

impl CacheStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Coalesced => "COALESCED",
        }
    }

    /// Lowercase form used as a metric label value.
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Coalesced => "coalesced",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
