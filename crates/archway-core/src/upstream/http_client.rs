//! HTTP transport to upstream JSON-RPC endpoints.
//!
//! One process-wide reqwest client backs every upstream: keep-alive pooling
//! keyed by origin, bounded idle connections, rustls TLS. Each call applies
//! the upstream descriptor's per-attempt deadline (reqwest cancels the
//! in-flight socket on expiry) and retries transport failures, HTTP 5xx, and
//! HTTP 429 with exponential backoff. A response body carrying a JSON-RPC
//! `error` object is a valid protocol reply and is never retried.

use crate::{
    network::UpstreamDescriptor,
    types::{JsonRpcRequest, JsonRpcResponse},
    upstream::errors::UpstreamError,
};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Idle keep-alive connections kept per upstream origin.
const POOL_MAX_IDLE_PER_HOST: usize = 50;

/// Idle connections are reaped after this long.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one upstream call: the HTTP status plus the parsed JSON-RPC
/// envelope.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub response: JsonRpcResponse,
}

pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    /// Builds the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::ConnectionFailed`] when the underlying client
    /// cannot be constructed.
    pub fn new() -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("archway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Performs one JSON-RPC POST with retry and backoff.
    ///
    /// # Errors
    ///
    /// Returns the final [`UpstreamError`] after retry exhaustion. The error
    /// text is sanitized; upstream URLs never leak into responses.
    pub async fn call(
        &self,
        upstream: &UpstreamDescriptor,
        request: &JsonRpcRequest,
    ) -> Result<UpstreamReply, UpstreamError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| UpstreamError::InvalidRequest(format!("serialization failed: {e}")))?;
        let body = bytes::Bytes::from(body);

        let mut attempt: u32 = 0;
        loop {
            match self.call_once(upstream, body.clone()).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < upstream.max_retries => {
                    attempt += 1;
                    let backoff = upstream.retry_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(
                        attempt,
                        max_retries = upstream.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(
        &self,
        upstream: &UpstreamDescriptor,
        body: bytes::Bytes,
    ) -> Result<UpstreamReply, UpstreamError> {
        let response = self
            .client
            .post(&upstream.url)
            .header("content-type", "application/json")
            // Bytes::clone is a refcount bump, so retries reuse the buffer
            .body(body)
            .timeout(upstream.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::sanitize_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::HttpStatus(status.as_u16()));
        }

        let payload = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::sanitize_reqwest(&e))?;

        let mut parsed: JsonRpcResponse = serde_json::from_slice(&payload)
            .map_err(|e| UpstreamError::InvalidResponse(format!("invalid JSON-RPC body: {e}")))?;

        // serde folds `"result": null` into `None`; pin it back to an explicit
        // null so the archive predicate sees it and re-serialization keeps the
        // result member
        if parsed.error.is_none() && parsed.result.is_none() {
            parsed.result = Some(serde_json::Value::Null);
        }

        Ok(UpstreamReply { status: status.as_u16(), response: parsed })
    }
}
