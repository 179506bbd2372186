use thiserror::Error;

/// Errors raised while talking to an upstream RPC endpoint.
///
/// A JSON-RPC reply whose body carries an `error` object is *not* represented
/// here — that is a successful transport and is returned as a normal
/// [`crate::types::JsonRpcResponse`].
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the per-attempt deadline.
    #[error("request timeout")]
    Timeout,

    /// Failed to reach the upstream endpoint.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Non-2xx HTTP status after retry exhaustion.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Response body was not a valid JSON-RPC envelope.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request serialization failed before a socket was opened.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The network's circuit breaker rejected the call.
    #[error("upstream unavailable: circuit breaker is open")]
    CircuitBreakerOpen,

    /// The network's admission queue timed out.
    #[error("request queue saturated")]
    QueueSaturated,
}

impl UpstreamError {
    /// Whether this outcome counts against the circuit breaker.
    ///
    /// Transport-level failures and HTTP statuses >= 500 do. Rate limiting
    /// (429) is retried but never penalized, and rejections that never
    /// reached the upstream (open breaker, saturated queue) do not count.
    #[must_use]
    pub fn is_breaker_failure(&self) -> bool {
        match self {
            UpstreamError::Timeout
            | UpstreamError::ConnectionFailed(_)
            | UpstreamError::InvalidResponse(_) => true,
            UpstreamError::HttpStatus(status) => *status >= 500,
            UpstreamError::InvalidRequest(_)
            | UpstreamError::CircuitBreakerOpen
            | UpstreamError::QueueSaturated => false,
        }
    }

    /// Whether the HTTP client should retry the attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::ConnectionFailed(_) => true,
            UpstreamError::HttpStatus(status) => (500..=599).contains(status) || *status == 429,
            _ => false,
        }
    }

    /// Static label for `outcome`-style metric dimensions.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            UpstreamError::Timeout => "timeout",
            UpstreamError::ConnectionFailed(_) => "connection_failed",
            UpstreamError::HttpStatus(_) => "http_error",
            UpstreamError::InvalidResponse(_) => "invalid_response",
            UpstreamError::InvalidRequest(_) => "invalid_request",
            UpstreamError::CircuitBreakerOpen => "circuit_breaker_open",
            UpstreamError::QueueSaturated => "queue_saturated",
        }
    }

    /// Sanitized error text surfaced to clients in `error.data`, keeping
    /// upstream URLs and internal addresses out of responses.
    pub(crate) fn sanitize_reqwest(error: &reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout
        } else if error.is_connect() {
            UpstreamError::ConnectionFailed("connection refused or unreachable".to_string())
        } else if error.is_body() || error.is_decode() {
            UpstreamError::InvalidResponse("response body error".to_string())
        } else {
            UpstreamError::ConnectionFailed("network error".to_string())
        }
    }
}
