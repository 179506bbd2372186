//! Upstream communication: the HTTP client, per-network circuit breaker and
//! admission queue, transport error taxonomy, and the archive-fallback
//! predicate.

pub mod circuit_breaker;
pub mod errors;
pub mod failover;
pub mod http_client;
pub mod queue;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerState};
pub use errors::UpstreamError;
pub use failover::FailoverReason;
pub use http_client::{UpstreamClient, UpstreamReply};
pub use queue::{QueueError, QueueSnapshot, RequestQueue};
