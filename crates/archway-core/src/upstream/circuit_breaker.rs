//! Per-network circuit breaker.
//!
//! Three-state machine protecting an upstream from sustained failure:
//!
//! - `Closed` → `Open` when consecutive failures reach the threshold
//! - `Open` → `HalfOpen` on the first request after the recovery timeout
//! - `HalfOpen` → `Closed` on a successful probe
//! - `HalfOpen` → `Open` on a failed probe
//!
//! In `HalfOpen` exactly one probe is admitted; concurrent requests are
//! rejected until the probe settles. A JSON-RPC reply carrying an `error`
//! object is a successful transport and never counts as a failure.

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Circuit breaker state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    /// Normal operation, requests pass through.
    Closed,
    /// Failures exceeded the threshold, requests are rejected.
    Open,
    /// Recovery mode, a single probe request is in flight.
    HalfOpen,
}

impl CircuitBreakerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitBreakerState::Closed => "closed",
            CircuitBreakerState::Open => "open",
            CircuitBreakerState::HalfOpen => "half_open",
        }
    }
}

/// All mutable state under a single lock so transitions are atomic.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    window_started: Instant,
    window_successes: u64,
    window_failures: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
            window_started: Instant::now(),
            window_successes: 0,
            window_failures: 0,
        }
    }

    fn roll_window(&mut self, period: Duration) {
        if self.window_started.elapsed() >= period {
            self.window_started = Instant::now();
            self.window_successes = 0;
            self.window_failures = 0;
        }
    }
}

/// Point-in-time view of a breaker, exposed by `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: &'static str,
    pub consecutive_failures: u32,
    pub window_successes: u64,
    pub window_failures: u64,
}

pub struct CircuitBreaker {
    inner: RwLock<BreakerInner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    monitoring_period: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(
        failure_threshold: u32,
        recovery_timeout: Duration,
        monitoring_period: Duration,
    ) -> Self {
        Self {
            inner: RwLock::new(BreakerInner::new()),
            failure_threshold,
            recovery_timeout,
            monitoring_period,
        }
    }

    /// Asks the breaker for permission to call the upstream.
    ///
    /// Returns `false` while the circuit is open and the recovery timeout has
    /// not elapsed, and for every request except the single probe while a
    /// half-open probe is pending.
    ///
    /// Uses double-checked locking: the closed-state fast path takes only a
    /// read lock.
    pub async fn try_acquire(&self) -> bool {
        {
            let inner = self.inner.read().await;
            match inner.state {
                CircuitBreakerState::Closed => return true,
                CircuitBreakerState::HalfOpen => {
                    if inner.probe_in_flight {
                        return false;
                    }
                }
                CircuitBreakerState::Open => {
                    let expired = inner
                        .opened_at
                        .is_some_and(|at| at.elapsed() >= self.recovery_timeout);
                    if !expired {
                        return false;
                    }
                }
            }
        }

        // Open with expired timeout, or half-open without a probe: take the
        // write lock and re-check before claiming the probe slot.
        let mut inner = self.inner.write().await;
        match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
            CircuitBreakerState::Open => {
                let expired = inner
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.recovery_timeout);
                if expired {
                    inner.state = CircuitBreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::warn!("circuit breaker transitioning to half-open, probing upstream");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful upstream call. Resets the failure streak and
    /// closes the circuit if a probe was in flight.
    pub async fn on_success(&self) {
        let mut inner = self.inner.write().await;
        inner.roll_window(self.monitoring_period);
        inner.window_successes += 1;
        inner.consecutive_failures = 0;

        if inner.state != CircuitBreakerState::Closed {
            inner.state = CircuitBreakerState::Closed;
            inner.opened_at = None;
            inner.probe_in_flight = false;
            tracing::info!("circuit breaker closed after successful request");
        }
    }

    /// Records a failed upstream call.
    pub async fn on_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.roll_window(self.monitoring_period);
        inner.window_failures += 1;
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitBreakerState::HalfOpen => {
                inner.state = CircuitBreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                tracing::warn!("circuit breaker probe failed, reopening");
            }
            CircuitBreakerState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitBreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        threshold = self.failure_threshold,
                        "circuit breaker opened after reaching failure threshold"
                    );
                }
            }
            CircuitBreakerState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitBreakerState {
        self.inner.read().await.state
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.read().await.consecutive_failures
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read().await;
        BreakerSnapshot {
            state: inner.state.as_str(),
            consecutive_failures: inner.consecutive_failures,
            window_successes: inner.window_successes,
            window_failures: inner.window_failures,
        }
    }
}
