//! In-flight request coalescing.
//!
//! Maps a request fingerprint to the broadcast channel of its pending result
//! so that N concurrent identical requests make exactly one upstream call.
//!
//! The dashmap `entry` API is the critical section: the first arrival for a
//! fingerprint atomically installs the channel and becomes the *leader*;
//! every later arrival before settlement becomes a *follower* holding a
//! receiver. The leader's [`FlightGuard`] is an RAII handle — if the fetch
//! task dies without settling, the guard's `Drop` broadcasts an internal
//! error and removes the entry so followers never hang.

use ahash::RandomState;
use crate::types::{JsonRpcResponse, INTERNAL_ERROR_CODE};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::sync::watch;

/// Whether the upstream leg succeeded, for the `outcome` metric label.
/// A JSON-RPC reply carrying a protocol `error` object is still a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }
}

/// The value broadcast to every waiter of a fingerprint: the response body
/// (with a placeholder id — each waiter substitutes its own) plus the
/// outcome classification.
#[derive(Debug, Clone)]
pub struct FlightOutcome {
    pub response: JsonRpcResponse,
    pub outcome: Outcome,
}

type FlightReceiver = watch::Receiver<Option<FlightOutcome>>;

/// Result of joining the in-flight table.
pub enum FlightSlot {
    /// First arrival: run the upstream call and settle the guard.
    Leader(FlightGuard),
    /// Duplicate arrival: await the broadcast.
    Follower(FlightReceiver),
}

/// Leader's handle on an in-flight entry.
pub struct FlightGuard {
    key: String,
    table: Arc<DashMap<String, FlightReceiver, RandomState>>,
    tx: watch::Sender<Option<FlightOutcome>>,
    settled: bool,
}

impl FlightGuard {
    /// A receiver for this flight, so the leader can await alongside
    /// followers while the fetch runs in a detached task.
    #[must_use]
    pub fn subscribe(&self) -> FlightReceiver {
        self.tx.subscribe()
    }

    /// Broadcasts the result and removes the in-flight entry.
    pub fn settle(mut self, outcome: FlightOutcome) {
        self.tx.send_replace(Some(outcome));
        self.table.remove(&self.key);
        self.settled = true;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.settled {
            // fetch task died before settling; unblock the waiters
            let fallback = FlightOutcome {
                response: JsonRpcResponse::error(
                    INTERNAL_ERROR_CODE,
                    "Internal error",
                    Arc::new(serde_json::Value::Null),
                ),
                outcome: Outcome::Error,
            };
            self.tx.send_replace(Some(fallback));
            self.table.remove(&self.key);
        }
    }
}

/// The in-flight table.
#[derive(Default)]
pub struct InflightTable {
    flights: Arc<DashMap<String, FlightReceiver, RandomState>>,
}

impl InflightTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the flight for `key`, atomically becoming leader or follower.
    #[must_use]
    pub fn join(&self, key: &str) -> FlightSlot {
        match self.flights.entry(key.to_string()) {
            Entry::Occupied(occupied) => FlightSlot::Follower(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(rx);
                FlightSlot::Leader(FlightGuard {
                    key: key.to_string(),
                    table: Arc::clone(&self.flights),
                    tx,
                    settled: false,
                })
            }
        }
    }

    /// Awaits the broadcast for a flight.
    pub async fn wait(mut rx: FlightReceiver) -> FlightOutcome {
        let result = rx.wait_for(Option::is_some).await;
        match result {
            Ok(value) => value
                .clone()
                .unwrap_or_else(|| unreachable!("wait_for yielded an empty flight outcome")),
            // sender dropped without a value: the guard's Drop broadcasts
            // before releasing the sender, so this is unreachable in practice
            Err(_) => FlightOutcome {
                response: JsonRpcResponse::error(
                    INTERNAL_ERROR_CODE,
                    "Internal error",
                    Arc::new(serde_json::Value::Null),
                ),
                outcome: Outcome::Error,
            },
        }
    }

    /// Number of live in-flight entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
