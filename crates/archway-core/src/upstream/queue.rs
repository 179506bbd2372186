//! Per-network admission queue.
//!
//! Bounds the number of in-flight upstream calls per network with a semaphore
//! and optionally caps admissions per interval. Waiting is bounded: a
//! submission that cannot be admitted within the configured timeout fails
//! with [`QueueError::Saturated`], which the pipeline surfaces to the caller
//! and counts in the runtime stats.

use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No slot freed up within the admission timeout.
    #[error("request queue saturated")]
    Saturated,
}

#[derive(Debug)]
struct IntervalWindow {
    started: Instant,
    admitted: u32,
}

/// Point-in-time view of a queue, exposed by `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSnapshot {
    pub concurrency_limit: usize,
    pub available_slots: usize,
}

/// RAII admission slot; the semaphore permit is released on drop.
#[derive(Debug)]
pub struct QueuePermit {
    _permit: OwnedSemaphorePermit,
}

pub struct RequestQueue {
    slots: Arc<Semaphore>,
    concurrency_limit: usize,
    admit_timeout: Duration,
    interval: Duration,
    max_per_interval: Option<u32>,
    window: Mutex<IntervalWindow>,
}

impl RequestQueue {
    #[must_use]
    pub fn new(
        concurrency_limit: usize,
        admit_timeout: Duration,
        max_per_interval: Option<u32>,
        interval: Duration,
    ) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency_limit)),
            concurrency_limit,
            admit_timeout,
            interval,
            max_per_interval,
            window: Mutex::new(IntervalWindow { started: Instant::now(), admitted: 0 }),
        }
    }

    /// Waits for an admission slot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Saturated`] when neither a concurrency slot nor
    /// interval headroom frees up within the admission timeout.
    pub async fn admit(&self) -> Result<QueuePermit, QueueError> {
        let deadline = Instant::now() + self.admit_timeout;

        let permit = tokio::time::timeout(self.admit_timeout, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| {
                tracing::warn!(
                    available = self.slots.available_permits(),
                    "queue admission timed out"
                );
                QueueError::Saturated
            })?
            // acquire_owned only fails if the semaphore is closed, which never happens here
            .map_err(|_| QueueError::Saturated)?;

        self.wait_for_interval_headroom(deadline).await?;

        Ok(QueuePermit { _permit: permit })
    }

    /// Blocks until the per-interval cap has headroom or the deadline passes.
    async fn wait_for_interval_headroom(&self, deadline: Instant) -> Result<(), QueueError> {
        let Some(cap) = self.max_per_interval else {
            return Ok(());
        };

        loop {
            let wait_until = {
                let mut window = self.window.lock();
                if window.started.elapsed() >= self.interval {
                    window.started = Instant::now();
                    window.admitted = 0;
                }
                if window.admitted < cap {
                    window.admitted += 1;
                    return Ok(());
                }
                window.started + self.interval
            };

            if wait_until >= deadline {
                tracing::warn!(cap, "per-interval cap exhausted until past admission deadline");
                return Err(QueueError::Saturated);
            }
            tokio::time::sleep_until(tokio::time::Instant::from_std(wait_until)).await;
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            concurrency_limit: self.concurrency_limit,
            available_slots: self.slots.available_permits(),
        }
    }
}
