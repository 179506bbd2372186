//! Integration and end-to-end tests for the archway proxy.
//!
//! Modules:
//!
//! - `mock_infrastructure`: reusable mockito-backed upstream pair and a
//!   pipeline/dispatcher harness
//! - `pipeline_tests`: end-to-end request scenarios — cache behavior, archive
//!   failover, coalescing, circuit breaking
//! - `batch_tests`: dispatcher invariants — ordering, ids, error isolation
//!
//! All tests are self-contained: upstreams are mockito servers bound to
//! ephemeral local ports, no external chain or container is required.
//!
//! ```bash
//! cargo test --package archway-tests
//! ```

/// Mock infrastructure for testing
pub mod mock_infrastructure;

#[cfg(test)]
mod pipeline_tests;

#[cfg(test)]
mod batch_tests;
