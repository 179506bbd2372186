//! # Archway Core
//!
//! Core library for archway, a caching multi-network JSON-RPC reverse proxy
//! tuned for subgraph indexers and similar historical-read workloads.
//!
//! This crate provides the request-processing pipeline and its parts:
//!
//! - **[`pipeline`]**: orchestration — normalization, cache lookup, in-flight
//!   coalescing, queueing, breaker-guarded upstream calls, archive failover,
//!   and cache writes; plus the batch [`pipeline::dispatcher`].
//!
//! - **[`cache`]**: the storage seam ([`cache::CacheStore`]), the
//!   cacheability/TTL policy with its cache-poisoning guard, and the
//!   block-number cache behind `eth_call` tag normalization.
//!
//! - **[`upstream`]**: the HTTP client with retry/backoff and pooled
//!   keep-alive connections, per-network circuit breakers and admission
//!   queues, and the archive-fallback predicate tables.
//!
//! - **[`network`]**: immutable network registry mapping keys to
//!   primary/fallback upstream pairs.
//!
//! - **[`metrics`]** / **[`stats`]**: Prometheus series and the JSON counter
//!   snapshot behind `/stats`.
//!
//! ## Request Flow
//!
//! ```text
//! Client → Dispatcher (split batch)
//!        → Pipeline: normalize → fingerprint → cache get ── hit ──► reply
//!                        │ miss
//!                        ▼
//!                  Coalescer ── duplicate ──► await shared flight
//!                        │ leader
//!                        ▼
//!                  Queue → Breaker → Primary upstream
//!                        │
//!                        ├─ archive predicate ──► Fallback upstream (≤ 1)
//!                        ▼
//!                  problematic check → cache put → settle → reply
//! ```

pub mod cache;
pub mod config;
pub mod metrics;
pub mod network;
pub mod pipeline;
pub mod stats;
pub mod types;
pub mod upstream;
pub mod utils;

pub use pipeline::{dispatcher::Dispatcher, RequestPipeline};
