//! Archive-fallback predicate.
//!
//! Decides when a primary upstream's answer means "this node cannot serve the
//! history you asked for" and the archive-capable fallback should be tried.
//! Three conditions trigger failover:
//!
//! - **Null result** on a historical read pinned to concrete data
//! - **Error patterns**: literal substrings in the error text that full nodes
//!   emit for pruned state
//! - **Block tolerance**: `eth_call` at `"latest"` racing the upstream's head
//!
//! The pattern tables live here and nowhere else so they can be audited and
//! extended in one place.

use crate::{types::RpcParams, utils::block_param};
use regex::RegexSet;
use std::sync::LazyLock;

/// Why a request was routed to the fallback; metric label `reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverReason {
    NullResult,
    ErrorPattern,
    BlockTolerance,
}

impl FailoverReason {
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            FailoverReason::NullResult => "null_result",
            FailoverReason::ErrorPattern => "error_pattern",
            FailoverReason::BlockTolerance => "block_tolerance",
        }
    }
}

/// Literal substrings (matched against lowercased error text) that mark a
/// primary as unable to serve historical data.
const ARCHIVE_ERROR_PATTERNS: &[&str] = &[
    "block not found",
    "transaction not found",
    "receipt not found",
    "logs not found",
    "state not found",
    "data not available",
    "block range not available",
    "historical data not available",
    "only recent blocks available",
    "archive node required",
];

/// Upstream-lag errors seen when an `eth_call` at `"latest"` lands past the
/// primary's head block.
static BLOCK_TOLERANCE_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)block.*returned.*is after.*last block",
        r"(?i)non-deterministic error",
        r"(?i)block.*is after.*requested range",
        r"(?i)block ordering error",
        r"(?i)deterministic error",
    ])
    // the pattern list is static and known-valid
    .unwrap_or_else(|e| unreachable!("invalid block tolerance patterns: {e}"))
});

/// Null-result condition: a well-formed `result: null` reply on one of these
/// reads means the primary has pruned the data, not that it does not exist.
#[must_use]
pub fn null_result_needs_archive(method: &str, params: Option<&RpcParams>) -> bool {
    match method {
        "eth_getLogs" | "eth_getTransactionReceipt" => true,
        "eth_getBlockByNumber" => params
            .and_then(|p| p.position_str(0))
            .is_some_and(block_param::is_specific_block),
        _ => false,
    }
}

/// Error-text conditions (b) and (c).
///
/// `call_targets_latest` is whether the client-supplied `eth_call` block tag
/// was `"latest"`, captured before block-tag normalization rewrites it.
#[must_use]
pub fn error_needs_archive(
    method: &str,
    call_targets_latest: bool,
    error_text: &str,
) -> Option<FailoverReason> {
    let lowered = error_text.to_lowercase();

    if ARCHIVE_ERROR_PATTERNS.iter().any(|pattern| lowered.contains(pattern)) {
        return Some(FailoverReason::ErrorPattern);
    }

    if method == "eth_call" && call_targets_latest && BLOCK_TOLERANCE_PATTERNS.is_match(error_text)
    {
        return Some(FailoverReason::BlockTolerance);
    }

    None
}
