//! Block parameter parsing.
//!
//! Consistent handling of block tags and hex block numbers for the
//! normalization, cacheability, and failover paths.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("unknown block tag: {0}")]
    UnknownTag(String),
}

/// Block reference as it appears in request params.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// Specific block number, parsed from a `0x`-prefixed hex string.
    Number(u64),
    /// Symbolic block tag.
    Tag(BlockTag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
}

impl TryFrom<&str> for BlockRef {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        parse(value)
    }
}

/// Parses a block parameter string into a [`BlockRef`].
///
/// # Errors
///
/// Returns `ParseError` for malformed hex and unrecognized tags.
pub fn parse(param: &str) -> Result<BlockRef, ParseError> {
    match param {
        "latest" => Ok(BlockRef::Tag(BlockTag::Latest)),
        "pending" => Ok(BlockRef::Tag(BlockTag::Pending)),
        "earliest" => Ok(BlockRef::Tag(BlockTag::Earliest)),
        "safe" => Ok(BlockRef::Tag(BlockTag::Safe)),
        "finalized" => Ok(BlockRef::Tag(BlockTag::Finalized)),
        s => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16)
                .map(BlockRef::Number)
                .map_err(|_| ParseError::InvalidHex(s.to_string())),
            None => Err(ParseError::UnknownTag(s.to_string())),
        },
    }
}

/// True when the parameter names a specific historical block: a `0x` hex
/// string that is not one of the symbolic tags.
#[must_use]
pub fn is_specific_block(param: &str) -> bool {
    matches!(parse(param), Ok(BlockRef::Number(_)))
}

/// True for the moving tags that the block-number cache may rewrite.
#[must_use]
pub fn is_moving_tag(param: &str) -> bool {
    matches!(param, "latest" | "pending")
}

/// Formats a block number as the `0x`-prefixed hex string the wire expects.
#[must_use]
pub fn to_hex(block: u64) -> String {
    format!("0x{block:x}")
}

/// Parses a `0x`-prefixed hex string into a block number.
#[must_use]
pub fn parse_hex(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x")?;
    u64::from_str_radix(s, 16).ok()
}
