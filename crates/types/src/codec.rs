// Path: crates/types/src/codec.rs
//! The canonical serialization contract used for every hashed structure.
//!
//! All hashing of structured data (transaction hashes, block hashes,
//! historical-state snapshots) is over canonical JSON: sorted object keys,
//! compact separators, no whitespace. `serde_json::Value` maps are
//! `BTreeMap`-backed, so routing a value through `to_value` before
//! serializing yields sorted keys for free; serializing a struct directly
//! would instead preserve field-declaration order, which is NOT canonical.
//! Any deviation from this path changes block hashes across the network.

use serde::Serialize;
use thiserror::Error;

/// Errors produced while canonicalizing a value for hashing or storage.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be converted to a `serde_json::Value`.
    #[error("canonical encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serializes `value` to canonical JSON bytes: sorted keys, compact
/// separators, no whitespace.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let as_value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&as_value)?)
}

/// Convenience wrapper returning the canonical JSON as a `String`.
pub fn to_canonical_json_string<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let bytes = to_canonical_json(value)?;
    // `serde_json::to_vec` always produces valid UTF-8.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
