// Path: crates/types/src/hash.rs
//! A 32-byte hash rendered as a 64-character lowercase hex string: the
//! textual form used for transaction hashes, block hashes, and historical
//! record hashes throughout the consensus contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of hex characters in a rendered [`Hash256`].
pub const HASH_HEX_LEN: usize = 64;

/// An error encountered while parsing a [`Hash256`] from its textual form.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashParseError {
    /// The string was not exactly [`HASH_HEX_LEN`] bytes long.
    #[error("hash must be {HASH_HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),
    /// The string was not valid hex.
    #[error("hash is not valid hex")]
    InvalidHex,
}

/// A SHA-256 digest rendered as lowercase hex. Orderable so it can serve
/// as the deterministic tiebreak in fork choice (§4.7: "lexicographically
/// smaller block_hash").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash256(String);

impl Hash256 {
    /// Parses and validates a hex-encoded hash.
    pub fn parse(s: &str) -> Result<Self, HashParseError> {
        if s.len() != HASH_HEX_LEN {
            return Err(HashParseError::WrongLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashParseError::InvalidHex);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Builds a [`Hash256`] from a raw 32-byte digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// The all-zero hash, used as `previous_hash` for genesis.
    pub fn zero() -> Self {
        Self("0".repeat(HASH_HEX_LEN))
    }

    /// Returns the hash as a plain `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes back to the raw 32-byte digest.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // `self.0` is validated hex of exactly 64 characters at construction,
        // so decoding into a 32-byte buffer cannot fail.
        if let Ok(decoded) = hex::decode(&self.0) {
            if decoded.len() == 32 {
                out.copy_from_slice(&decoded);
            }
        }
        out
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hash256 {
    type Err = HashParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Hash256 {
    type Error = HashParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Hash256> for String {
    fn from(h: Hash256) -> Self {
        h.0
    }
}

impl AsRef<str> for Hash256 {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_is_well_formed() {
        let z = Hash256::zero();
        assert_eq!(z.as_str().len(), HASH_HEX_LEN);
    }

    #[test]
    fn round_trips_through_bytes() {
        let bytes = [7u8; 32];
        let h = Hash256::from_bytes(bytes);
        assert_eq!(h.to_bytes(), bytes);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(Hash256::parse("ab"), Err(HashParseError::WrongLength(2)));
    }

    #[test]
    fn rejects_non_hex() {
        let raw = "z".repeat(HASH_HEX_LEN);
        assert_eq!(Hash256::parse(&raw), Err(HashParseError::InvalidHex));
    }

    #[test]
    fn orders_lexicographically() {
        let a = Hash256::parse(&"0".repeat(HASH_HEX_LEN)).unwrap();
        let b = Hash256::parse(&format!("1{}", "0".repeat(HASH_HEX_LEN - 1))).unwrap();
        assert!(a < b);
    }
}
