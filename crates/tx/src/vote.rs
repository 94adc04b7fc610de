// Path: crates/tx/src/vote.rs
//! A single validator's vote inside a `timeout_certificate` transaction.

use serde::{Deserialize, Serialize};
use timpal_types::Address;

/// One validator's signed vote that a round timed out at a given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutVote {
    /// The voting validator.
    pub voter: Address,
    /// The height the vote applies to.
    pub height: u64,
    /// The round being timed out.
    pub round: u64,
    /// Raw 64-byte `r || s` signature over the canonical encoding of
    /// `(height, round)`, hex-encoded.
    pub signature: String,
    /// The voter's uncompressed SEC1 public key, hex-encoded.
    pub public_key: String,
}
