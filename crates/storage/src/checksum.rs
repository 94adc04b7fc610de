// Path: crates/storage/src/checksum.rs
//! Per-record SHA-256 checksums (§4.8).

use thiserror::Error;
use timpal_crypto::sha256;

/// Length, in bytes, of a trailing checksum.
pub const CHECKSUM_LEN: usize = 32;

/// Raised when a stored record's trailing checksum does not verify.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// The stored bytes are shorter than a checksum, so they cannot have
    /// been written by [`checksum_bytes`].
    #[error("record too short to contain a checksum")]
    Truncated,
    /// The trailing checksum does not match the payload.
    #[error("checksum mismatch")]
    Mismatch,
}

/// Appends a trailing SHA-256 digest of `payload` to itself. This is the
/// byte string actually written to a table value.
pub fn checksum_bytes(payload: &[u8]) -> Vec<u8> {
    let digest = sha256(payload);
    let mut out = Vec::with_capacity(payload.len() + CHECKSUM_LEN);
    out.extend_from_slice(payload);
    out.extend_from_slice(&digest);
    out
}

/// Splits a stored record back into its payload, verifying the trailing
/// checksum matches before returning it.
pub fn verify_checksum(stored: &[u8]) -> Result<&[u8], ChecksumError> {
    if stored.len() < CHECKSUM_LEN {
        return Err(ChecksumError::Truncated);
    }
    let split_at = stored.len() - CHECKSUM_LEN;
    let (payload, digest) = stored.split_at(split_at);
    if sha256(payload).as_slice() != digest {
        return Err(ChecksumError::Mismatch);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_payload() {
        let stored = checksum_bytes(b"frame bytes");
        assert_eq!(verify_checksum(&stored).unwrap(), b"frame bytes");
    }

    #[test]
    fn rejects_truncated_records() {
        assert_eq!(verify_checksum(b"short").unwrap_err(), ChecksumError::Truncated);
    }

    #[test]
    fn rejects_tampered_payload() {
        let mut stored = checksum_bytes(b"frame bytes");
        let last = stored.len() - 1;
        stored[last] ^= 0xFF;
        assert_eq!(verify_checksum(&stored).unwrap_err(), ChecksumError::Mismatch);
    }
}
