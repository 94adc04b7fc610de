// Path: crates/crypto/src/error.rs
//! Error type for the `timpal-crypto` crate.

use thiserror::Error;
use timpal_types::error::ErrorCode;

/// Errors raised by hashing, signing, verifying, or key handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A byte slice did not have the expected fixed length.
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// Expected length in bytes.
        expected: usize,
        /// Observed length in bytes.
        got: usize,
    },
    /// A public or private key could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A signature could not be decoded or did not verify.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } => "CRYPTO_INVALID_LENGTH",
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
        }
    }
}
