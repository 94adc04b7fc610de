// Path: crates/crypto/src/lib.rs
//! # TIMPAL Crypto
//!
//! Hashing, secp256k1 signatures, and address derivation. Panics are
//! disallowed in non-test code to keep the consensus-critical path
//! panic-free.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod address;
pub mod error;
pub mod hash;
pub mod sign;

pub use address::derive_address;
pub use error::CryptoError;
pub use hash::{sha256, sha256_hash256};
pub use sign::{KeyPair, PrivateKey, PublicKey, Signature};
