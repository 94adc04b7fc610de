// Path: crates/test-utils/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! # TIMPAL Test Utilities
//!
//! Shared fixtures for testing the workspace: deterministic RNGs, a few
//! assertion macros, and builders for genesis validators/blocks and
//! signed transactions so every crate's test module isn't reinventing
//! the same keypair-and-sign boilerplate.

pub mod assertions;
pub mod fixtures;
pub mod randomness;

pub use fixtures::{genesis_block, genesis_validator, sign_block, signed_transfer, validator_set};
pub use randomness::TestRng;
