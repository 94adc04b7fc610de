// Path: crates/ledger/src/lib.rs
//! # TIMPAL Ledger
//!
//! The consensus choke point (§4.9): canonical chain, world state,
//! validator registry, and the deterministic proposer-selection and
//! reward-allocation rules, wired to the persisted substates owned by
//! `timpal-consensus` and `timpal-historical`.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod config;
pub mod ledger;
pub mod liveness;
pub mod world_state;

pub use config::LedgerConfig;
pub use ledger::{Ledger, ReorgOutcome};
pub use world_state::WorldState;
