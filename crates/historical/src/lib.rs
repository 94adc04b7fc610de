// Path: crates/historical/src/lib.rs
//! # TIMPAL Historical State Log
//!
//! Per-height immutable snapshots of everything the proposer-selection
//! and reorg-validation paths need, so that "who was expected to propose
//! height H?" is answerable from data persisted at or before H without
//! ever consulting current state (§4.8).
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod frame;
pub mod log;
pub mod record;

pub use frame::{LivenessFilterState, ValidatorStateFrame};
pub use log::{EpochSnapshot, HistoricalStateLog, ProposerSource};
pub use record::HistoricalStateRecord;
