// Path: crates/storage/src/lib.rs
//! # TIMPAL Storage
//!
//! A thin, generic wrapper around `redb` giving the upper layers
//! (`timpal-historical`, `timpal-ledger`) a single on-disk `Database`
//! handle, commit-or-abort multi-table write transactions, and
//! per-record SHA-256 checksums (§4.8: "an ACID-capable local store with
//! per-record SHA-256 checksums").
//!
//! Unlike the source this crate is adapted from, writes here commit
//! synchronously on the calling thread: the consensus core runs block
//! application and historical-state writes on a single logical task
//! (§4.11), so there is no background flusher to hand commits to, and
//! none is added.
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

pub mod checksum;
pub mod store;

pub use checksum::{checksum_bytes, verify_checksum, ChecksumError};
pub use store::Store;
pub use redb::{ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
