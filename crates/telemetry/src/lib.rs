// Path: crates/telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! # TIMPAL Telemetry
//!
//! Observability for the consensus core: structured logging bootstrap, a
//! Prometheus metrics sink, and the `/healthz` + `/metrics` HTTP surface.
//! Kept separate from `timpal-node` so the node binary can wire up a
//! different sink (or none) in tests without pulling in an HTTP server.

/// A lightweight HTTP server exposing `/metrics` and `/healthz`.
pub mod http;
/// Global `tracing` subscriber initialization.
pub mod init;
/// The `prometheus`-backed implementation of the metrics sinks.
pub mod prometheus;
/// Abstract `*MetricsSink` traits, decoupling instrumentation from backend.
pub mod sinks;
/// An RAII timer for observing the duration of a scope.
pub mod time;

pub use sinks::{consensus_metrics, error_metrics, rpc_metrics, storage_metrics};
