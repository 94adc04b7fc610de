// Path: crates/telemetry/src/sinks.rs
//! Abstract traits for metrics reporting, decoupling consensus/storage/rpc
//! instrumentation from the backend that actually records it.

use once_cell::sync::OnceCell;

/// A no-op sink, used in tests and whenever no backend has been installed.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// The globally installed metrics sink, set once at node startup by
/// [`crate::prometheus::install`].
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns the configured consensus metrics sink, or a no-op if none has
/// been installed.
pub fn consensus_metrics() -> &'static dyn ConsensusMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured storage metrics sink, or a no-op if none has
/// been installed.
pub fn storage_metrics() -> &'static dyn StorageMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured RPC metrics sink, or a no-op if none has been
/// installed.
pub fn rpc_metrics() -> &'static dyn RpcMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns the configured error metrics sink, or a no-op if none has been
/// installed.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Metrics for the historical state log and redb-backed stores.
pub trait StorageMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total number of bytes written to the backing store.
    fn inc_bytes_written_total(&self, bytes: u64);
    /// Sets the gauge for estimated total disk usage.
    fn set_disk_usage_bytes(&self, bytes: u64);
    /// Increments the total number of historical records pruned by
    /// `remove_above_height` during a reorg.
    fn inc_records_pruned(&self, count: u64);
}
impl StorageMetricsSink for NopSink {
    fn inc_bytes_written_total(&self, _bytes: u64) {}
    fn set_disk_usage_bytes(&self, _bytes: u64) {}
    fn inc_records_pruned(&self, _count: u64) {}
}

/// Metrics for block production, acceptance, and reorgs.
pub trait ConsensusMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the counter for blocks accepted by `add_block`.
    fn inc_blocks_accepted(&self);
    /// Increments the counter for blocks rejected by `add_block`, labeled
    /// by the rejection's error code.
    fn inc_blocks_rejected(&self, code: &'static str);
    /// Increments the counter for completed reorgs.
    fn inc_reorgs(&self);
    /// Observes the wall-clock duration of a single `add_block` call.
    fn observe_block_apply_duration(&self, duration_secs: f64);
    /// Sets the gauge for the currently active validator-set size.
    fn set_active_validators(&self, count: f64);
}
impl ConsensusMetricsSink for NopSink {
    fn inc_blocks_accepted(&self) {}
    fn inc_blocks_rejected(&self, _code: &'static str) {}
    fn inc_reorgs(&self) {}
    fn observe_block_apply_duration(&self, _duration_secs: f64) {}
    fn set_active_validators(&self, _count: f64) {}
}

/// Metrics for the mempool and the ambient HTTP API.
pub trait RpcMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge for the current mempool size.
    fn set_mempool_size(&self, size: f64);
    /// Increments the counter for transactions admitted to the mempool.
    fn inc_mempool_transactions_added(&self);
    /// Observes the latency of a request to `route`.
    fn observe_request_duration(&self, route: &str, duration_secs: f64);
    /// Increments the counter of requests to `route`, labeled by status.
    fn inc_requests_total(&self, route: &str, status_code: u16);
}
impl RpcMetricsSink for NopSink {
    fn set_mempool_size(&self, _size: f64) {}
    fn inc_mempool_transactions_added(&self) {}
    fn observe_request_duration(&self, _route: &str, _duration_secs: f64) {}
    fn inc_requests_total(&self, _route: &str, _status_code: u16) {}
}

/// Metrics for errors surfaced anywhere in the stack.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for an error, categorized by kind and variant.
    fn inc_error(&self, kind: &'static str, variant: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _kind: &'static str, _variant: &'static str) {}
}

/// A unified sink implementing every domain-specific trait, so a single
/// backend (Prometheus, or a test double) can be installed once.
pub trait MetricsSink:
    StorageMetricsSink + ConsensusMetricsSink + RpcMetricsSink + ErrorMetricsSink
{
}

impl<T> MetricsSink for T where
    T: StorageMetricsSink + ConsensusMetricsSink + RpcMetricsSink + ErrorMetricsSink
{
}
