// Path: crates/telemetry/src/prometheus.rs
//! The `prometheus`-backed implementation of the metrics sinks.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_int_counter,
    register_int_counter_vec, Gauge, Histogram, IntCounter, IntCounterVec,
};

static STORAGE_DISK_USAGE_BYTES: OnceCell<Gauge> = OnceCell::new();
static STORAGE_BYTES_WRITTEN_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORAGE_RECORDS_PRUNED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_BLOCKS_ACCEPTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_BLOCKS_REJECTED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static CONSENSUS_REORGS_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_BLOCK_APPLY_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static CONSENSUS_ACTIVE_VALIDATORS: OnceCell<Gauge> = OnceCell::new();
static MEMPOOL_SIZE: OnceCell<Gauge> = OnceCell::new();
static MEMPOOL_TRANSACTIONS_ADDED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static RPC_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_REQUEST_DURATION_SECONDS: OnceCell<prometheus::HistogramVec> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

/// The concrete sink backed by the process-global `prometheus` registry.
#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Reads a metric that [`install`] is responsible for initializing. A
/// missing metric here means `install()` was never called, which is a
/// startup bug, not a runtime condition to recover from.
macro_rules! get_metric {
    ($metric:ident) => {
        match $metric.get() {
            Some(m) => m,
            None => {
                tracing::error!(target = "telemetry", metric = stringify!($metric), "metric read before install()");
                return;
            }
        }
    };
}

impl StorageMetricsSink for PrometheusSink {
    fn inc_bytes_written_total(&self, bytes: u64) {
        get_metric!(STORAGE_BYTES_WRITTEN_TOTAL).inc_by(bytes);
    }
    fn set_disk_usage_bytes(&self, bytes: u64) {
        get_metric!(STORAGE_DISK_USAGE_BYTES).set(bytes as f64);
    }
    fn inc_records_pruned(&self, count: u64) {
        get_metric!(STORAGE_RECORDS_PRUNED_TOTAL).inc_by(count);
    }
}

impl ConsensusMetricsSink for PrometheusSink {
    fn inc_blocks_accepted(&self) {
        get_metric!(CONSENSUS_BLOCKS_ACCEPTED_TOTAL).inc();
    }
    fn inc_blocks_rejected(&self, code: &'static str) {
        get_metric!(CONSENSUS_BLOCKS_REJECTED_TOTAL)
            .with_label_values(&[code])
            .inc();
    }
    fn inc_reorgs(&self) {
        get_metric!(CONSENSUS_REORGS_TOTAL).inc();
    }
    fn observe_block_apply_duration(&self, duration_secs: f64) {
        get_metric!(CONSENSUS_BLOCK_APPLY_DURATION_SECONDS).observe(duration_secs);
    }
    fn set_active_validators(&self, count: f64) {
        get_metric!(CONSENSUS_ACTIVE_VALIDATORS).set(count);
    }
}

impl RpcMetricsSink for PrometheusSink {
    fn set_mempool_size(&self, size: f64) {
        get_metric!(MEMPOOL_SIZE).set(size);
    }
    fn inc_mempool_transactions_added(&self) {
        get_metric!(MEMPOOL_TRANSACTIONS_ADDED_TOTAL).inc();
    }
    fn observe_request_duration(&self, route: &str, duration_secs: f64) {
        get_metric!(RPC_REQUEST_DURATION_SECONDS)
            .with_label_values(&[route])
            .observe(duration_secs);
    }
    fn inc_requests_total(&self, route: &str, status_code: u16) {
        get_metric!(RPC_REQUESTS_TOTAL)
            .with_label_values(&[route, &status_code.to_string()])
            .inc();
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, kind: &'static str, variant: &'static str) {
        get_metric!(ERRORS_TOTAL).with_label_values(&[kind, variant]).inc();
    }
}

/// Registers every collector with the process-global Prometheus registry
/// and installs the resulting sink as [`crate::sinks::SINK`]. Must be
/// called exactly once, before startup logs anything through the sinks.
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    let _ = STORAGE_DISK_USAGE_BYTES.set(register_gauge!(
        "timpal_storage_disk_usage_bytes",
        "Estimated total disk usage of the historical state log."
    )?);
    let _ = STORAGE_BYTES_WRITTEN_TOTAL.set(register_int_counter!(
        "timpal_storage_bytes_written_total",
        "Total bytes written to the historical state log."
    )?);
    let _ = STORAGE_RECORDS_PRUNED_TOTAL.set(register_int_counter!(
        "timpal_storage_records_pruned_total",
        "Total historical records dropped by a reorg rollback."
    )?);
    let _ = CONSENSUS_BLOCKS_ACCEPTED_TOTAL.set(register_int_counter!(
        "timpal_consensus_blocks_accepted_total",
        "Total blocks accepted by add_block."
    )?);
    let _ = CONSENSUS_BLOCKS_REJECTED_TOTAL.set(register_int_counter_vec!(
        "timpal_consensus_blocks_rejected_total",
        "Total blocks rejected by add_block, by error code.",
        &["code"]
    )?);
    let _ = CONSENSUS_REORGS_TOTAL.set(register_int_counter!(
        "timpal_consensus_reorgs_total",
        "Total completed chain reorganizations."
    )?);
    let _ = CONSENSUS_BLOCK_APPLY_DURATION_SECONDS.set(register_histogram!(
        "timpal_consensus_block_apply_duration_seconds",
        "Latency of a single add_block call.",
        exponential_buckets(0.001, 2.0, 15)?
    )?);
    let _ = CONSENSUS_ACTIVE_VALIDATORS.set(register_gauge!(
        "timpal_consensus_active_validators",
        "Current number of active validators in the registry."
    )?);
    let _ = MEMPOOL_SIZE.set(register_gauge!(
        "timpal_mempool_size",
        "Current number of transactions queued in the mempool."
    )?);
    let _ = MEMPOOL_TRANSACTIONS_ADDED_TOTAL.set(register_int_counter!(
        "timpal_mempool_transactions_added_total",
        "Total transactions admitted to the mempool."
    )?);
    let _ = RPC_REQUESTS_TOTAL.set(register_int_counter_vec!(
        "timpal_rpc_requests_total",
        "Total HTTP API requests, by route and status.",
        &["route", "status"]
    )?);
    let _ = RPC_REQUEST_DURATION_SECONDS.set(prometheus::register_histogram_vec!(
        "timpal_rpc_request_duration_seconds",
        "Latency of HTTP API requests, by route.",
        &["route"],
        exponential_buckets(0.0005, 2.0, 15)?
    )?);
    let _ = ERRORS_TOTAL.set(register_int_counter_vec!(
        "timpal_errors_total",
        "Total errors, by kind and variant.",
        &["kind", "variant"]
    )?);

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
