// Path: crates/telemetry/src/time.rs
use crate::sinks::ConsensusMetricsSink;
use std::time::Instant;

/// An RAII timer: observes elapsed time against a [`ConsensusMetricsSink`]
/// when dropped. Wrap a single `add_block` call with this rather than
/// timing it by hand at every call site.
pub struct Timer<'a> {
    sink: &'a dyn ConsensusMetricsSink,
    start: Instant,
}

impl<'a> Timer<'a> {
    /// Starts timing against `sink`.
    pub fn new(sink: &'a dyn ConsensusMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_block_apply_duration(self.start.elapsed().as_secs_f64());
    }
}
