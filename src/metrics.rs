//! Prometheus metrics.

use lazy_static::lazy_static;
use prometheus::{
    self, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    // Registry for holding metric state
    pub static ref REGISTRY: Registry = Registry::new();
    // Chunk counter by mode and operation
    pub static ref CHUNKS_EXECUTED: IntCounterVec = IntCounterVec::new(
        Opts::new("chunks_executed", "The number of chunks reduced"),
        &["mode", "operation"]
    ).unwrap();
    // Bytes of variable and mask data read from sources
    pub static ref BYTES_READ: IntCounter = IntCounter::new(
        "bytes_read", "The number of bytes read from sources"
    ).unwrap();
    // Failed chunk counter by error kind
    pub static ref CHUNK_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("chunk_failures", "The number of chunk reductions that failed"),
        &["kind"]
    ).unwrap();
    // Materialisation histogram by operation
    pub static ref MATERIALIZE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts{
            common_opts: Opts::new("materialize_duration", "The time taken to materialise each result"),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(), // Change buckets here if desired
        },
        &["operation"],
    ).unwrap();
}

/// Register all metrics with the registry.
///
/// Must be called at most once.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(CHUNKS_EXECUTED.clone()))?;
    REGISTRY.register(Box::new(BYTES_READ.clone()))?;
    REGISTRY.register(Box::new(CHUNK_FAILURES.clone()))?;
    REGISTRY.register(Box::new(MATERIALIZE_DURATION.clone()))?;
    Ok(())
}

/// Render the registered metrics in the Prometheus text format.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}
