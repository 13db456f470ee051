//! Prometheus metrics for the frame engine.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "rawframe_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "rawframe_cache_misses_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "rawframe_cache_evictions_total";
    pub const CACHE_MEMORY_BYTES: &str = "rawframe_cache_memory_bytes";
    pub const CACHE_DISK_BYTES: &str = "rawframe_cache_disk_bytes";

    // Decode metrics
    pub const DECODE_ATTEMPTS_TOTAL: &str = "rawframe_decode_attempts_total";
    pub const DECODE_DURATION_SECONDS: &str = "rawframe_decode_duration_seconds";
    pub const EXTRACTIONS_FAILED_TOTAL: &str = "rawframe_extractions_failed_total";

    // Single-flight metrics
    pub const INFLIGHT_JOINS_TOTAL: &str = "rawframe_inflight_joins_total";
    pub const PROBE_JOINS_TOTAL: &str = "rawframe_probe_joins_total";
}

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

pub fn record_cache_evictions(count: u64) {
    if count > 0 {
        counter!(names::CACHE_EVICTIONS_TOTAL).increment(count);
    }
}

/// Publish current tier usage.
pub fn record_cache_usage(memory_bytes: u64, disk_bytes: u64) {
    gauge!(names::CACHE_MEMORY_BYTES).set(memory_bytes as f64);
    gauge!(names::CACHE_DISK_BYTES).set(disk_bytes as f64);
}

/// Record one strategy attempt. `outcome` is "success" or "failure".
pub fn record_decode_attempt(strategy: &'static str, outcome: &'static str) {
    let labels = [("strategy", strategy), ("outcome", outcome)];
    counter!(names::DECODE_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Record the wall time of a successful decode+render.
pub fn record_decode_duration(strategy: &'static str, duration_secs: f64) {
    histogram!(names::DECODE_DURATION_SECONDS, "strategy" => strategy).record(duration_secs);
}

pub fn record_extraction_failure(kind: &'static str) {
    counter!(names::EXTRACTIONS_FAILED_TOTAL, "kind" => kind).increment(1);
}

/// A caller attached to an already running decode.
pub fn record_inflight_join() {
    counter!(names::INFLIGHT_JOINS_TOTAL).increment(1);
}

/// A caller attached to an already running metadata probe.
pub fn record_probe_join() {
    counter!(names::PROBE_JOINS_TOTAL).increment(1);
}
