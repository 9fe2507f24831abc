//! Metrics facade wrappers.
//!
//! Thin helpers over the `metrics` macros so handlers and the cache record
//! consistent series names. No exporter is installed here; the embedding
//! application decides where the numbers go.

use std::time::Instant;

/// Count a handled request by handler name and response status.
pub fn record_request(handler: &'static str, status: u16) {
    metrics::counter!(
        "hlscache_requests_total",
        "handler" => handler,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record request latency for a handler.
pub fn record_duration(handler: &'static str, start: Instant) {
    metrics::histogram!("hlscache_request_duration_seconds", "handler" => handler)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_cache_hit() {
    metrics::counter!("hlscache_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    metrics::counter!("hlscache_cache_misses_total").increment(1);
}

pub fn record_cache_stored(bytes: u64) {
    metrics::counter!("hlscache_cache_stored_total").increment(1);
    metrics::counter!("hlscache_cache_stored_bytes_total").increment(bytes);
}

pub fn record_cache_store_failed() {
    metrics::counter!("hlscache_cache_store_failures_total").increment(1);
}

pub fn record_cache_evicted() {
    metrics::counter!("hlscache_cache_evictions_total").increment(1);
}

pub fn record_cache_disk_usage(bytes: u64) {
    metrics::gauge!("hlscache_cache_disk_usage_bytes").set(bytes as f64);
}

/// Count an origin fetch that failed outright.
pub fn record_origin_error() {
    metrics::counter!("hlscache_origin_errors_total").increment(1);
}
