//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by gateway, method, status
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_upstream_duration_seconds` (histogram): upstream fetch latency
//! - `proxy_rate_limited_total` (counter): rejections by kind (soft/hard)
//! - `proxy_cache_lookups_total` (counter): hits and misses
//! - `proxy_upstream_errors_total` (counter): failures by kind
//! - `proxy_rate_limit_clients` (gauge): tracked client records
//! - `proxy_cache_entries` (gauge): cached responses
//!
//! Without an installed recorder every call here is a no-op, which keeps
//! tests free of global state.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must run inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    let builder = match builder.set_buckets(LATENCY_BUCKETS) {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, "Invalid histogram buckets");
            return;
        }
    };

    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(gateway: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "gateway" => gateway.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "gateway" => gateway.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(gateway: &str, kind: &'static str) {
    counter!("proxy_rate_limited_total", "gateway" => gateway.to_string(), "kind" => kind)
        .increment(1);
}

pub fn record_rate_limit_clients(gateway: &str, clients: usize) {
    gauge!("proxy_rate_limit_clients", "gateway" => gateway.to_string()).set(clients as f64);
}

pub fn record_cache_lookup(gateway: &str, result: &'static str) {
    counter!("proxy_cache_lookups_total", "gateway" => gateway.to_string(), "result" => result)
        .increment(1);
}

pub fn record_cache_size(gateway: &str, entries: usize) {
    gauge!("proxy_cache_entries", "gateway" => gateway.to_string()).set(entries as f64);
}

pub fn record_upstream_error(gateway: &str, kind: &'static str) {
    counter!("proxy_upstream_errors_total", "gateway" => gateway.to_string(), "kind" => kind)
        .increment(1);
}

pub fn record_upstream_latency(gateway: &str, start: Instant) {
    histogram!("proxy_upstream_duration_seconds", "gateway" => gateway.to_string())
        .record(start.elapsed().as_secs_f64());
}
