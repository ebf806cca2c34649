//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by endpoint, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_upstream_attempts_total` (counter): attempts by endpoint, node, outcome
//! - `gateway_retries_total` (counter): attempts beyond the first
//! - `gateway_endpoint_nodes` (gauge): live node population per endpoint
//!
//! Recording is a no-op until a recorder is installed.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(endpoint: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!(
        "gateway_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "endpoint" => endpoint.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(endpoint: &str, node: &str, outcome: &'static str) {
    counter!(
        "gateway_upstream_attempts_total",
        "endpoint" => endpoint.to_string(),
        "node" => node.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_retry(endpoint: &str) {
    counter!("gateway_retries_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn set_endpoint_nodes(endpoint: &str, count: usize) {
    gauge!("gateway_endpoint_nodes", "endpoint" => endpoint.to_string()).set(count as f64);
}
