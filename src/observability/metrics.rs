//! Metrics collection and exposition.
//!
//! # Metrics
//! - `forward_auth_requests_total` (counter): decisions by outcome
//!   (`skipped`, `allowed`, `denied`, `error`)
//! - `forward_auth_duration_seconds` (histogram): time spent deciding
//! - `gateway_upstream_requests_total` (counter): upstream responses by status

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one forward-auth decision.
pub fn record_auth_decision(outcome: &'static str, start: Instant) {
    counter!("forward_auth_requests_total", "outcome" => outcome).increment(1);
    histogram!("forward_auth_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_response(status: u16) {
    counter!("gateway_upstream_requests_total", "status" => status.to_string()).increment(1);
}
