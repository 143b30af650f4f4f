//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by route and status
//! - `proxy_request_duration_seconds` (histogram): time to response headers
//! - `proxy_rejected_total` (counter): requests refused before any fetch, by reason
//! - `proxy_upstream_errors_total` (counter): fetch failures and broken relays
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "route" => route.to_owned(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "route" => route.to_owned())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejected(route: &str, reason: &'static str) {
    counter!("proxy_rejected_total", "route" => route.to_owned(), "reason" => reason).increment(1);
}

/// `kind` is `fetch` (no response) or `relay` (body broke mid-stream).
pub fn record_upstream_error(route: &str, kind: &'static str) {
    counter!("proxy_upstream_errors_total", "route" => route.to_owned(), "kind" => kind)
        .increment(1);
}
