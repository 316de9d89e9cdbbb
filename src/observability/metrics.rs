//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_breaker_events_total` (counter): breaker events by service and kind
//! - `gateway_cache_lookups_total` (counter): cache lookups by result
//! - `gateway_reroutes_total` (counter): reroutes by service
//! - `gateway_force_trips_total` (counter): reroute-triggered trips by service
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_event(service: &str, kind: &'static str) {
    counter!("gateway_breaker_events_total", "service" => service.to_string(), "kind" => kind).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_reroute(service: &str) {
    counter!("gateway_reroutes_total", "service" => service.to_string()).increment(1);
}

pub fn record_force_trip(service: &str) {
    counter!("gateway_force_trips_total", "service" => service.to_string()).increment(1);
}
