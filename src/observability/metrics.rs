//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fleet_leader` (gauge): 1 while this node holds leadership
//! - `fleet_backends` (gauge): live backends by service and health
//! - `fleet_load_balancers` (gauge): live load balancers by service and health
//! - `fleet_request_rate` (gauge): last evaluated per-instance rate by service and kind
//! - `fleet_probe_failures_total` (counter): failed probes by kind
//! - `fleet_scaling_events_total` (counter): scaling actions by service, kind, direction
//! - `fleet_instance_replacements_total` (counter): replaced instances by service and kind
//! - `lb_requests_total` (counter): proxied requests by status class
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; with no exporter installed
//!   every call is a no-op, so tests need no setup
//! - Prometheus exposition via the exporter's own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Parse `address` and install the exporter when enabled.
pub fn init_from_config(enabled: bool, address: &str) {
    if !enabled {
        return;
    }
    match address.parse() {
        Ok(addr) => init_metrics(addr),
        Err(_) => tracing::error!(metrics_address = %address, "Failed to parse metrics address"),
    }
}

pub fn record_leader(is_leader: bool) {
    metrics::gauge!("fleet_leader").set(if is_leader { 1.0 } else { 0.0 });
}

/// Instance counts of one service after a tick.
pub fn record_pool_sizes(service: &str, backends: (usize, usize), load_balancers: (usize, usize)) {
    let (healthy, total) = backends;
    metrics::gauge!("fleet_backends", "service" => service.to_string(), "health" => "healthy")
        .set(healthy as f64);
    metrics::gauge!("fleet_backends", "service" => service.to_string(), "health" => "unhealthy")
        .set(total.saturating_sub(healthy) as f64);

    let (healthy, total) = load_balancers;
    metrics::gauge!("fleet_load_balancers", "service" => service.to_string(), "health" => "healthy")
        .set(healthy as f64);
    metrics::gauge!("fleet_load_balancers", "service" => service.to_string(), "health" => "unhealthy")
        .set(total.saturating_sub(healthy) as f64);
}

pub fn record_rate(service: &str, kind: &'static str, rate: f64) {
    if rate.is_finite() {
        metrics::gauge!("fleet_request_rate", "service" => service.to_string(), "kind" => kind)
            .set(rate);
    }
}

pub fn record_probe_failure(kind: &'static str) {
    metrics::counter!("fleet_probe_failures_total", "kind" => kind).increment(1);
}

pub fn record_scaling_event(service: &str, kind: &'static str, direction: &'static str) {
    metrics::counter!(
        "fleet_scaling_events_total",
        "service" => service.to_string(),
        "kind" => kind,
        "direction" => direction
    )
    .increment(1);
}

pub fn record_replacement(service: &str, kind: &'static str) {
    metrics::counter!(
        "fleet_instance_replacements_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record a proxied request by status class (`2xx`, `5xx`, ...).
pub fn record_lb_request(status: u16) {
    let class = match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    };
    metrics::counter!("lb_requests_total", "status" => class).increment(1);
}
