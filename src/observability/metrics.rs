//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by outcome and status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_cache_lookups_total` (counter): hit / stale / miss
//! - `gateway_rate_limited_total` (counter): rejections by tier
//! - `gateway_origin_requests_total` (counter): per origin role and result
//! - `gateway_origin_up` (gauge): last health check, 1=up, 0=down
//! - `gateway_analytics_dropped_total` (counter): events lost to a full queue
//! - `gateway_background_failures_total` (counter): failed deferred tasks

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(outcome: &'static str, status: u16, start_time: Instant) {
    counter!("gateway_requests_total", "outcome" => outcome, "status" => status.to_string())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_rate_limited(tier: &'static str) {
    counter!("gateway_rate_limited_total", "tier" => tier).increment(1);
}

pub fn record_origin_request(origin: &'static str, result: &'static str) {
    counter!("gateway_origin_requests_total", "origin" => origin, "result" => result).increment(1);
}

pub fn record_origin_health(origin: &'static str, up: bool) {
    gauge!("gateway_origin_up", "origin" => origin).set(if up { 1.0 } else { 0.0 });
}

pub fn record_analytics_dropped() {
    counter!("gateway_analytics_dropped_total").increment(1);
}

pub fn record_background_failure(task: &'static str) {
    counter!("gateway_background_failures_total", "task" => task).increment(1);
}
