//! Metrics collection and exposition.
//!
//! # Metrics
//! - `crm_requests_total` (counter): requests by method, route, status
//! - `crm_request_duration_seconds` (histogram): latency by method, route
//! - `crm_rate_limited_total` (counter): rejected requests by scope
//! - `crm_lead_transitions_total` (counter): category changes by from, to
//! - `crm_write_retries_total` (counter): optimistic write retries by entity
//! - `crm_ws_connections` (gauge): open WebSocket connections
//! - `crm_events_published_total` (counter): realtime events by type
//! - `crm_cache_lookups_total` (counter): cache hits/misses by cache
//! - `crm_store_documents` (gauge): documents by collection
//!
//! Every recorder is a no-op until `init_metrics` installs the exporter.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    counter!(
        "crm_requests_total",
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "crm_request_duration_seconds",
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("crm_rate_limited_total", "scope" => scope).increment(1);
}

pub fn record_lead_transition(from: &'static str, to: &'static str) {
    counter!("crm_lead_transitions_total", "from" => from, "to" => to).increment(1);
}

pub fn record_write_retry(entity: &'static str) {
    counter!("crm_write_retries_total", "entity" => entity).increment(1);
}

pub fn record_ws_connections(count: usize) {
    gauge!("crm_ws_connections").set(count as f64);
}

pub fn record_event_published(event_type: &'static str) {
    counter!("crm_events_published_total", "type" => event_type).increment(1);
}

pub fn record_cache_lookup(cache: &'static str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!("crm_cache_lookups_total", "cache" => cache, "outcome" => outcome).increment(1);
}

pub fn record_store_size(collection: &'static str, size: usize) {
    gauge!("crm_store_documents", "collection" => collection).set(size as f64);
}
