//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the flow and datagram metrics of the UDP data plane
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `udp_proxy_flows_total` (counter): flows established
//! - `udp_proxy_flows_rejected_total` (counter): flows refused, by reason
//! - `udp_proxy_flows_active` (gauge): established flows still open
//! - `udp_proxy_flows_closed_total` (counter): closed flows, by reason
//! - `udp_proxy_datagrams_total` (counter): datagrams, by direction
//! - `udp_proxy_datagrams_dropped_total` (counter): dropped datagrams, by reason
//! - `udp_proxy_rebuilds_total` (counter): handler rebuilds
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so tests and
//!   deployments without metrics pay nothing
//! - Label values are static strings only

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_flow_established() {
    metrics::counter!("udp_proxy_flows_total").increment(1);
    metrics::gauge!("udp_proxy_flows_active").increment(1.0);
}

pub fn record_flow_rejected(reason: &'static str) {
    metrics::counter!("udp_proxy_flows_rejected_total", "reason" => reason).increment(1);
}

/// Record the end of an established flow.
pub fn record_flow_closed(reason: &'static str) {
    metrics::counter!("udp_proxy_flows_closed_total", "reason" => reason).increment(1);
    metrics::gauge!("udp_proxy_flows_active").decrement(1.0);
}

/// `direction` is `client_to_backend` or `backend_to_client`.
pub fn record_datagram(direction: &'static str) {
    metrics::counter!("udp_proxy_datagrams_total", "direction" => direction).increment(1);
}

pub fn record_datagram_dropped(reason: &'static str) {
    metrics::counter!("udp_proxy_datagrams_dropped_total", "reason" => reason).increment(1);
}

pub fn record_rebuild() {
    metrics::counter!("udp_proxy_rebuilds_total").increment(1);
}
