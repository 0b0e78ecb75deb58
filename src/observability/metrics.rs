//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fabric_endorsements_total` (counter): proposal responses by peer, outcome
//! - `fabric_broadcast_total` (counter): broadcast attempts by orderer, outcome
//! - `fabric_blocks_received_total` (counter): delivered blocks by channel
//! - `fabric_listener_reconnects_total` (counter): watchdog-forced reconnects
//! - `fabric_block_height` (gauge): last locally observed height by channel
//! - `fabric_pending_waiters` (gauge): live synchronous waits

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub fn record_endorsement(peer: &str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!("fabric_endorsements_total", "peer" => peer.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_broadcast(orderer: &str, outcome: &'static str) {
    counter!("fabric_broadcast_total", "orderer" => orderer.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_block(channel: &str, number: u64) {
    counter!("fabric_blocks_received_total", "channel" => channel.to_string()).increment(1);
    gauge!("fabric_block_height", "channel" => channel.to_string()).set(number as f64);
}

pub fn record_reconnect() {
    counter!("fabric_listener_reconnects_total").increment(1);
}

pub fn record_pending_waiters(count: usize) {
    gauge!("fabric_pending_waiters").set(count as f64);
}

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
