//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wager_transfers_observed_total` (counter): qualifying transfers seen in blocks
//! - `wager_bets_verified_total` (counter): bets flipped to verified
//! - `wager_broadcasts_total{outcome}` (counter): submitted / already-submitted / rejected
//! - `wager_signer_requests_total{outcome}` (counter): ok / rejected / unavailable
//! - `wager_payouts_total{outcome}` (counter): per-winner payout results
//! - `wager_observer_last_block` (gauge): last block fully scanned
//! - `wager_rpc_healthy` (gauge): 1=healthy, 0=unhealthy

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_transfer_observed() {
    counter!("wager_transfers_observed_total").increment(1);
}

pub fn record_bet_verified() {
    counter!("wager_bets_verified_total").increment(1);
}

pub fn record_broadcast(outcome: &'static str) {
    counter!("wager_broadcasts_total", "outcome" => outcome).increment(1);
}

pub fn record_signer_request(outcome: &'static str) {
    counter!("wager_signer_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_payout(outcome: &'static str) {
    counter!("wager_payouts_total", "outcome" => outcome).increment(1);
}

pub fn record_observer_block(number: u64) {
    gauge!("wager_observer_last_block").set(number as f64);
}

pub fn record_rpc_health(healthy: bool) {
    gauge!("wager_rpc_healthy").set(if healthy { 1.0 } else { 0.0 });
}
