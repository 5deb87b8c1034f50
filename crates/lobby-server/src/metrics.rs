//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use lobby_core::RegistryStats;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "lobby_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "lobby_connections_active";
    pub const MESSAGES_TOTAL: &str = "lobby_messages_total";
    pub const MESSAGES_BYTES: &str = "lobby_messages_bytes";
    pub const LOBBIES_ACTIVE: &str = "lobby_lobbies_active";
    pub const LOBBY_CLIENTS: &str = "lobby_clients";
    pub const ERRORS_TOTAL: &str = "lobby_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of inbound messages");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of inbound messages");
    metrics::describe_gauge!(names::LOBBIES_ACTIVE, "Current number of lobbies");
    metrics::describe_gauge!(
        names::LOBBY_CLIENTS,
        "Clients across all lobbies, as last published by the hubs"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an inbound message.
pub fn record_message(bytes: usize) {
    counter!(names::MESSAGES_TOTAL).increment(1);
    counter!(names::MESSAGES_BYTES).increment(bytes as u64);
}

/// Publish registry gauges.
pub fn set_registry_stats(stats: RegistryStats) {
    gauge!(names::LOBBIES_ACTIVE).set(stats.lobby_count as f64);
    gauge!(names::LOBBY_CLIENTS).set(stats.client_count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; must not panic
        let _guard = ConnectionMetricsGuard::new();
        record_message(5);
        record_error("test");
        set_registry_stats(RegistryStats {
            lobby_count: 1,
            client_count: 2,
        });
    }
}
