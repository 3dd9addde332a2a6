//! Metrics collection and export for Chatter.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use chatter_core::RelayError;
use chatter_protocol::EventKind;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "chatter_connections_total";
    pub const CONNECTIONS_REJECTED: &str = "chatter_connections_rejected_total";
    pub const CONNECTIONS_ACTIVE: &str = "chatter_connections_active";
    pub const EVENTS_TOTAL: &str = "chatter_events_total";
    pub const DELIVERIES_DROPPED: &str = "chatter_deliveries_dropped_total";
    pub const MESSAGES_RELAYED: &str = "chatter_messages_relayed_total";
    pub const RELAY_FAILURES: &str = "chatter_relay_failures_total";
    pub const DISPATCH_SECONDS: &str = "chatter_dispatch_seconds";
    pub const ERRORS_TOTAL: &str = "chatter_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of admitted connections since server start"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections refused during the handshake"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of admitted connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Events received and sent, by kind");
    metrics::describe_counter!(
        names::DELIVERIES_DROPPED,
        "Events dropped because a recipient's outbox was full or closed"
    );
    metrics::describe_counter!(names::MESSAGES_RELAYED, "Chat messages broadcast");
    metrics::describe_counter!(
        names::RELAY_FAILURES,
        "Send requests rejected or not persisted"
    );
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Inbound event handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");

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

/// Record an admitted connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a refused handshake.
pub fn record_rejection(reason: &'static str) {
    counter!(names::CONNECTIONS_REJECTED, "reason" => reason).increment(1);
}

/// Record an event crossing the socket.
pub fn record_event(kind: EventKind, direction: &'static str) {
    counter!(
        names::EVENTS_TOTAL,
        "direction" => direction,
        "event" => kind.as_str()
    )
    .increment(1);
}

/// Record a successfully relayed chat message.
pub fn record_relayed() {
    counter!(names::MESSAGES_RELAYED).increment(1);
}

/// Record deliveries dropped by the broadcaster.
pub fn record_dropped(count: usize) {
    if count > 0 {
        counter!(names::DELIVERIES_DROPPED).increment(count as u64);
    }
}

/// Record a rejected or failed send request.
pub fn record_relay_failure(error: &RelayError) {
    let kind = match error {
        RelayError::Validation(_) => "validation",
        RelayError::Persistence(_) => "persistence",
    };
    counter!(names::RELAY_FAILURES, "kind" => kind).increment(1);
}

/// Record dispatch latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
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
