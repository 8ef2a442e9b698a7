//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "parley_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "parley_connections_active";
    pub const USERS_REGISTERED: &str = "parley_users_registered";
    pub const ROOMS_ACTIVE: &str = "parley_rooms_active";
    pub const EVENTS_TOTAL: &str = "parley_events_total";
    pub const FRAMES_BYTES: &str = "parley_frames_bytes";
    pub const REGISTRATIONS_REJECTED: &str = "parley_registrations_rejected_total";
    pub const LATENCY_SECONDS: &str = "parley_latency_seconds";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
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
    metrics::describe_gauge!(names::USERS_REGISTERED, "Current number of registered users");
    metrics::describe_gauge!(
        names::ROOMS_ACTIVE,
        "Current number of rooms, including per-connection rooms"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of events by name");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of frames by direction");
    metrics::describe_counter!(
        names::REGISTRATIONS_REJECTED,
        "Total number of rejected registrations"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound event processing latency in seconds"
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

/// Record an event, inbound or outbound.
pub fn record_event(name: &'static str, direction: &'static str) {
    counter!(names::EVENTS_TOTAL, "event" => name, "direction" => direction).increment(1);
}

/// Record frame bytes.
pub fn record_bytes(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record event processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record a rejected registration.
pub fn record_rejected_registration() {
    counter!(names::REGISTRATIONS_REJECTED).increment(1);
}

/// Update the registered user count.
pub fn set_registered_users(count: usize) {
    gauge!(names::USERS_REGISTERED).set(count as f64);
}

/// Update the active room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
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
