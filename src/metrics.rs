//! Hub metrics
//!
//! This module provides Prometheus metrics for hub monitoring.

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

lazy_static! {
    /// Registered clients
    pub static ref HUB_ACTIVE_CLIENTS: IntGauge = register_int_gauge!(
        "watch_hub_active_clients",
        "Number of registered clients"
    )
    .unwrap();

    /// Total client registrations
    pub static ref HUB_CLIENTS_TOTAL: IntCounter = register_int_counter!(
        "watch_hub_clients_total",
        "Total number of accepted client registrations"
    )
    .unwrap();

    /// Registrations refused at the client cap
    pub static ref HUB_REGISTRATIONS_REFUSED: IntCounter = register_int_counter!(
        "watch_hub_registrations_refused_total",
        "Registrations refused because the client cap was reached"
    )
    .unwrap();

    /// Clients pruned for idleness
    pub static ref HUB_CLIENTS_PRUNED: IntCounter = register_int_counter!(
        "watch_hub_clients_pruned_total",
        "Clients removed by the heartbeat task for idleness"
    )
    .unwrap();

    /// Live upstream connections
    pub static ref HUB_ACTIVE_UPSTREAMS: IntGauge = register_int_gauge!(
        "watch_hub_active_upstreams",
        "Number of live upstream watch connections"
    )
    .unwrap();

    /// Total upstreams opened
    pub static ref HUB_UPSTREAMS_OPENED: IntCounter = register_int_counter!(
        "watch_hub_upstreams_opened_total",
        "Total number of upstream watch connections created"
    )
    .unwrap();

    /// Upstream reconnect attempts
    pub static ref HUB_UPSTREAM_RECONNECTS: IntCounter = register_int_counter!(
        "watch_hub_upstream_reconnects_total",
        "Total number of upstream reconnect attempts scheduled"
    )
    .unwrap();

    /// Accepted subscribe calls
    pub static ref HUB_SUBSCRIPTIONS: IntCounter = register_int_counter!(
        "watch_hub_subscriptions_total",
        "Total number of subscribe calls accepted"
    )
    .unwrap();

    /// Unsubscriptions
    pub static ref HUB_UNSUBSCRIPTIONS: IntCounter = register_int_counter!(
        "watch_hub_unsubscriptions_total",
        "Total number of unsubscribe calls processed"
    )
    .unwrap();

    /// Events broadcast to channels
    pub static ref HUB_EVENTS_BROADCAST: IntCounter = register_int_counter!(
        "watch_hub_events_broadcast_total",
        "Total number of events fanned out to channels"
    )
    .unwrap();

    /// Events delivered to clients
    pub static ref HUB_EVENTS_DELIVERED: IntCounter = register_int_counter!(
        "watch_hub_events_delivered_total",
        "Total number of events successfully written to clients"
    )
    .unwrap();

    /// Client write errors
    pub static ref HUB_SEND_ERRORS: IntCounter = register_int_counter!(
        "watch_hub_send_errors_total",
        "Total number of failed writes to client push channels"
    )
    .unwrap();
}

/// Record an accepted registration
pub fn record_client_registered() {
    HUB_ACTIVE_CLIENTS.inc();
    HUB_CLIENTS_TOTAL.inc();
}

/// Record a registration refused at the cap
pub fn record_registration_refused() {
    HUB_REGISTRATIONS_REFUSED.inc();
}

/// Record a client removal
pub fn record_client_removed() {
    HUB_ACTIVE_CLIENTS.dec();
}

/// Record an idle-prune removal
pub fn record_client_pruned() {
    HUB_CLIENTS_PRUNED.inc();
}

/// Record a new upstream connection
pub fn record_upstream_opened() {
    HUB_ACTIVE_UPSTREAMS.inc();
    HUB_UPSTREAMS_OPENED.inc();
}

/// Record an upstream teardown
pub fn record_upstream_closed() {
    HUB_ACTIVE_UPSTREAMS.dec();
}

/// Record a scheduled reconnect attempt
pub fn record_upstream_reconnect() {
    HUB_UPSTREAM_RECONNECTS.inc();
}

/// Record an accepted subscribe call
pub fn record_subscription() {
    HUB_SUBSCRIPTIONS.inc();
}

/// Record an unsubscribe call
pub fn record_unsubscription() {
    HUB_UNSUBSCRIPTIONS.inc();
}

/// Record a channel fan-out
pub fn record_event_broadcast() {
    HUB_EVENTS_BROADCAST.inc();
}

/// Record a successful client write
pub fn record_event_delivered() {
    HUB_EVENTS_DELIVERED.inc();
}

/// Record a failed client write
pub fn record_send_error() {
    HUB_SEND_ERRORS.inc();
}

/// Zero the live gauges on shutdown
pub fn record_shutdown() {
    HUB_ACTIVE_CLIENTS.set(0);
    HUB_ACTIVE_UPSTREAMS.set(0);
}

/// Generate Prometheus text format metrics for the /metrics endpoint.
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
