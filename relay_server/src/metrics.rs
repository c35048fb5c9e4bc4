//! Prometheus metrics for relay observability.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a message delivered by the subscription.
pub fn message_received(source: &str) {
    counter!("relay_messages_received_total", "source" => source.to_string()).increment(1);
}

/// Record how a message was handled.
pub fn message_handled(outcome: &str) {
    counter!("relay_messages_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a successful status push.
pub fn status_pushed(state: &str) {
    counter!("relay_status_pushes_total", "state" => state.to_string()).increment(1);
}

/// Record status API call duration.
pub fn delivery_duration(duration_ms: u64) {
    histogram!("relay_delivery_duration_ms").record(duration_ms as f64);
}
