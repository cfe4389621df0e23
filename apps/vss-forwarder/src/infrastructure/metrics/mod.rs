//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Updates**: Counts of updates received, filtered and forwarded
//! - **Delivery**: Failures by sink and kind, delivery latency
//! - **Subscription**: Broker subscription state and reconnect attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::services::status::SubscriptionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed, e.g. because
/// another global recorder is already set.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Update counters
    describe_counter!(
        "vss_forwarder_updates_received_total",
        "Total signal updates received from the broker"
    );
    describe_counter!(
        "vss_forwarder_updates_filtered_total",
        "Total signal updates dropped because their path is not in the filter"
    );
    describe_counter!(
        "vss_forwarder_updates_forwarded_total",
        "Total signal updates accepted by the sink"
    );

    // Delivery
    describe_counter!(
        "vss_forwarder_delivery_failures_total",
        "Total failed deliveries by sink and error kind"
    );
    describe_histogram!(
        "vss_forwarder_delivery_seconds",
        "Time spent delivering one update to the sink"
    );

    // Subscription
    describe_gauge!(
        "vss_forwarder_subscription_state",
        "Broker subscription state (0 connecting, 1 subscribed, 2 disconnected, 3 reconnecting, 4 closed)"
    );
    describe_counter!(
        "vss_forwarder_reconnects_total",
        "Total broker reconnection attempts"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn state_value(state: SubscriptionState) -> f64 {
    match state {
        SubscriptionState::Connecting => 0.0,
        SubscriptionState::Subscribed => 1.0,
        SubscriptionState::Disconnected => 2.0,
        SubscriptionState::Reconnecting => 3.0,
        SubscriptionState::Closed => 4.0,
    }
}

/// Record an update received from the broker.
pub fn record_update_received() {
    counter!("vss_forwarder_updates_received_total").increment(1);
}

/// Record an update dropped by the filter.
pub fn record_update_filtered() {
    counter!("vss_forwarder_updates_filtered_total").increment(1);
}

/// Record an update accepted by the sink.
pub fn record_update_forwarded() {
    counter!("vss_forwarder_updates_forwarded_total").increment(1);
}

/// Record a failed delivery.
pub fn record_delivery_failure(sink: &str, kind: &'static str) {
    counter!(
        "vss_forwarder_delivery_failures_total",
        "sink" => sink.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record delivery duration.
pub fn record_delivery_duration(duration: Duration) {
    histogram!("vss_forwarder_delivery_seconds").record(duration.as_secs_f64());
}

/// Update the subscription state gauge.
pub fn set_subscription_state(state: SubscriptionState) {
    gauge!("vss_forwarder_subscription_state").set(state_value(state));
}

/// Record a broker reconnection attempt.
pub fn record_reconnect() {
    counter!("vss_forwarder_reconnects_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_values_are_distinct() {
        let values = [
            SubscriptionState::Connecting,
            SubscriptionState::Subscribed,
            SubscriptionState::Disconnected,
            SubscriptionState::Reconnecting,
            SubscriptionState::Closed,
        ]
        .map(state_value);

        for (i, a) in values.iter().enumerate() {
            for b in &values[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_update_received();
        record_delivery_failure("influx", "timeout");
        record_delivery_duration(Duration::from_millis(3));
        set_subscription_state(SubscriptionState::Subscribed);
    }
}
