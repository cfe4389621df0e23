//! Relay Status Tracking
//!
//! Shared counters and connection state for the relay. Written by the
//! subscription and the pump, read by the health server. Every update is
//! mirrored into the Prometheus metrics.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::infrastructure::metrics;

/// Lifecycle state of the broker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Initial connection in progress.
    Connecting,
    /// Subscription is live.
    Subscribed,
    /// Transport dropped, reconnect not started yet.
    Disconnected,
    /// Waiting for or performing a reconnect attempt.
    Reconnecting,
    /// Terminal: shut down or gave up.
    Closed,
}

impl SubscriptionState {
    /// State name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Check whether the state is terminal.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Tracks the state of the relay.
#[derive(Debug)]
pub struct RelayStatus {
    state: RwLock<SubscriptionState>,
    last_subscribed_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    subscribed_paths: AtomicUsize,
    empty_filter: AtomicBool,
    updates_received: AtomicU64,
    updates_filtered: AtomicU64,
    updates_forwarded: AtomicU64,
    delivery_failures: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl Default for RelayStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayStatus {
    /// Create status in the `Connecting` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(SubscriptionState::Connecting),
            last_subscribed_at: RwLock::new(None),
            last_error: RwLock::new(None),
            subscribed_paths: AtomicUsize::new(0),
            empty_filter: AtomicBool::new(false),
            updates_received: AtomicU64::new(0),
            updates_filtered: AtomicU64::new(0),
            updates_forwarded: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
        }
    }

    /// Set the subscription state.
    pub fn set_state(&self, state: SubscriptionState) {
        *self.state.write() = state;
        if state == SubscriptionState::Subscribed {
            *self.last_subscribed_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
        metrics::set_subscription_state(state);
    }

    /// Remember the most recent upstream error.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Record the number of paths in the active subscription.
    pub fn set_subscribed_paths(&self, count: usize) {
        self.subscribed_paths.store(count, Ordering::Relaxed);
    }

    /// Record whether the configured filter selects no signals.
    pub fn set_empty_filter(&self, empty: bool) {
        self.empty_filter.store(empty, Ordering::Relaxed);
    }

    /// Check whether the configured filter selects no signals.
    #[must_use]
    pub fn empty_filter(&self) -> bool {
        self.empty_filter.load(Ordering::Relaxed)
    }

    /// Count an update received from the broker.
    pub fn increment_received(&self) {
        self.updates_received.fetch_add(1, Ordering::Relaxed);
        metrics::record_update_received();
    }

    /// Count an update dropped by the filter.
    pub fn increment_filtered(&self) {
        self.updates_filtered.fetch_add(1, Ordering::Relaxed);
        metrics::record_update_filtered();
    }

    /// Count an update accepted by the sink.
    pub fn increment_forwarded(&self) {
        self.updates_forwarded.fetch_add(1, Ordering::Relaxed);
        metrics::record_update_forwarded();
    }

    /// Count a failed delivery and return the new total.
    pub fn increment_delivery_failures(&self, sink: &str, kind: &'static str) -> u64 {
        metrics::record_delivery_failure(sink, kind);
        self.delivery_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a reconnect attempt.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::record_reconnect();
    }

    /// Get the current subscription state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.read()
    }

    /// Get the received update count.
    #[must_use]
    pub fn updates_received(&self) -> u64 {
        self.updates_received.load(Ordering::Relaxed)
    }

    /// Get the forwarded update count.
    #[must_use]
    pub fn updates_forwarded(&self) -> u64 {
        self.updates_forwarded.load(Ordering::Relaxed)
    }

    /// Get the filtered update count.
    #[must_use]
    pub fn updates_filtered(&self) -> u64 {
        self.updates_filtered.load(Ordering::Relaxed)
    }

    /// Get the delivery failure count.
    #[must_use]
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }

    /// Get the total reconnect attempt count.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all fields.
    #[must_use]
    pub fn snapshot(&self) -> RelayStatusSnapshot {
        RelayStatusSnapshot {
            state: self.state(),
            last_subscribed_at: *self.last_subscribed_at.read(),
            last_error: self.last_error.read().clone(),
            subscribed_paths: self.subscribed_paths.load(Ordering::Relaxed),
            empty_filter: self.empty_filter(),
            updates_received: self.updates_received(),
            updates_filtered: self.updates_filtered(),
            updates_forwarded: self.updates_forwarded(),
            delivery_failures: self.delivery_failures(),
            reconnect_attempts: self.reconnect_attempts(),
        }
    }
}

/// Serializable copy of [`RelayStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatusSnapshot {
    /// Subscription state.
    pub state: SubscriptionState,
    /// Last time the subscription became live.
    pub last_subscribed_at: Option<DateTime<Utc>>,
    /// Most recent upstream error, cleared on resubscribe.
    pub last_error: Option<String>,
    /// Number of subscribed paths.
    pub subscribed_paths: usize,
    /// The configured filter selects no signals.
    pub empty_filter: bool,
    /// Updates received from the broker.
    pub updates_received: u64,
    /// Updates dropped by the filter.
    pub updates_filtered: u64,
    /// Updates accepted by the sink.
    pub updates_forwarded: u64,
    /// Failed deliveries.
    pub delivery_failures: u64,
    /// Reconnect attempts since start.
    pub reconnect_attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_connecting() {
        let status = RelayStatus::new();
        assert_eq!(status.state(), SubscriptionState::Connecting);
        assert_eq!(status.updates_received(), 0);
        assert!(status.snapshot().last_subscribed_at.is_none());
    }

    #[test]
    fn subscribed_clears_error() {
        let status = RelayStatus::new();
        status.set_error("stream reset".to_string());
        status.set_state(SubscriptionState::Reconnecting);
        assert_eq!(status.snapshot().last_error.as_deref(), Some("stream reset"));

        status.set_state(SubscriptionState::Subscribed);
        let snapshot = status.snapshot();
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_subscribed_at.is_some());
    }

    #[test]
    fn empty_filter_is_explicit() {
        let status = RelayStatus::new();
        assert!(!status.snapshot().empty_filter);

        status.set_empty_filter(true);
        let snapshot = status.snapshot();
        assert!(snapshot.empty_filter);
        assert_eq!(snapshot.subscribed_paths, 0);
    }

    #[test]
    fn failure_count_is_monotonic() {
        let status = RelayStatus::new();
        assert_eq!(status.increment_delivery_failures("influx", "timeout"), 1);
        assert_eq!(status.increment_delivery_failures("influx", "rejected"), 2);
        assert_eq!(status.delivery_failures(), 2);
    }

    #[test]
    fn state_serialization() {
        assert_eq!(
            serde_json::to_string(&SubscriptionState::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
        assert!(SubscriptionState::Closed.is_closed());
        assert_eq!(SubscriptionState::Subscribed.as_str(), "subscribed");
    }
}
