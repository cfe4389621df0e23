//! Shutdown Signal
//!
//! Process-wide, one-way stop request shared by the lifecycle controller,
//! the subscription and the forwarding engine. It is injected into every
//! long-running call instead of living in a global.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// One-shot cooperative shutdown request.
///
/// Cloning is cheap; all clones observe the same transition.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a signal in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown.
    ///
    /// Returns `true` only for the call that performed the running to
    /// stopping transition; every later call is a no-op returning `false`.
    pub fn trigger(&self) -> bool {
        let first = !self.triggered.swap(true, Ordering::AcqRel);
        if first {
            self.token.cancel();
        }
        first
    }

    /// Check whether shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Wait until shutdown is requested. Completes immediately if it already was.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Underlying token, for APIs that take a cancellation future.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_is_one_way_and_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());

        assert!(signal.trigger());
        assert!(signal.is_triggered());

        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[test]
    fn clones_share_state() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();

        assert!(clone.trigger());
        assert!(signal.is_triggered());
        assert!(!signal.trigger());
        assert!(signal.token().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
