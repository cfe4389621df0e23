//! Fan-out Sink
//!
//! Delivers every update to several sinks in order. All sinks are tried
//! even when one fails; the first failure is reported.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ports::{Ack, DeliveryError, ForwardingSink};
use crate::domain::signal::SignalUpdate;

/// A set of sinks that all receive every update.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn ForwardingSink>>,
}

impl std::fmt::Debug for SinkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|sink| sink.name()))
            .finish()
    }
}

impl SinkSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn ForwardingSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check whether the set has no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// Strongest acknowledgement wins: delivered, then buffered, then skipped.
const fn combine(a: Ack, b: Ack) -> Ack {
    match (a, b) {
        (Ack::Delivered, _) | (_, Ack::Delivered) => Ack::Delivered,
        (Ack::Buffered, _) | (_, Ack::Buffered) => Ack::Buffered,
        _ => Ack::Skipped,
    }
}

#[async_trait]
impl ForwardingSink for SinkSet {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn deliver(&self, update: SignalUpdate) -> Result<Ack, DeliveryError> {
        let mut ack = Ack::Skipped;
        let mut first_error = None;

        for sink in &self.sinks {
            match sink.deliver(update.clone()).await {
                Ok(sink_ack) => ack = combine(ack, sink_ack),
                Err(e) => {
                    tracing::debug!(sink = sink.name(), error = %e, "Sink in set failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(ack), Err)
    }

    async fn flush(&self) -> Result<(), DeliveryError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.flush().await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        ack: Result<Ack, DeliveryError>,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new(ack: Result<Ack, DeliveryError>) -> Arc<Self> {
            Arc::new(Self {
                ack,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ForwardingSink for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _update: SignalUpdate) -> Result<Ack, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ack.clone()
        }
    }

    fn update() -> SignalUpdate {
        SignalUpdate::new("Vehicle.Speed", 1.0, Utc::now())
    }

    #[tokio::test]
    async fn every_sink_receives_update() {
        let a = Counting::new(Ok(Ack::Skipped));
        let b = Counting::new(Ok(Ack::Delivered));
        let set = SinkSet::new().with(a.clone()).with(b.clone());

        assert_eq!(set.deliver(update()).await.unwrap(), Ack::Delivered);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn failure_does_not_skip_later_sinks() {
        let failing = Counting::new(Err(DeliveryError::Transport("down".to_string())));
        let healthy = Counting::new(Ok(Ack::Buffered));
        let set = SinkSet::new().with(failing).with(healthy.clone());

        let err = set.deliver(update()).await.unwrap_err();
        assert_eq!(err, DeliveryError::Transport("down".to_string()));
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ack_combination() {
        assert_eq!(combine(Ack::Skipped, Ack::Buffered), Ack::Buffered);
        assert_eq!(combine(Ack::Delivered, Ack::Skipped), Ack::Delivered);
        assert_eq!(combine(Ack::Skipped, Ack::Skipped), Ack::Skipped);
    }
}
