//! Log Sink
//!
//! Used when no destination is configured. Every update is logged and
//! acknowledged as skipped, which keeps the relay useful as a pass-through
//! for observing the broker.

use async_trait::async_trait;

use crate::application::ports::{Ack, DeliveryError, ForwardingSink};
use crate::domain::signal::SignalUpdate;

/// Logs updates instead of storing them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    /// Create a log sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ForwardingSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, update: SignalUpdate) -> Result<Ack, DeliveryError> {
        tracing::info!(
            path = %update.path,
            value = %update.value,
            kind = update.value.kind(),
            timestamp = %update.timestamp.to_rfc3339(),
            "Signal update"
        );
        Ok(Ack::Skipped)
    }
}
