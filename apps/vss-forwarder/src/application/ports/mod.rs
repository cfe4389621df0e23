//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`BrokerConnector`] / [`BrokerConnection`]: the upstream Databroker
//! - [`ForwardingSink`]: downstream destinations for signal updates

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::domain::signal::SignalUpdate;

// =============================================================================
// Broker Port
// =============================================================================

/// Stream of update batches produced by a broker subscription.
///
/// One item corresponds to one upstream notification, which may carry
/// several updates. An `Err` item or the end of the stream means the
/// transport dropped.
pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<Vec<SignalUpdate>, BrokerError>> + Send>>;

/// Broker transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// The connection could not be established.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// The subscribe request was rejected.
    #[error("broker rejected subscription: {0}")]
    Subscribe(String),

    /// The update stream failed mid-flight.
    #[error("broker stream interrupted: {0}")]
    Stream(String),
}

/// Establishes connections to the upstream broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Human readable broker endpoint, used in logs.
    fn endpoint(&self) -> String;

    /// Open a new connection.
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// A live connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Subscribe to the current values of the given signal paths.
    async fn subscribe(&mut self, paths: &[String]) -> Result<UpdateStream, BrokerError>;

    /// Release the connection. Called at most once per connection.
    async fn close(&mut self);
}

// =============================================================================
// Sink Port
// =============================================================================

/// Successful delivery outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Written to the destination.
    Delivered,
    /// Accepted into a buffer, written on a later delivery or flush.
    Buffered,
    /// Intentionally not written (unconfigured sink, unsupported value).
    Skipped,
}

/// Delivery errors. Never fatal to the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The delivery did not complete within the configured timeout.
    #[error("delivery timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// The destination refused the write.
    #[error("destination rejected write (status {status}): {message}")]
    Rejected {
        /// Status reported by the destination.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The destination could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The update could not be encoded for the destination.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl DeliveryError {
    /// Short label of the error kind for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::Encoding(_) => "encoding",
        }
    }
}

/// Port for downstream destinations of signal updates.
#[async_trait]
pub trait ForwardingSink: Send + Sync {
    /// Sink name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Deliver one update.
    async fn deliver(&self, update: SignalUpdate) -> Result<Ack, DeliveryError>;

    /// Write any buffered state. Called once while shutting down.
    async fn flush(&self) -> Result<(), DeliveryError> {
        Ok(())
    }
}
