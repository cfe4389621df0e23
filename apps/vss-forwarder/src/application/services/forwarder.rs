//! Forwarder Engine
//!
//! The run loop of the relay: parse the filter, open the subscription,
//! pump every update into the sink and drain on the way out.
//!
//! Each delivery is bounded by a timeout so a slow sink can never stall
//! the live subscription. Delivery failures are logged and counted, they
//! never stop the pump.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::shutdown::ShutdownSignal;
use super::status::RelayStatus;
use super::subscription::{Subscription, SubscriptionClient, SubscriptionError};
use crate::application::ports::{Ack, DeliveryError, ForwardingSink};
use crate::domain::filter::FilterSpec;
use crate::domain::signal::SignalUpdate;
use crate::infrastructure::metrics;

/// Engine errors. Both are fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The initial subscription could not be established.
    #[error("startup failed: {0}")]
    Startup(#[source] SubscriptionError),

    /// The subscription was lost and could not be re-established.
    #[error("subscription unrecoverable: {0}")]
    Unrecoverable(#[source] SubscriptionError),
}

/// Engine parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Raw comma separated signal filter.
    pub signal_filter: Option<String>,
    /// Bound on a single delivery.
    pub delivery_timeout: Duration,
    /// Bound on closing the subscription and flushing the sink.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signal_filter: None,
            delivery_timeout: Duration::from_millis(2000),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Create configuration from `EngineSettings`.
    #[must_use]
    pub fn from_settings(settings: &crate::EngineSettings) -> Self {
        Self {
            signal_filter: settings.signal_filter.clone(),
            delivery_timeout: settings.delivery_timeout,
            shutdown_grace: settings.shutdown_grace,
        }
    }
}

/// Summary of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardReport {
    /// Updates written by the sink.
    pub delivered: u64,
    /// Updates buffered by the sink.
    pub buffered: u64,
    /// Updates the sink chose not to write.
    pub skipped: u64,
    /// Failed deliveries.
    pub failed: u64,
    /// Whether close and flush finished within the grace period.
    pub drained: bool,
}

impl ForwardReport {
    /// Updates accepted by the sink in any form.
    #[must_use]
    pub const fn forwarded(&self) -> u64 {
        self.delivered + self.buffered + self.skipped
    }

    const fn record(&mut self, ack: Ack) {
        match ack {
            Ack::Delivered => self.delivered += 1,
            Ack::Buffered => self.buffered += 1,
            Ack::Skipped => self.skipped += 1,
        }
    }
}

/// Drives one subscription into one sink.
pub struct ForwarderEngine {
    client: SubscriptionClient,
    sink: Arc<dyn ForwardingSink>,
    config: EngineConfig,
    shutdown: ShutdownSignal,
    status: Arc<RelayStatus>,
}

impl ForwarderEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        client: SubscriptionClient,
        sink: Arc<dyn ForwardingSink>,
        config: EngineConfig,
        shutdown: ShutdownSignal,
        status: Arc<RelayStatus>,
    ) -> Self {
        Self {
            client,
            sink,
            config,
            shutdown,
            status,
        }
    }

    /// Run until shutdown or an unrecoverable subscription error.
    ///
    /// Consumes the engine; a stopped engine cannot be resumed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Startup`] if the initial subscription fails and
    /// [`EngineError::Unrecoverable`] if the reconnect budget is exhausted.
    pub async fn run(self) -> Result<ForwardReport, EngineError> {
        let Self {
            client,
            sink,
            config,
            shutdown,
            status,
        } = self;

        let (filter, warning) = FilterSpec::parse(config.signal_filter.as_deref());
        status.set_empty_filter(filter.is_empty());
        if let Some(warning) = warning {
            tracing::warn!(warning = %warning, "Starting with an empty signal filter");
        }

        let mut subscription = match client.open(filter, shutdown).await {
            Ok(subscription) => subscription,
            Err(SubscriptionError::Cancelled) => {
                tracing::info!("Shutdown requested before the subscription was established");
                return Ok(ForwardReport {
                    drained: true,
                    ..ForwardReport::default()
                });
            }
            Err(e) => return Err(EngineError::Startup(e)),
        };

        let pump = Pump {
            sink: sink.as_ref(),
            status: &status,
            delivery_timeout: config.delivery_timeout,
        };
        let mut report = ForwardReport::default();
        tracing::info!(sink = sink.name(), "Forwarding signal updates");

        let outcome = loop {
            match subscription.next_update().await {
                Some(Ok(update)) => pump.forward(update, &mut report).await,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            }
        };

        report.drained = drain(&mut subscription, sink.as_ref(), config.shutdown_grace).await;
        tracing::info!(
            delivered = report.delivered,
            buffered = report.buffered,
            skipped = report.skipped,
            failed = report.failed,
            drained = report.drained,
            "Forwarder stopped"
        );

        outcome.map(|()| report).map_err(EngineError::Unrecoverable)
    }
}

struct Pump<'a> {
    sink: &'a dyn ForwardingSink,
    status: &'a RelayStatus,
    delivery_timeout: Duration,
}

impl Pump<'_> {
    async fn forward(&self, update: SignalUpdate, report: &mut ForwardReport) {
        let path = update.path.clone();
        let timestamp = update.timestamp;
        let started = Instant::now();

        let result = match tokio::time::timeout(self.delivery_timeout, self.sink.deliver(update)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                timeout_ms: u64::try_from(self.delivery_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        metrics::record_delivery_duration(started.elapsed());

        match result {
            Ok(ack) => {
                report.record(ack);
                self.status.increment_forwarded();
                tracing::trace!(path = %path, ack = ?ack, "Forwarded update");
            }
            Err(e) => {
                report.failed += 1;
                let failures = self.status.increment_delivery_failures(self.sink.name(), e.kind());
                tracing::warn!(
                    sink = self.sink.name(),
                    path = %path,
                    timestamp = %timestamp.to_rfc3339(),
                    kind = e.kind(),
                    error = %e,
                    failures,
                    "Delivery failed"
                );
            }
        }
    }
}

/// Close the subscription and flush the sink within `grace`.
async fn drain(subscription: &mut Subscription, sink: &dyn ForwardingSink, grace: Duration) -> bool {
    let work = async {
        subscription.close().await;
        sink.flush().await
    };

    match tokio::time::timeout(grace, work).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(sink = sink.name(), kind = e.kind(), error = %e, "Sink flush failed");
            false
        }
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis(),
                "Drain did not finish within the grace period"
            );
            false
        }
    }
}
