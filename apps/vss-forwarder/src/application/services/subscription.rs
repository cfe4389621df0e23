//! Broker Subscription
//!
//! Maintains the single filtered subscription against the Databroker and
//! exposes it to the pump as one continuous, pull-based sequence of
//! [`SignalUpdate`]s. Transport drops are repaired internally with the
//! bounded backoff from [`ReconnectPolicy`]; the consumer only ever sees
//! updates, a clean end on shutdown, or one terminal
//! [`SubscriptionError::Unrecoverable`].
//!
//! Shutdown is raced against every wait: the next update, the backoff
//! sleep and the reconnect handshake.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::shutdown::ShutdownSignal;
use super::status::{RelayStatus, SubscriptionState};
use crate::application::ports::{BrokerConnection, BrokerConnector, BrokerError, UpdateStream};
use crate::domain::filter::{FilterSpec, SignalMatcher};
use crate::domain::signal::SignalUpdate;

/// Errors surfaced by the subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The initial connection or subscribe handshake failed.
    #[error("could not subscribe to broker at {endpoint}: {reason}")]
    Connection {
        /// Broker endpoint.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },

    /// Shutdown was requested while opening.
    #[error("subscription cancelled by shutdown")]
    Cancelled,

    /// The reconnect budget is exhausted.
    #[error("gave up reconnecting after {attempts} attempts in {elapsed:?}: {last_error}")]
    Unrecoverable {
        /// Reconnect attempts made.
        attempts: u32,
        /// Time spent reconnecting.
        elapsed: Duration,
        /// Last transport error seen.
        last_error: String,
    },
}

/// Subscription timing parameters.
#[derive(Debug, Clone)]
pub struct SubscriptionSettings {
    /// Bound on a single connect and subscribe handshake.
    pub connect_timeout: Duration,
    /// Backoff used after a transport drop.
    pub reconnect: ReconnectConfig,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Opens subscriptions against a broker.
pub struct SubscriptionClient {
    connector: Arc<dyn BrokerConnector>,
    settings: SubscriptionSettings,
    status: Arc<RelayStatus>,
}

impl SubscriptionClient {
    /// Create a client for the given broker.
    #[must_use]
    pub fn new(
        connector: Arc<dyn BrokerConnector>,
        settings: SubscriptionSettings,
        status: Arc<RelayStatus>,
    ) -> Self {
        Self {
            connector,
            settings,
            status,
        }
    }

    /// Connect and subscribe to the paths selected by `filter`.
    ///
    /// The handshake is bounded by the connect timeout and is not retried;
    /// the caller decides what a failed open means. With an empty filter the
    /// connection is verified but no subscribe request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Connection`] if the handshake fails or
    /// times out, and [`SubscriptionError::Cancelled`] if shutdown is
    /// requested first.
    pub async fn open(
        self,
        filter: FilterSpec,
        shutdown: ShutdownSignal,
    ) -> Result<Subscription, SubscriptionError> {
        let endpoint = self.connector.endpoint();
        tracing::info!(
            endpoint = %endpoint,
            signals = filter.len(),
            filter = %filter,
            "Connecting to broker"
        );

        self.status.set_subscribed_paths(filter.len());
        let mut subscription = Subscription {
            connector: self.connector,
            endpoint,
            paths: filter.to_vec(),
            filter,
            connect_timeout: self.settings.connect_timeout,
            policy: ReconnectPolicy::new(self.settings.reconnect),
            shutdown,
            status: self.status,
            state: SubscriptionState::Connecting,
            connection: None,
            stream: None,
            pending: VecDeque::new(),
            closed: false,
        };
        subscription.set_state(SubscriptionState::Connecting);

        let timeout = subscription.connect_timeout;
        match subscription.attempt(timeout).await {
            Ok(()) => {
                subscription.set_state(SubscriptionState::Subscribed);
                tracing::info!(endpoint = %subscription.endpoint, "Subscribed to broker");
                Ok(subscription)
            }
            Err(Attempt::Cancelled) => {
                subscription.close().await;
                Err(SubscriptionError::Cancelled)
            }
            Err(Attempt::Failed(e)) => {
                subscription.status.set_error(e.to_string());
                subscription.close().await;
                Err(SubscriptionError::Connection {
                    endpoint: subscription.endpoint,
                    reason: e.to_string(),
                })
            }
        }
    }
}

/// Outcome of one failed handshake.
enum Attempt {
    Cancelled,
    Failed(BrokerError),
}

/// What ended a wait for the next batch.
enum Wake {
    Shutdown,
    Batch(Vec<SignalUpdate>),
    Dropped(String),
}

/// A live filtered subscription.
///
/// Owns the broker connection exclusively. Reconnects are invisible to
/// the consumer except through logs, status and a possible gap in the
/// timestamp sequence.
pub struct Subscription {
    connector: Arc<dyn BrokerConnector>,
    endpoint: String,
    filter: FilterSpec,
    paths: Vec<String>,
    connect_timeout: Duration,
    policy: ReconnectPolicy,
    shutdown: ShutdownSignal,
    status: Arc<RelayStatus>,
    state: SubscriptionState,
    connection: Option<Box<dyn BrokerConnection>>,
    stream: Option<UpdateStream>,
    pending: VecDeque<SignalUpdate>,
    closed: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("endpoint", &self.endpoint)
            .field("filter", &self.filter)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Filter this subscription was opened with.
    #[must_use]
    pub const fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    /// Wait for the next update.
    ///
    /// Returns `None` once shutdown is requested or the subscription is
    /// closed. After an [`SubscriptionError::Unrecoverable`] item the
    /// sequence is closed as well.
    pub async fn next_update(&mut self) -> Option<Result<SignalUpdate, SubscriptionError>> {
        loop {
            if self.closed {
                return None;
            }
            if self.shutdown.is_triggered() {
                self.close().await;
                return None;
            }
            if let Some(update) = self.pending.pop_front() {
                return Some(Ok(update));
            }

            match self.wait().await {
                Wake::Shutdown => {
                    tracing::debug!("Shutdown observed while waiting for updates");
                    self.close().await;
                    return None;
                }
                Wake::Batch(batch) => self.accept(batch),
                Wake::Dropped(reason) => match self.reconnect(reason).await {
                    Ok(()) => {}
                    Err(SubscriptionError::Cancelled) => {
                        self.close().await;
                        return None;
                    }
                    Err(e) => {
                        tracing::error!(endpoint = %self.endpoint, error = %e, "Subscription lost");
                        self.status.set_error(e.to_string());
                        self.close().await;
                        return Some(Err(e));
                    }
                },
            }
        }
    }

    /// Close the subscription.
    ///
    /// Drops the update stream, which cancels the RPC on the broker side,
    /// and closes the connection. Safe to call more than once; only the
    /// first call has an effect.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.pending.clear();
        self.release_connection().await;
        self.set_state(SubscriptionState::Closed);
        tracing::info!(endpoint = %self.endpoint, "Subscription closed");
    }

    async fn wait(&mut self) -> Wake {
        let shutdown = self.shutdown.clone();
        let Some(stream) = self.stream.as_mut() else {
            // Empty filter: nothing will ever arrive.
            shutdown.cancelled().await;
            return Wake::Shutdown;
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => Wake::Shutdown,
            item = stream.next() => match item {
                Some(Ok(batch)) => Wake::Batch(batch),
                Some(Err(e)) => Wake::Dropped(e.to_string()),
                None => Wake::Dropped("update stream ended".to_string()),
            },
        }
    }

    fn accept(&mut self, batch: Vec<SignalUpdate>) {
        for update in batch {
            self.status.increment_received();
            if self.filter.matches(&update.path) {
                self.pending.push_back(update);
            } else {
                self.status.increment_filtered();
                tracing::debug!(path = %update.path, "Dropped update outside filter");
            }
        }
    }

    /// Re-establish the subscription after a transport drop.
    async fn reconnect(&mut self, reason: String) -> Result<(), SubscriptionError> {
        tracing::warn!(endpoint = %self.endpoint, error = %reason, "Broker subscription interrupted");
        self.set_state(SubscriptionState::Disconnected);
        self.status.set_error(reason.clone());
        self.release_connection().await;

        let mut last_error = reason;
        loop {
            let Some(delay) = self.policy.next_delay() else {
                return Err(SubscriptionError::Unrecoverable {
                    attempts: self.policy.attempt_count(),
                    elapsed: self.policy.elapsed(),
                    last_error,
                });
            };

            let attempt = self.policy.attempt_count();
            self.set_state(SubscriptionState::Reconnecting);
            self.status.increment_reconnect_attempts();
            tracing::info!(
                attempt,
                delay_ms = delay.as_millis(),
                "Reconnecting to broker"
            );

            let shutdown = self.shutdown.clone();
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown during reconnect delay");
                    return Err(SubscriptionError::Cancelled);
                }
                () = tokio::time::sleep(delay) => {}
            }

            // The handshake counts against the elapsed budget too.
            let timeout = self
                .policy
                .remaining()
                .map_or(self.connect_timeout, |remaining| remaining.min(self.connect_timeout));
            match self.attempt(timeout).await {
                Ok(()) => {
                    self.policy.reset();
                    self.set_state(SubscriptionState::Subscribed);
                    tracing::info!(endpoint = %self.endpoint, attempt, "Resubscribed to broker");
                    return Ok(());
                }
                Err(Attempt::Cancelled) => return Err(SubscriptionError::Cancelled),
                Err(Attempt::Failed(e)) => {
                    tracing::warn!(attempt, error = %e, "Reconnect attempt failed");
                    last_error = e.to_string();
                    self.status.set_error(last_error.clone());
                }
            }
        }
    }

    /// One connect and subscribe handshake, bounded by `timeout`.
    async fn attempt(&mut self, timeout: Duration) -> Result<(), Attempt> {
        let shutdown = self.shutdown.clone();
        let handshake = handshake(self.connector.as_ref(), &self.paths);

        let outcome = tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            result = tokio::time::timeout(timeout, handshake) => Some(result),
        };

        match outcome {
            None => Err(Attempt::Cancelled),
            Some(Ok(Ok((connection, stream)))) => {
                self.connection = Some(connection);
                self.stream = stream;
                Ok(())
            }
            Some(Ok(Err(e))) => Err(Attempt::Failed(e)),
            Some(Err(_)) => Err(Attempt::Failed(BrokerError::Connect(format!(
                "handshake timed out after {}ms",
                timeout.as_millis()
            )))),
        }
    }

    async fn release_connection(&mut self) {
        self.stream = None;
        if let Some(mut connection) = self.connection.take() {
            connection.close().await;
        }
    }

    fn set_state(&mut self, state: SubscriptionState) {
        self.state = state;
        self.status.set_state(state);
    }
}

async fn handshake(
    connector: &dyn BrokerConnector,
    paths: &[String],
) -> Result<(Box<dyn BrokerConnection>, Option<UpdateStream>), BrokerError> {
    let mut connection = connector.connect().await?;
    if paths.is_empty() {
        return Ok((connection, None));
    }

    match connection.subscribe(paths).await {
        Ok(stream) => Ok((connection, Some(stream))),
        Err(e) => {
            connection.close().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::SignalValue;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Connects according to a fixed script; every connect after the script
    /// runs out is refused.
    #[derive(Default)]
    struct ScriptedConnector {
        script: Mutex<VecDeque<Option<Vec<Result<Vec<SignalUpdate>, BrokerError>>>>>,
        connects: AtomicUsize,
        subscribes: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedConnector {
        fn push_stream(&self, items: Vec<Result<Vec<SignalUpdate>, BrokerError>>) {
            self.script.lock().push_back(Some(items));
        }

        fn push_refusal(&self) {
            self.script.lock().push_back(None);
        }
    }

    struct ScriptedConnection {
        items: Option<Vec<Result<Vec<SignalUpdate>, BrokerError>>>,
        subscribes: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrokerConnector for ScriptedConnector {
        fn endpoint(&self) -> String {
            "http://broker.test:55555".to_string()
        }

        async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().pop_front() {
                Some(Some(items)) => Ok(Box::new(ScriptedConnection {
                    items: Some(items),
                    subscribes: self.subscribes.clone(),
                    closes: self.closes.clone(),
                })),
                _ => Err(BrokerError::Connect("connection refused".to_string())),
            }
        }
    }

    #[async_trait]
    impl BrokerConnection for ScriptedConnection {
        async fn subscribe(&mut self, _paths: &[String]) -> Result<UpdateStream, BrokerError> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let items = self.items.take().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn update(path: &str, value: f64) -> SignalUpdate {
        SignalUpdate::new(path, value, Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn settings(max_attempts: u32) -> SubscriptionSettings {
        SubscriptionSettings {
            connect_timeout: Duration::from_secs(1),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                multiplier: 2.0,
                jitter_factor: 0.0,
                max_attempts,
                max_elapsed: None,
            },
        }
    }

    fn client(connector: &Arc<ScriptedConnector>, max_attempts: u32) -> SubscriptionClient {
        SubscriptionClient::new(
            connector.clone(),
            settings(max_attempts),
            Arc::new(RelayStatus::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_is_connection_error() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.push_refusal();

        let err = client(&connector, 3)
            .open(FilterSpec::from_paths(["Vehicle.Speed"]), ShutdownSignal::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriptionError::Connection { .. }));
        // No retry on initial open
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_cancelled_by_shutdown() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.push_stream(vec![]);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let err = client(&connector, 3)
            .open(FilterSpec::from_paths(["Vehicle.Speed"]), shutdown)
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_filter_connects_without_subscribing() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.push_stream(vec![]);
        let shutdown = ShutdownSignal::new();

        let mut subscription = client(&connector, 3)
            .open(FilterSpec::default(), shutdown.clone())
            .await
            .unwrap();
        assert_eq!(subscription.state(), SubscriptionState::Subscribed);
        assert_eq!(connector.subscribes.load(Ordering::SeqCst), 0);

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            trigger.trigger();
        });
        assert!(subscription.next_update().await.is_none());
        assert_eq!(subscription.state(), SubscriptionState::Closed);
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_is_transparent() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.push_stream(vec![
            Ok(vec![update("Vehicle.Speed", 1.0)]),
            Err(BrokerError::Stream("reset".to_string())),
        ]);
        connector.push_refusal();
        connector.push_stream(vec![Ok(vec![update("Vehicle.Speed", 2.0)])]);

        let mut subscription = client(&connector, 5)
            .open(FilterSpec::from_paths(["Vehicle.Speed"]), ShutdownSignal::new())
            .await
            .unwrap();

        let first = subscription.next_update().await.unwrap().unwrap();
        let second = subscription.next_update().await.unwrap().unwrap();
        assert_eq!(first.value, SignalValue::Number(1.0));
        assert_eq!(second.value, SignalValue::Number(2.0));
        assert_eq!(subscription.state(), SubscriptionState::Subscribed);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
        // The dropped connection was released
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_yields_one_unrecoverable() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.push_stream(vec![]);

        let mut subscription = client(&connector, 2)
            .open(FilterSpec::from_paths(["Vehicle.Speed"]), ShutdownSignal::new())
            .await
            .unwrap();

        let err = subscription.next_update().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::Unrecoverable { attempts: 2, .. }
        ));
        assert!(subscription.next_update().await.is_none());
        assert_eq!(subscription.state(), SubscriptionState::Closed);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent() {
        let connector = Arc::new(ScriptedConnector::default());
        connector.push_stream(vec![]);

        let mut subscription = client(&connector, 2)
            .open(FilterSpec::from_paths(["Vehicle.Speed"]), ShutdownSignal::new())
            .await
            .unwrap();

        subscription.close().await;
        subscription.close().await;
        assert_eq!(connector.closes.load(Ordering::SeqCst), 1);
        assert!(subscription.next_update().await.is_none());
    }
}
