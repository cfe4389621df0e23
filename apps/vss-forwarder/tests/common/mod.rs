//! Shared fixtures for integration tests: a scripted in-process broker and
//! a recording sink.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use parking_lot::Mutex;

use vss_forwarder::{
    Ack, BrokerConnection, BrokerConnector, BrokerError, DeliveryError, EngineConfig,
    ForwarderEngine, ForwardingSink, ReconnectConfig, RelayStatus, ShutdownSignal, SignalUpdate,
    SubscriptionClient, SubscriptionSettings, UpdateStream,
};

// =============================================================================
// Fake broker
// =============================================================================

/// What the broker does for one connection.
pub enum Session {
    /// The connection attempt is refused.
    Refuse,
    /// Sends the batches, then stays open without sending anything.
    Batches(Vec<Vec<SignalUpdate>>),
    /// Sends the batches, then drops the stream.
    BatchesThenDrop(Vec<Vec<SignalUpdate>>),
    /// The connection attempt never completes.
    Hang,
}

/// Observations of the broker side.
#[derive(Default)]
pub struct BrokerStats {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub subscriptions: Mutex<Vec<Vec<String>>>,
}

impl BrokerStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        self.subscriptions.lock().clone()
    }
}

/// Broker that plays one [`Session`] per connection, then refuses.
pub struct FakeBroker {
    sessions: Mutex<VecDeque<Session>>,
    pub stats: Arc<BrokerStats>,
}

impl FakeBroker {
    pub fn new(sessions: impl IntoIterator<Item = Session>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into_iter().collect()),
            stats: Arc::new(BrokerStats::default()),
        })
    }
}

#[async_trait]
impl BrokerConnector for FakeBroker {
    fn endpoint(&self) -> String {
        "http://databroker.test:55555".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let session = self.sessions.lock().pop_front().unwrap_or(Session::Refuse);
        match session {
            Session::Refuse => {
                return Err(BrokerError::Connect("connection refused".to_string()));
            }
            Session::Hang => futures::future::pending::<()>().await,
            Session::Batches(_) | Session::BatchesThenDrop(_) => {}
        }
        Ok(Box::new(FakeConnection {
            session: Some(session),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct FakeConnection {
    session: Option<Session>,
    stats: Arc<BrokerStats>,
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn subscribe(&mut self, paths: &[String]) -> Result<UpdateStream, BrokerError> {
        self.stats.subscriptions.lock().push(paths.to_vec());
        match self.session.take() {
            Some(Session::Batches(items)) => Ok(futures::stream::iter(items.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
            Some(Session::BatchesThenDrop(items)) => Ok(futures::stream::iter(items.into_iter().map(Ok))
                .chain(futures::stream::iter([Err(BrokerError::Stream(
                    "connection reset".to_string(),
                ))]))
                .boxed()),
            Some(Session::Refuse | Session::Hang) | None => {
                Err(BrokerError::Subscribe("session already used".to_string()))
            }
        }
    }

    async fn close(&mut self) {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Recording sink
// =============================================================================

/// Behaviour of the recording sink.
#[derive(Clone)]
pub enum SinkMode {
    Accept,
    Fail,
    Stall(Duration),
}

/// Sink that records every delivery attempt.
pub struct RecordingSink {
    mode: SinkMode,
    pub received: Mutex<Vec<SignalUpdate>>,
    flushes: AtomicUsize,
}

impl RecordingSink {
    pub fn new(mode: SinkMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            received: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        })
    }

    pub fn paths(&self) -> Vec<String> {
        self.received.lock().iter().map(|u| u.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForwardingSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, update: SignalUpdate) -> Result<Ack, DeliveryError> {
        self.received.lock().push(update);
        match &self.mode {
            SinkMode::Accept => Ok(Ack::Delivered),
            SinkMode::Fail => Err(DeliveryError::Transport("destination down".to_string())),
            SinkMode::Stall(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Ack::Delivered)
            }
        }
    }

    async fn flush(&self) -> Result<(), DeliveryError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn update(path: &str, value: impl Into<vss_forwarder::SignalValue>, secs: i64) -> SignalUpdate {
    SignalUpdate::new(path, value, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
}

pub fn reconnect(max_attempts: u32, max_elapsed: Option<Duration>) -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(2),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts,
        max_elapsed,
    }
}

pub fn client(
    broker: Arc<FakeBroker>,
    reconnect: ReconnectConfig,
    status: &Arc<RelayStatus>,
) -> SubscriptionClient {
    SubscriptionClient::new(
        broker,
        SubscriptionSettings {
            connect_timeout: Duration::from_secs(1),
            reconnect,
        },
        Arc::clone(status),
    )
}

pub struct Harness {
    pub engine: ForwarderEngine,
    pub status: Arc<RelayStatus>,
    pub shutdown: ShutdownSignal,
}

pub fn harness(
    broker: Arc<FakeBroker>,
    sink: Arc<dyn ForwardingSink>,
    filter: Option<&str>,
    reconnect: ReconnectConfig,
) -> Harness {
    let status = Arc::new(RelayStatus::new());
    let shutdown = ShutdownSignal::new();
    let config = EngineConfig {
        signal_filter: filter.map(str::to_string),
        delivery_timeout: Duration::from_millis(100),
        shutdown_grace: Duration::from_secs(1),
    };
    let engine = ForwarderEngine::new(
        client(broker, reconnect, &status),
        sink,
        config,
        shutdown.clone(),
        Arc::clone(&status),
    );
    Harness {
        engine,
        status,
        shutdown,
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
