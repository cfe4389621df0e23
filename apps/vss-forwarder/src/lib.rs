#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! VSS Forwarder - Vehicle Signal Relay
//!
//! Subscribes to a configured set of vehicle signals on a Kuksa Databroker
//! and forwards every update to a sink (InfluxDB, or the log when no
//! destination is configured). Lost connections are re-established with
//! bounded backoff; termination signals drain the sink and exit cleanly.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Signal values and the signal filter
//!   - `signal`: Signal updates and values
//!   - `filter`: Set of subscribed signal paths
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Broker connection and forwarding sink interfaces
//!   - `services`: Subscription, forwarding engine, reconnect policy,
//!     shutdown signal, relay status
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broker`: Kuksa Databroker gRPC client
//!   - `sink`: InfluxDB, log and fan-out sinks
//!   - `config`: Environment configuration
//!   - `lifecycle`: OS signal handling
//!   - `health`: Health check and metrics HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Databroker ──► SubscriptionClient ──► ForwarderEngine ──► ForwardingSink
//!                      ▲                      ▲
//!                      └──── ShutdownSignal ◄─┴── LifecycleController
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Signal types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::filter::{ConfigWarning, FilterSpec, SignalMatcher};
pub use domain::signal::{SignalPath, SignalUpdate, SignalValue};

// Ports
pub use application::ports::{
    Ack, BrokerConnection, BrokerConnector, BrokerError, DeliveryError, ForwardingSink,
    UpdateStream,
};

// Services
pub use application::services::{
    EngineConfig, EngineError, ForwardReport, ForwarderEngine, ReconnectConfig, ReconnectPolicy,
    RelayStatus, RelayStatusSnapshot, ShutdownSignal, Subscription, SubscriptionClient,
    SubscriptionError, SubscriptionSettings, SubscriptionState,
};

// Infrastructure config
pub use infrastructure::config::{
    BrokerSettings, ConfigError, EngineSettings, ForwarderConfig, InfluxSettings, InfluxToken,
    ReconnectSettings, ServerSettings, SinkSettings,
};

// Adapters
pub use infrastructure::broker::KuksaConnector;
pub use infrastructure::lifecycle::LifecycleController;
pub use infrastructure::sink::{InfluxSink, LogSink, SinkSet};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
