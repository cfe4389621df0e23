//! VSS Forwarder Binary
//!
//! Starts the vehicle signal relay.
//!
//! # Usage
//!
//! ```bash
//! SIGNAL_FILTER="Vehicle.Speed,Vehicle.Body.Hood.IsOpen" cargo run --bin vss-forwarder
//! ```
//!
//! # Environment Variables
//!
//! ## Broker
//! - `KUKSA_DATA_BROKER_ADDR`: Broker host, scheme optional (default: 127.0.0.1)
//! - `KUKSA_DATA_BROKER_PORT`: Broker port (default: 55555)
//! - `SIGNAL_FILTER`: Comma separated signal paths (default: empty)
//!
//! ## InfluxDB (updates are logged when unset)
//! - `INFLUXDB_URI`: Base URI
//! - `INFLUXDB_TOKEN` or `INFLUXDB_TOKEN_FILE`: API token
//! - `INFLUXDB_ORG`: Organization (default: sdv)
//! - `INFLUXDB_BUCKET`: Bucket (default: demo)
//!
//! ## Relay
//! - `VSS_FORWARDER_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `VSS_FORWARDER_MAX_RECONNECT_ATTEMPTS`: Reconnect attempt bound (default: 10)
//! - `VSS_FORWARDER_SHUTDOWN_GRACE_SECS`: Drain bound (default: 5)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use vss_forwarder::infrastructure::{sink, telemetry};
use vss_forwarder::{
    EngineConfig, ForwarderConfig, ForwarderEngine, HealthServer, HealthServerState,
    KuksaConnector, LifecycleController, ReconnectConfig, RelayStatus, ShutdownSignal,
    SubscriptionClient, SubscriptionSettings, init_metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Fails only when a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting VSS forwarder");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = ForwarderConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
    })?;
    log_config(&config);

    let shutdown = ShutdownSignal::new();
    let status = Arc::new(RelayStatus::new());

    // Signal handling
    let lifecycle = LifecycleController::new(shutdown.clone());
    tokio::spawn(async move {
        if let Err(e) = lifecycle.run().await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    // Health server
    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&status),
        ));
        let health_server =
            HealthServer::new(config.server.health_port, health_state, shutdown.token());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let sink = sink::from_settings(&config.sink, config.engine.delivery_timeout)
        .context("failed to build forwarding sink")?;

    let connector = Arc::new(KuksaConnector::new(&config.broker));
    let client = SubscriptionClient::new(
        connector,
        SubscriptionSettings {
            connect_timeout: config.broker.connect_timeout,
            reconnect: ReconnectConfig::from_settings(&config.reconnect),
        },
        Arc::clone(&status),
    );

    let engine = ForwarderEngine::new(
        client,
        sink,
        EngineConfig::from_settings(&config.engine),
        shutdown.clone(),
        status,
    );

    let result = engine.run().await;

    // Stops the health server when the engine exits on its own.
    shutdown.trigger();

    match result {
        Ok(report) => {
            tracing::info!(
                forwarded = report.forwarded(),
                failed = report.failed,
                drained = report.drained,
                "VSS forwarder stopped"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "VSS forwarder failed");
            Err(e.into())
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ForwarderConfig) {
    tracing::info!(
        broker = %config.broker.endpoint(),
        sink = if config.sink.influx.is_some() { "influxdb" } else { "log" },
        health_port = config.server.health_port,
        max_reconnect_attempts = config.reconnect.max_attempts,
        "Configuration loaded"
    );
    tracing::debug!(
        delivery_timeout = ?config.engine.delivery_timeout,
        shutdown_grace_secs = config.engine.shutdown_grace.as_secs(),
        max_reconnect_elapsed_secs = config.reconnect.max_elapsed.map(|d| d.as_secs()),
        "Engine settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
