//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Kuksa Databroker gRPC adapter.
pub mod broker;

/// Forwarding sink adapters (InfluxDB, log, fan-out).
pub mod sink;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// OS signal handling and shutdown coordination.
pub mod lifecycle;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
