//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the forwarding engine, the subscription client and
//! the port interfaces that define how they interact with the broker and
//! the downstream sinks.

/// Port interfaces for external systems (broker, sinks).
pub mod ports;

/// Application services: subscription, reconnect policy, forwarding.
pub mod services;
