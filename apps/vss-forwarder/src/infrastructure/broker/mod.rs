//! Broker Adapters
//!
//! The Kuksa Databroker implementation of the broker port.

pub mod kuksa;
pub mod proto;

pub use kuksa::{KuksaConnection, KuksaConnector};
