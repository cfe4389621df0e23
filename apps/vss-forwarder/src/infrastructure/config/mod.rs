//! Configuration Module
//!
//! Configuration loading for the relay.

mod settings;

pub use settings::{
    BrokerSettings, ConfigError, EngineSettings, ForwarderConfig, InfluxSettings, InfluxToken,
    ReconnectSettings, ServerSettings, SinkSettings,
};
