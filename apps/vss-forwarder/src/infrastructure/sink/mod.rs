//! Forwarding Sink Adapters
//!
//! - [`InfluxSink`]: InfluxDB v2 write API
//! - [`LogSink`]: logs updates when no destination is configured
//! - [`SinkSet`]: fan-out to several sinks

pub mod fanout;
pub mod influx;
pub mod log;

use std::sync::Arc;
use std::time::Duration;

pub use fanout::SinkSet;
pub use influx::InfluxSink;
pub use log::LogSink;

use crate::application::ports::ForwardingSink;
use crate::infrastructure::config::SinkSettings;

/// Build the sink described by the settings.
///
/// Without an InfluxDB destination the relay logs updates. With one, it
/// writes to InfluxDB and optionally also logs.
///
/// # Errors
///
/// Returns an error if the InfluxDB HTTP client cannot be built.
pub fn from_settings(
    settings: &SinkSettings,
    timeout: Duration,
) -> Result<Arc<dyn ForwardingSink>, reqwest::Error> {
    let Some(influx) = &settings.influx else {
        tracing::info!("No InfluxDB destination configured, updates will be logged");
        return Ok(Arc::new(LogSink::new()));
    };

    tracing::info!(uri = %influx.uri, org = %influx.org, bucket = %influx.bucket, "Forwarding to InfluxDB");
    let influx_sink: Arc<dyn ForwardingSink> = Arc::new(InfluxSink::new(influx, timeout)?);
    if settings.log_updates {
        Ok(Arc::new(
            SinkSet::new().with(Arc::new(LogSink::new())).with(influx_sink),
        ))
    } else {
        Ok(influx_sink)
    }
}
