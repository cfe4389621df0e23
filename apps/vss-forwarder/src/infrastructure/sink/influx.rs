//! InfluxDB v2 Sink
//!
//! Writes updates to the InfluxDB v2 write API as line protocol. One line
//! per update: the signal path is the measurement, the value goes into the
//! `value` field, and the broker timestamp is written with nanosecond
//! precision. Updates without a value are skipped.
//!
//! Buffered lines leave the buffer only once a write succeeds. A failed or
//! cancelled write keeps them for the next attempt, up to
//! [`RETAINED_BATCHES`] batches; older lines beyond that are dropped.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;

use crate::application::ports::{Ack, DeliveryError, ForwardingSink};
use crate::domain::signal::{SignalUpdate, SignalValue};
use crate::infrastructure::config::{InfluxSettings, InfluxToken};

/// Batches kept in the buffer while the destination is failing.
pub const RETAINED_BATCHES: usize = 10;

/// Forwards updates to InfluxDB.
#[derive(Debug)]
pub struct InfluxSink {
    client: Client,
    write_url: String,
    org: String,
    bucket: String,
    token: InfluxToken,
    batch_size: usize,
    buffer: Mutex<Vec<String>>,
}

impl InfluxSink {
    /// Create a sink whose HTTP requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &InfluxSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            write_url: format!("{}/api/v2/write", settings.uri),
            org: settings.org.clone(),
            bucket: settings.bucket.clone(),
            token: settings.token.clone(),
            batch_size: settings.batch_size.max(1),
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Number of lines waiting for the next write.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Write a copy of the buffer head, then release the written lines.
    async fn write_buffered(&self, batch: Vec<String>) -> Result<(), DeliveryError> {
        let count = batch.len();
        let result = self.write(batch).await;

        let mut buffer = self.buffer.lock();
        match &result {
            Ok(()) => {
                let written = count.min(buffer.len());
                buffer.drain(..written);
            }
            Err(e) => {
                let limit = self.batch_size.saturating_mul(RETAINED_BATCHES);
                if buffer.len() > limit {
                    let dropped = buffer.len() - limit;
                    buffer.drain(..dropped);
                    tracing::warn!(
                        dropped,
                        retained = limit,
                        error = %e,
                        "InfluxDB write failed, dropped oldest buffered lines"
                    );
                } else {
                    tracing::debug!(retained = buffer.len(), error = %e, "InfluxDB write failed, keeping lines");
                }
            }
        }
        result
    }

    async fn write(&self, lines: Vec<String>) -> Result<(), DeliveryError> {
        let count = lines.len();
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token.expose()))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(lines.join("\n"))
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(lines = count, "Wrote batch to InfluxDB");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ForwardingSink for InfluxSink {
    fn name(&self) -> &'static str {
        "influxdb"
    }

    async fn deliver(&self, update: SignalUpdate) -> Result<Ack, DeliveryError> {
        let Some(line) = encode_line(&update)? else {
            tracing::debug!(path = %update.path, "Skipping update without value");
            return Ok(Ack::Skipped);
        };

        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(line);
            if buffer.len() < self.batch_size {
                return Ok(Ack::Buffered);
            }
            buffer.clone()
        };

        self.write_buffered(batch).await.map(|()| Ack::Delivered)
    }

    async fn flush(&self) -> Result<(), DeliveryError> {
        let batch = self.buffer.lock().clone();
        if batch.is_empty() {
            return Ok(());
        }
        self.write_buffered(batch).await
    }
}

/// Encode an update as one line of line protocol.
///
/// Returns `Ok(None)` for updates without a value.
///
/// # Errors
///
/// Returns [`DeliveryError::Encoding`] for non-finite numbers and
/// timestamps outside the nanosecond range.
pub fn encode_line(update: &SignalUpdate) -> Result<Option<String>, DeliveryError> {
    let field = match &update.value {
        SignalValue::NotAvailable => return Ok(None),
        SignalValue::Number(v) if !v.is_finite() => {
            return Err(DeliveryError::Encoding(format!(
                "{} has non-finite value {v}",
                update.path
            )));
        }
        SignalValue::Number(v) => v.to_string(),
        SignalValue::Boolean(v) => v.to_string(),
        SignalValue::Text(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
    };

    let nanos = update.timestamp.timestamp_nanos_opt().ok_or_else(|| {
        DeliveryError::Encoding(format!(
            "{} has out of range timestamp {}",
            update.path, update.timestamp
        ))
    })?;

    let mut line = String::with_capacity(update.path.len() + field.len() + 32);
    for c in update.path.chars() {
        if matches!(c, ',' | ' ') {
            line.push('\\');
        }
        line.push(c);
    }
    let _ = write!(line, " value={field} {nanos}");
    Ok(Some(line))
}
