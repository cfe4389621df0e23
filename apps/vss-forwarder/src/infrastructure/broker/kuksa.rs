//! Kuksa Databroker Adapter
//!
//! Implements the broker port over the `kuksa.val.v1` gRPC API. Each
//! connection owns its own channel; dropping the update stream cancels
//! the server-streaming call, which is how the broker sees an
//! unsubscribe.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use super::proto::{
    DataEntry, Field, SubscribeEntry, SubscribeRequest, SubscribeResponse, View, datapoint,
    val_client::ValClient,
};
use crate::application::ports::{BrokerConnection, BrokerConnector, BrokerError, UpdateStream};
use crate::domain::signal::{SignalUpdate, SignalValue};
use crate::infrastructure::config::BrokerSettings;

/// Connects to a Kuksa Databroker.
#[derive(Debug, Clone)]
pub struct KuksaConnector {
    endpoint: String,
    connect_timeout: Duration,
}

impl KuksaConnector {
    /// Create a connector from broker settings.
    #[must_use]
    pub fn new(settings: &BrokerSettings) -> Self {
        Self {
            endpoint: settings.endpoint(),
            connect_timeout: settings.connect_timeout,
        }
    }

    fn channel_endpoint(&self) -> Result<Endpoint, BrokerError> {
        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| BrokerError::Connect(describe(&e)))?
            .connect_timeout(self.connect_timeout)
            .tcp_nodelay(true);

        if self.endpoint.starts_with("https://") {
            endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| BrokerError::Connect(describe(&e)))
        } else {
            Ok(endpoint)
        }
    }
}

#[async_trait]
impl BrokerConnector for KuksaConnector {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let channel = self
            .channel_endpoint()?
            .connect()
            .await
            .map_err(|e| BrokerError::Connect(describe(&e)))?;

        tracing::debug!(endpoint = %self.endpoint, "Broker channel established");
        Ok(Box::new(KuksaConnection {
            client: Some(ValClient::new(channel)),
        }))
    }
}

/// A live channel to the Databroker.
#[derive(Debug)]
pub struct KuksaConnection {
    client: Option<ValClient<Channel>>,
}

#[async_trait]
impl BrokerConnection for KuksaConnection {
    async fn subscribe(&mut self, paths: &[String]) -> Result<UpdateStream, BrokerError> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| BrokerError::Subscribe("connection already closed".to_string()))?;

        let response = client
            .subscribe(subscribe_request(paths))
            .await
            .map_err(|status| BrokerError::Subscribe(status.message().to_string()))?;

        let stream = response.into_inner().map(|item| match item {
            Ok(response) => Ok(convert_response(response, Utc::now())),
            Err(status) => Err(BrokerError::Stream(format!(
                "{}: {}",
                status.code(),
                status.message()
            ))),
        });
        Ok(stream.boxed())
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

/// Build a current-value subscription for every path.
#[must_use]
pub fn subscribe_request(paths: &[String]) -> SubscribeRequest {
    SubscribeRequest {
        entries: paths
            .iter()
            .map(|path| SubscribeEntry {
                path: path.clone(),
                view: View::CurrentValue as i32,
                fields: vec![Field::Value as i32],
            })
            .collect(),
    }
}

/// Convert one notification into updates.
///
/// `received_at` stands in for data points the broker sent without a
/// timestamp.
#[must_use]
pub fn convert_response(response: SubscribeResponse, received_at: DateTime<Utc>) -> Vec<SignalUpdate> {
    response
        .updates
        .into_iter()
        .filter_map(|update| update.entry)
        .map(|entry| convert_entry(entry, received_at))
        .collect()
}

fn convert_entry(entry: DataEntry, received_at: DateTime<Utc>) -> SignalUpdate {
    let Some(point) = entry.value else {
        return SignalUpdate::not_available(entry.path, received_at);
    };

    let timestamp = point
        .timestamp
        .and_then(|ts| DateTime::from_timestamp(ts.seconds, u32::try_from(ts.nanos).ok()?))
        .unwrap_or(received_at);

    SignalUpdate::new(entry.path, convert_value(point.value), timestamp)
}

#[allow(clippy::cast_precision_loss)]
fn convert_value(value: Option<datapoint::Value>) -> SignalValue {
    use datapoint::Value;

    match value {
        Some(Value::String(v)) => SignalValue::Text(v),
        Some(Value::Bool(v)) => SignalValue::Boolean(v),
        Some(Value::Int32(v)) => SignalValue::Number(f64::from(v)),
        Some(Value::Int64(v)) => SignalValue::Number(v as f64),
        Some(Value::Uint32(v)) => SignalValue::Number(f64::from(v)),
        Some(Value::Uint64(v)) => SignalValue::Number(v as f64),
        Some(Value::Float(v)) => SignalValue::Number(f64::from(v)),
        Some(Value::Double(v)) => SignalValue::Number(v),
        None => SignalValue::NotAvailable,
    }
}

/// Render an error with its source chain.
fn describe(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
