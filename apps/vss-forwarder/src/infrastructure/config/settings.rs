//! Forwarder Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.
//! Empty variables are treated as unset.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Broker host, optionally with an `http://` or `https://` scheme.
    pub address: String,
    /// Broker port.
    pub port: u16,
    /// Bound on one connect and subscribe handshake.
    pub connect_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 55555,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl BrokerSettings {
    /// Endpoint URI for the gRPC channel. Plain hosts default to `http`.
    #[must_use]
    pub fn endpoint(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{address}:{}", self.port)
        } else {
            format!("http://{address}:{}", self.port)
        }
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Initial reconnection delay.
    pub delay_initial: Duration,
    /// Maximum reconnection delay.
    pub delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub delay_multiplier: f64,
    /// Maximum reconnection attempts (0 = only the elapsed bound applies).
    pub max_attempts: u32,
    /// Maximum time spent reconnecting (`None` = only the attempt bound applies).
    pub max_elapsed: Option<Duration>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(500),
            delay_max: Duration::from_secs(30),
            delay_multiplier: 2.0,
            max_attempts: 10,
            max_elapsed: Some(Duration::from_secs(300)),
        }
    }
}

/// InfluxDB API token.
#[derive(Clone, PartialEq, Eq)]
pub struct InfluxToken(String);

impl InfluxToken {
    /// Wrap a token.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Get the token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InfluxToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// InfluxDB destination settings.
#[derive(Debug, Clone)]
pub struct InfluxSettings {
    /// Base URI, e.g. `http://influxdb:8086`.
    pub uri: String,
    /// API token.
    pub token: InfluxToken,
    /// Organization.
    pub org: String,
    /// Bucket.
    pub bucket: String,
    /// Lines buffered before a write.
    pub batch_size: usize,
}

/// Sink selection.
#[derive(Debug, Clone, Default)]
pub struct SinkSettings {
    /// InfluxDB destination, `None` when not configured.
    pub influx: Option<InfluxSettings>,
    /// Also log every update when a destination is configured.
    pub log_updates: bool,
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Raw `SIGNAL_FILTER` value.
    pub signal_filter: Option<String>,
    /// Bound on a single delivery.
    pub delivery_timeout: Duration,
    /// Bound on draining at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            signal_filter: None,
            delivery_timeout: Duration::from_millis(2000),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default)]
pub struct ForwarderConfig {
    /// Broker connection.
    pub broker: BrokerSettings,
    /// Reconnect backoff.
    pub reconnect: ReconnectSettings,
    /// Sink selection.
    pub sink: SinkSettings,
    /// Engine settings.
    pub engine: EngineSettings,
    /// Server ports.
    pub server: ServerSettings,
}

impl ForwarderConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed, the reconnect budget is
    /// unbounded, or the InfluxDB token cannot be resolved.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key/value source.
    ///
    /// # Errors
    ///
    /// See [`ForwarderConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let broker = BrokerSettings {
            address: env
                .get("KUKSA_DATA_BROKER_ADDR")
                .unwrap_or_else(|| BrokerSettings::default().address),
            port: env.parse("KUKSA_DATA_BROKER_PORT", BrokerSettings::default().port)?,
            connect_timeout: env.secs(
                "VSS_FORWARDER_CONNECT_TIMEOUT_SECS",
                BrokerSettings::default().connect_timeout,
            )?,
        };

        let defaults = ReconnectSettings::default();
        let max_elapsed_secs: u64 = env.parse(
            "VSS_FORWARDER_MAX_RECONNECT_ELAPSED_SECS",
            defaults.max_elapsed.map_or(0, |d| d.as_secs()),
        )?;
        let reconnect = ReconnectSettings {
            delay_initial: env.millis(
                "VSS_FORWARDER_RECONNECT_DELAY_INITIAL_MS",
                defaults.delay_initial,
            )?,
            delay_max: env.secs("VSS_FORWARDER_RECONNECT_DELAY_MAX_SECS", defaults.delay_max)?,
            delay_multiplier: env.parse(
                "VSS_FORWARDER_RECONNECT_DELAY_MULTIPLIER",
                defaults.delay_multiplier,
            )?,
            max_attempts: env.parse("VSS_FORWARDER_MAX_RECONNECT_ATTEMPTS", defaults.max_attempts)?,
            max_elapsed: (max_elapsed_secs > 0).then(|| Duration::from_secs(max_elapsed_secs)),
        };
        if reconnect.max_attempts == 0 && reconnect.max_elapsed.is_none() {
            return Err(ConfigError::UnboundedReconnect);
        }
        if !(reconnect.delay_multiplier.is_finite() && reconnect.delay_multiplier >= 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "VSS_FORWARDER_RECONNECT_DELAY_MULTIPLIER".to_string(),
                value: reconnect.delay_multiplier.to_string(),
            });
        }

        let sink = SinkSettings {
            influx: influx_settings(&env)?,
            log_updates: env.flag("VSS_FORWARDER_LOG_UPDATES")?,
        };

        let engine = EngineSettings {
            signal_filter: env.get("SIGNAL_FILTER"),
            delivery_timeout: env.millis(
                "VSS_FORWARDER_DELIVERY_TIMEOUT_MS",
                EngineSettings::default().delivery_timeout,
            )?,
            shutdown_grace: env.secs(
                "VSS_FORWARDER_SHUTDOWN_GRACE_SECS",
                EngineSettings::default().shutdown_grace,
            )?,
        };

        let server = ServerSettings {
            health_port: env.parse(
                "VSS_FORWARDER_HEALTH_PORT",
                ServerSettings::default().health_port,
            )?,
        };

        Ok(Self {
            broker,
            reconnect,
            sink,
            engine,
            server,
        })
    }
}

fn influx_settings<F>(env: &Env<F>) -> Result<Option<InfluxSettings>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Token settings are only looked at once a destination is configured.
    let Some(uri) = env.get("INFLUXDB_URI") else {
        return Ok(None);
    };
    let token = match (env.get("INFLUXDB_TOKEN"), env.get("INFLUXDB_TOKEN_FILE")) {
        (Some(_), Some(_)) => return Err(ConfigError::ConflictingToken),
        (Some(token), None) => Some(token),
        (None, Some(path)) => Some(read_token_file(PathBuf::from(path))?),
        (None, None) => None,
    };
    let Some(token) = token else {
        tracing::warn!(uri = %uri, "INFLUXDB_URI is set without a token, updates will only be logged");
        return Ok(None);
    };

    let batch_size: usize = env.parse("INFLUXDB_BATCH_SIZE", 1)?;
    Ok(Some(InfluxSettings {
        uri: uri.trim_end_matches('/').to_string(),
        token: InfluxToken::new(token),
        org: env.get("INFLUXDB_ORG").unwrap_or_else(|| "sdv".to_string()),
        bucket: env.get("INFLUXDB_BUCKET").unwrap_or_else(|| "demo".to_string()),
        batch_size: batch_size.max(1),
    }))
}

fn read_token_file(path: PathBuf) -> Result<String, ConfigError> {
    let token = std::fs::read_to_string(&path)
        .map_err(|source| ConfigError::TokenFile { path: path.clone(), source })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::EmptyValue(path.display().to_string()));
    }
    Ok(token.to_string())
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has a value that cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A value is present but empty.
    #[error("{0} cannot be empty")]
    EmptyValue(String),
    /// Neither an attempt nor an elapsed-time reconnect bound is set.
    #[error(
        "reconnect budget is unbounded: set VSS_FORWARDER_MAX_RECONNECT_ATTEMPTS or VSS_FORWARDER_MAX_RECONNECT_ELAPSED_SECS"
    )]
    UnboundedReconnect,
    /// Both `INFLUXDB_TOKEN` and `INFLUXDB_TOKEN_FILE` are set.
    #[error("INFLUXDB_TOKEN and INFLUXDB_TOKEN_FILE are mutually exclusive")]
    ConflictingToken,
    /// The token file cannot be read.
    #[error("failed to read token file {}: {source}", path.display())]
    TokenFile {
        /// Token file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.get(key).map_or(Ok(default), |value| {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
        })
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_secs()).map(Duration::from_secs)
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default).map(Duration::from_millis)
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        match self.get(key).map(|v| v.to_lowercase()).as_deref() {
            None | Some("false" | "0" | "no") => Ok(false),
            Some("true" | "1" | "yes") => Ok(true),
            Some(other) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: other.to_string(),
            }),
        }
    }
}
