//! Vehicle Signal Types
//!
//! Canonical internal representation of a signal update received from the
//! Databroker. These types are transport-agnostic: the Kuksa adapter maps
//! its protobuf data points onto them and every sink consumes them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A signal path such as `Vehicle.Speed`.
pub type SignalPath = String;

// =============================================================================
// Signal Value
// =============================================================================

/// The value carried by a signal update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SignalValue {
    /// Any numeric encoding (integer or floating point).
    Number(f64),
    /// A string value.
    Text(String),
    /// A boolean value.
    Boolean(bool),
    /// The broker has no (or no representable) value for the signal.
    NotAvailable,
}

impl SignalValue {
    /// Check whether the value is the "not available" sentinel.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        !matches!(self, Self::NotAvailable)
    }

    /// Short name of the value kind, used as a log and metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Boolean(_) => "boolean",
            Self::NotAvailable => "not_available",
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::NotAvailable => f.write_str("<not available>"),
        }
    }
}

impl From<f64> for SignalValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SignalValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for SignalValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// =============================================================================
// Signal Update
// =============================================================================

/// One update event for a single signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalUpdate {
    /// Signal path.
    pub path: SignalPath,
    /// Current value.
    pub value: SignalValue,
    /// Timestamp assigned by the upstream source.
    pub timestamp: DateTime<Utc>,
}

impl SignalUpdate {
    /// Create a new signal update.
    #[must_use]
    pub fn new(
        path: impl Into<SignalPath>,
        value: impl Into<SignalValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// Create an update for a signal without a value.
    #[must_use]
    pub fn not_available(path: impl Into<SignalPath>, timestamp: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            value: SignalValue::NotAvailable,
            timestamp,
        }
    }
}

impl fmt::Display for SignalUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {} @ {}",
            self.path,
            self.value,
            self.timestamp.to_rfc3339()
        )
    }
}
