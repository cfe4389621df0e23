//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`SubscriptionClient`]: opens and maintains the broker subscription
//! - [`ForwarderEngine`]: pumps updates from the subscription into a sink
//! - [`ReconnectPolicy`]: bounded exponential backoff
//! - [`ShutdownSignal`]: injected one-way stop request
//! - [`RelayStatus`]: shared counters and state for health reporting

pub mod forwarder;
pub mod reconnect;
pub mod shutdown;
pub mod status;
pub mod subscription;

pub use forwarder::{EngineConfig, EngineError, ForwardReport, ForwarderEngine};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use shutdown::ShutdownSignal;
pub use status::{RelayStatus, RelayStatusSnapshot, SubscriptionState};
pub use subscription::{Subscription, SubscriptionClient, SubscriptionError, SubscriptionSettings};
