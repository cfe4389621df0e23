//! Reconnection Policy
//!
//! Exponential backoff with jitter for re-establishing the broker
//! subscription. The retry budget is bounded by an attempt count, an
//! elapsed-time limit, or both; an unbounded policy cannot be built from
//! configuration.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = no attempt limit).
    pub max_attempts: u32,
    /// Maximum time spent reconnecting after a disconnect (`None` = no time limit).
    pub max_elapsed: Option<Duration>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
            max_elapsed: Some(Duration::from_secs(300)),
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `ReconnectSettings`.
    #[must_use]
    pub const fn from_settings(settings: &crate::ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.max_attempts,
            max_elapsed: settings.max_elapsed,
        }
    }

    /// Disable jitter, making delays deterministic.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter_factor = 0.0;
        self
    }

    /// Check whether the budget is bounded by attempts or elapsed time.
    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.max_attempts > 0 || self.max_elapsed.is_some()
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
///
/// # Example
///
/// ```rust
/// use vss_forwarder::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// // Get delay for first attempt
/// let delay1 = policy.next_delay();
/// assert!(delay1.is_some());
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
    started_at: Option<Instant>,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
            started_at: None,
        }
    }

    /// Get the next delay duration, applying exponential backoff with jitter.
    ///
    /// The elapsed-time budget starts with the first call after a reset.
    /// Returns `None` once the attempt or elapsed-time budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        let started_at = *self.started_at.get_or_insert_with(Instant::now);

        if !self.should_retry() {
            return None;
        }
        let remaining = match self.config.max_elapsed {
            Some(max_elapsed) => match max_elapsed.checked_sub(started_at.elapsed()) {
                Some(remaining) if !remaining.is_zero() => Some(remaining),
                _ => return None,
            },
            None => None,
        };

        self.attempt_count += 1;

        // Calculate delay with jitter, never sleeping past the elapsed budget
        let mut delay_with_jitter = self.apply_jitter(self.current_delay);
        if let Some(remaining) = remaining {
            delay_with_jitter = delay_with_jitter.min(remaining);
        }

        // Calculate next delay (for subsequent calls)
        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay_with_jitter)
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
        self.started_at = None;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Time spent since the first delay after the last reset.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.map_or(Duration::ZERO, |start| start.elapsed())
    }

    /// Unspent elapsed-time budget, `None` when no time limit is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.config
            .max_elapsed
            .map(|max_elapsed| max_elapsed.saturating_sub(self.elapsed()))
    }

    /// Check if the attempt budget allows another try.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
