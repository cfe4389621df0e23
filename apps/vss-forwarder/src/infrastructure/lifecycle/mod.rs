//! Lifecycle Controller
//!
//! Translates OS termination signals into the shared [`ShutdownSignal`].
//! The first request performs the transition; repeats are logged at debug
//! level and otherwise ignored, so a second Ctrl-C during the drain does
//! not interrupt it.

use crate::application::services::ShutdownSignal;

/// Watches for termination requests.
#[derive(Debug, Clone)]
pub struct LifecycleController {
    shutdown: ShutdownSignal,
}

impl LifecycleController {
    /// Create a controller that triggers `shutdown`.
    #[must_use]
    pub const fn new(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }

    /// Request shutdown for `reason`.
    ///
    /// Returns `true` if this request stopped the relay.
    pub fn request_shutdown(&self, reason: &str) -> bool {
        if self.shutdown.trigger() {
            tracing::info!(reason, "Shutdown requested, stopping relay");
            true
        } else {
            tracing::debug!(reason, "Shutdown already in progress");
            false
        }
    }

    /// Listen for SIGINT, SIGTERM and SIGQUIT until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be installed.
    #[cfg(unix)]
    pub async fn run(self) -> std::io::Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut quit = signal(SignalKind::quit())?;

        loop {
            let reason = tokio::select! {
                Some(()) = interrupt.recv() => "SIGINT",
                Some(()) = terminate.recv() => "SIGTERM",
                Some(()) = quit.recv() => "SIGQUIT",
                else => return Ok(()),
            };
            self.request_shutdown(reason);
        }
    }

    /// Listen for Ctrl-C until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the Ctrl-C handler cannot be installed.
    #[cfg(not(unix))]
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            tokio::signal::ctrl_c().await?;
            self.request_shutdown("Ctrl-C");
        }
    }
}
