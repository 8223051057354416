//! The shutdown flag.
//!
//! [`ShutdownController`] is the single source of truth for "stop accepting
//! new work". It flips from accepting to shutting down exactly once and never
//! back. The first [`ShutdownReason`] to arrive wins; later requests from the
//! other triggers are no-ops.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// What asked the server to stop accepting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Interrupt/terminate signal or an explicit shutdown call
    Operator,
    /// The configured maximum lifetime elapsed
    MaxLifetime,
    /// The idle watchdog sampled zero active connections
    IdleTimeout,
}

impl ShutdownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownReason::Operator => "operator",
            ShutdownReason::MaxLifetime => "max_lifetime",
            ShutdownReason::IdleTimeout => "idle_timeout",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, monotonic shutdown flag.
///
/// Reads take the read side of the channel's lock and never block each other;
/// the one transition takes the write side. Clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    state: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state: Arc::new(state),
        }
    }

    /// Record the intent to shut down.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        let flipped = self.state.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });

        if flipped {
            crate::metrics::shutdown_requested(reason);
        }

        flipped
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// The trigger that won, once shutting down.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.state.borrow()
    }

    /// Run `f` only while still accepting.
    ///
    /// The flag stays read-locked for the duration of `f`, so a concurrent
    /// [`request_shutdown`](Self::request_shutdown) is ordered either entirely
    /// before this call (and `f` does not run) or entirely after it.
    /// Keep `f` short and non-blocking.
    pub fn admit<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let state = self.state.borrow();
        if state.is_some() {
            return None;
        }
        let admitted = f();
        drop(state);
        Some(admitted)
    }

    /// Resolve once shutdown has been requested, immediately if it already was.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.state.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ShutdownReason::Operator),
            // The sender lives in `self`, so the channel cannot close while we wait.
            Err(_) => ShutdownReason::Operator,
        };
        reason
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
