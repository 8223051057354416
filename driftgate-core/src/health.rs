//! Read-only health view of a running server.
//!
//! Healthy while accepting; unhealthy as soon as shutdown has been requested,
//! so load balancers stop routing new clients here while the drain runs.

use crate::shutdown::{ShutdownController, ShutdownReason};
use crate::tracker::ConnectionTracker;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Where the server is in its lifecycle. Derived from the shutdown flag, the
/// listener and the connection count; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Flag unset, listener open
    Accepting,
    /// Flag set; listener may still be open, connections may be active
    Draining,
    /// Listener closed and no connection active
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Snapshot returned by [`HealthReporter::report`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ShutdownReason>,
    pub active_connections: usize,
    pub uptime_secs: u64,
    pub version: &'static str,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Cheap to clone; every clone observes the same server.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    shutdown: ShutdownController,
    tracker: ConnectionTracker,
    listener_closed: Arc<AtomicBool>,
    started_at: Instant,
}

impl HealthReporter {
    pub(crate) fn new(
        shutdown: ShutdownController,
        tracker: ConnectionTracker,
        listener_closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shutdown,
            tracker,
            listener_closed,
            started_at: Instant::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.shutdown.is_shutting_down()
    }

    pub fn state(&self) -> LifecycleState {
        if !self.shutdown.is_shutting_down() {
            LifecycleState::Accepting
        } else if self.listener_closed.load(Ordering::SeqCst) && !self.tracker.has_active() {
            LifecycleState::Stopped
        } else {
            LifecycleState::Draining
        }
    }

    pub fn report(&self) -> HealthReport {
        let reason = self.shutdown.reason();
        HealthReport {
            status: if reason.is_none() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            state: self.state(),
            reason,
            active_connections: self.tracker.active(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}
