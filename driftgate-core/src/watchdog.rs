//! Timer tasks that request shutdown.
//!
//! A watchdog only records intent through the [`ShutdownController`]; it
//! never closes the listener or waits for drain. Both watchdogs exit when
//! their `stop` token is cancelled, which the server does once it reaches
//! `Stopped`.

use crate::shutdown::{ShutdownController, ShutdownReason};
use crate::tracker::ConnectionTracker;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Request shutdown once `lifetime` has elapsed.
pub fn spawn_lifetime_watchdog(
    lifetime: Duration,
    shutdown: ShutdownController,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = stop.cancelled() => {
                debug!("lifetime watchdog stopped");
            }
            () = tokio::time::sleep(lifetime) => {
                if shutdown.request_shutdown(ShutdownReason::MaxLifetime) {
                    info!(
                        max_lifetime_secs = lifetime.as_secs(),
                        "max lifetime reached, no longer accepting connections"
                    );
                }
            }
        }
    })
}

/// Every `period`, request shutdown if no connection is active at that instant.
///
/// The first sample is taken one full period after start.
pub fn spawn_idle_watchdog(
    period: Duration,
    shutdown: ShutdownController,
    tracker: ConnectionTracker,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = stop.cancelled() => {
                    debug!("idle watchdog stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if shutdown.is_shutting_down() {
                continue;
            }
            if !tracker.has_active()
                && shutdown.request_shutdown(ShutdownReason::IdleTimeout)
            {
                info!(
                    idle_interval_secs = period.as_secs(),
                    "no active connections at idle check, no longer accepting connections"
                );
            }
        }
    })
}
