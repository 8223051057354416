//! Default ports, addresses and timers for driftgate.
//!
//! Use these constants instead of magic numbers so defaults stay consistent
//! between the library, the CLI, and the tests.

use std::time::Duration;

/// Default port for the stream listener.
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

/// Default bind address for the health endpoint (`0.0.0.0:8081`).
pub const DEFAULT_HEALTH_BIND: &str = "0.0.0.0:8081";

/// Maximum time a server instance accepts new connections (6 hours).
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(6 * 60 * 60);

/// Interval at which the idle watchdog samples the connection count (15 minutes).
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(15 * 60);
