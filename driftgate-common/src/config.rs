//! Configuration types for a driftgate server.
//!
//! Every timer is per-instance configuration; nothing here is process-global,
//! so several servers with different lifetimes can run side by side (tests do).

use crate::constants::{DEFAULT_IDLE_INTERVAL, DEFAULT_LISTEN_PORT, DEFAULT_MAX_LIFETIME};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Configuration for the stream listener and its shutdown watchdogs.
///
/// Use [`ServerConfig::builder()`] for ergonomic construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the stream listener binds to
    pub listen_addr: SocketAddr,

    /// Time after start at which the server stops accepting new connections
    pub max_lifetime: Duration,

    /// Sampling period of the idle watchdog
    pub idle_interval: Duration,

    /// Set `TCP_NODELAY` on accepted streams
    pub nodelay: bool,
}

impl ServerConfig {
    /// Create a new config builder.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// Zero durations are rejected: a zero idle interval cannot drive a
    /// periodic timer and a zero lifetime would refuse every connection.
    pub fn validate(&self) -> Result<()> {
        if self.max_lifetime.is_zero() {
            return Err(Error::Config("max_lifetime must be greater than zero".into()));
        }
        if self.idle_interval.is_zero() {
            return Err(Error::Config("idle_interval must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_LISTEN_PORT).into(),
            max_lifetime: DEFAULT_MAX_LIFETIME,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            nodelay: true,
        }
    }
}

/// Builder for constructing a [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address.
    ///
    /// Default: `0.0.0.0:8080`
    #[must_use]
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.config.listen_addr = addr;
        self
    }

    /// Set the maximum server lifetime.
    ///
    /// Default: 6 hours
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_lifetime = lifetime;
        self
    }

    /// Set the idle sampling interval.
    ///
    /// Default: 15 minutes
    #[must_use]
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config.idle_interval = interval;
        self
    }

    /// Enable or disable `TCP_NODELAY` on accepted streams.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Parse a listen address.
///
/// Accepts a bare port (`8080`), a port with a leading colon (`:8080`), both
/// bound on all interfaces, or a full `host:port`.
pub fn parse_listen_addr(input: &str) -> Result<SocketAddr> {
    let input = input.trim();
    let port_only = input.strip_prefix(':').unwrap_or(input);
    if let Ok(port) = port_only.parse::<u16>() {
        return Ok(([0, 0, 0, 0], port).into());
    }
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    input
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("invalid listen address {input:?}: {e}")))?
        .next()
        .ok_or_else(|| Error::Config(format!("listen address {input:?} resolved to nothing")))
}

/// Parse a human readable duration such as `6h`, `15m` or `250ms`.
pub fn parse_duration(input: &str) -> Result<Duration> {
    humantime::parse_duration(input.trim())
        .map_err(|e| Error::Config(format!("invalid duration {input:?}: {e}")))
}
