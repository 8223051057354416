//! Error types for `driftgate`

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Main error type for driftgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The listening socket could not be created
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connections were still active when a bounded drain expired
    #[error("drain timed out after {elapsed:?} with {active} connection(s) still active")]
    DrainTimeout { elapsed: Duration, active: usize },

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
