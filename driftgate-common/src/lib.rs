//! Common utilities and types for `driftgate`

pub mod config;
pub mod constants;
pub mod error;

pub use config::{parse_duration, parse_listen_addr, ServerConfig, ServerConfigBuilder};
pub use constants::{
    DEFAULT_HEALTH_BIND, DEFAULT_IDLE_INTERVAL, DEFAULT_LISTEN_PORT, DEFAULT_MAX_LIFETIME,
};
pub use error::{Error, Result};
