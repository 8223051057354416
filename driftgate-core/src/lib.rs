pub mod handler;
pub mod health;
mod metrics;
pub mod server;
pub mod shutdown;
pub mod tracker;
pub mod watchdog;

// Re-export specific items for convenience
pub use handler::{ConnectionHandler, EchoHandler, SinkHandler};
pub use health::{HealthReport, HealthReporter, HealthStatus, LifecycleState};
pub use server::{Server, ServerHandle};
pub use shutdown::{ShutdownController, ShutdownReason};
pub use tracker::{ConnectionGuard, ConnectionTracker};
