pub mod metrics;
pub mod tracing;

pub use metrics::{gather_metrics, init_metrics, metrics_enabled, REGISTRY};
pub use tracing::{init_tracing, shutdown_tracing, TracingConfig};

/// Minimal logging setup without metrics or OpenTelemetry infrastructure.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_minimal_logging() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();
}
