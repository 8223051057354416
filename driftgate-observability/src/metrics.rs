//! Prometheus metrics for the accept loop and the shutdown state machine.
//!
//! Metrics are registered lazily in a crate-local [`REGISTRY`]. Recording is
//! gated on [`metrics_enabled`] so callers can skip the atomic traffic when
//! no `/metrics` endpoint is exposed.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

static ENABLED: AtomicBool = AtomicBool::new(false);

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register<M>(metric: M) -> M
where
    M: prometheus::core::Collector + Clone + 'static,
{
    REGISTRY.register(Box::new(metric.clone())).unwrap();
    metric
}

pub static ACTIVE_CONNECTIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    register(
        IntGauge::new(
            "driftgate_active_connections",
            "Connections dispatched to a handler and not yet completed",
        )
        .unwrap(),
    )
});

pub static SHUTTING_DOWN: LazyLock<IntGauge> = LazyLock::new(|| {
    register(
        IntGauge::new(
            "driftgate_shutting_down",
            "1 once shutdown has been requested, 0 while accepting",
        )
        .unwrap(),
    )
});

pub static CONNECTIONS_ACCEPTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "driftgate_connections_accepted_total",
            "Connections dispatched to a handler",
        )
        .unwrap(),
    )
});

pub static CONNECTIONS_REJECTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "driftgate_connections_rejected_total",
            "Connections accepted after shutdown was requested and closed without dispatch",
        )
        .unwrap(),
    )
});

pub static ACCEPT_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "driftgate_accept_errors_total",
            "Transient errors returned by accept",
        )
        .unwrap(),
    )
});

pub static HANDLER_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    register(
        IntCounter::new(
            "driftgate_handler_errors_total",
            "Connection handlers that returned an error",
        )
        .unwrap(),
    )
});

pub static SHUTDOWN_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register(
        IntCounterVec::new(
            Opts::new(
                "driftgate_shutdown_requests_total",
                "Shutdown transitions by the trigger that won",
            ),
            &["reason"],
        )
        .unwrap(),
    )
});

/// Enable recording and register every metric so that `/metrics` lists them
/// from the first scrape.
pub fn init_metrics() {
    if ENABLED.swap(true, Ordering::SeqCst) {
        return;
    }

    LazyLock::force(&ACTIVE_CONNECTIONS);
    LazyLock::force(&SHUTTING_DOWN);
    LazyLock::force(&CONNECTIONS_ACCEPTED_TOTAL);
    LazyLock::force(&CONNECTIONS_REJECTED_TOTAL);
    LazyLock::force(&ACCEPT_ERRORS_TOTAL);
    LazyLock::force(&HANDLER_ERRORS_TOTAL);
    LazyLock::force(&SHUTDOWN_REQUESTS_TOTAL);

    #[cfg(target_os = "linux")]
    {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(e) = REGISTRY.register(Box::new(collector)) {
            tracing::warn!("Failed to register process collector: {}", e);
        }
    }
}

pub fn metrics_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
