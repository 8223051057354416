//! HTTP transport for the health report.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use driftgate_core::{HealthReport, HealthReporter};
use driftgate_observability::gather_metrics;

/// `GET /health` answers 200 while accepting and 500 once shutting down.
/// `/metrics` is only mounted when `with_metrics` is set.
pub fn router(health: HealthReporter, with_metrics: bool) -> Router {
    let router = Router::new().route("/health", get(health_handler));
    let router = if with_metrics {
        router.route("/metrics", get(|| async { gather_metrics() }))
    } else {
        router
    };
    router.with_state(health)
}

async fn health_handler(State(health): State<HealthReporter>) -> (StatusCode, Json<HealthReport>) {
    let report = health.report();
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}
