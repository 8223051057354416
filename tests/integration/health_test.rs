use crate::{start_server, wait_until, GatedHandler, NEVER};
use driftgate_core::{HealthStatus, LifecycleState, ShutdownReason};
use std::time::Duration;
use tokio::net::TcpStream;

#[tokio::test]
async fn test_report_follows_server_lifecycle() {
    let handler = GatedHandler::new();
    let server = std::sync::Arc::new(start_server(NEVER, NEVER, handler.clone()).await);
    let health = server.health();

    let report = health.report();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.state, LifecycleState::Accepting);
    assert_eq!(report.active_connections, 0);
    assert!(report.reason.is_none());

    let _client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || handler.dispatched() == 1).await);
    assert_eq!(health.report().active_connections, 1);

    let shutdown = tokio::spawn({
        let server = std::sync::Arc::clone(&server);
        async move { server.shutdown().await }
    });
    assert!(wait_until(Duration::from_secs(2), || !health.is_healthy()).await);

    let report = health.report();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.state, LifecycleState::Draining);
    assert_eq!(report.reason, Some(ShutdownReason::Operator));
    assert_eq!(report.active_connections, 1);

    handler.release();
    shutdown.await.unwrap().unwrap();

    let report = health.report();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.state, LifecycleState::Stopped);
    assert_eq!(report.active_connections, 0);
}

#[tokio::test]
async fn test_health_probes_do_not_change_state() {
    let server = start_server(NEVER, NEVER, GatedHandler::released()).await;
    let health = server.health();

    for _ in 0..10 {
        assert!(health.report().is_healthy());
    }
    assert!(!server.is_shutting_down());
    assert_eq!(server.state(), LifecycleState::Accepting);

    server.shutdown().await.unwrap();
}
