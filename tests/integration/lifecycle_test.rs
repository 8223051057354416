use crate::{expect_closed_by_server, start_server, wait_until, GatedHandler, NEVER};
use driftgate_core::{LifecycleState, ShutdownReason, SinkHandler};
use std::time::Duration;
use tokio::net::TcpStream;

const UNIT: Duration = Duration::from_millis(200);

#[tokio::test]
async fn test_max_lifetime_stops_accepting() {
    let handler = GatedHandler::released();
    let server = start_server(UNIT, NEVER, handler.clone()).await;

    assert!(server.health().is_healthy());
    assert_eq!(server.state(), LifecycleState::Accepting);

    assert!(wait_until(UNIT * 5, || server.is_shutting_down()).await);
    assert_eq!(
        server.shutdown_controller().reason(),
        Some(ShutdownReason::MaxLifetime)
    );
    assert!(!server.health().is_healthy());
    assert_eq!(server.state(), LifecycleState::Draining, "listener still open");

    // The listener is still open, but nothing new reaches the handler
    let client = TcpStream::connect(server.local_addr()).await.unwrap();
    expect_closed_by_server(client).await;
    assert_eq!(handler.dispatched(), 0);

    server.shutdown().await.unwrap();
    assert_eq!(server.state(), LifecycleState::Stopped);
    assert_eq!(
        server.shutdown_controller().reason(),
        Some(ShutdownReason::MaxLifetime),
        "explicit shutdown keeps the first reason"
    );
}

#[tokio::test]
async fn test_lifetime_not_reached_early() {
    let server = start_server(UNIT * 5, NEVER, SinkHandler::new()).await;
    tokio::time::sleep(UNIT).await;
    assert!(!server.is_shutting_down());
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_idle_interval_without_connections_stops_accepting() {
    let server = start_server(NEVER, UNIT, SinkHandler::new()).await;

    let reason = tokio::time::timeout(UNIT * 5, server.wait_for_shutdown_request())
        .await
        .expect("idle watchdog should fire");
    assert_eq!(reason, ShutdownReason::IdleTimeout);
    assert!(!server.health().is_healthy());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_held_connection_keeps_server_alive() {
    let server = start_server(NEVER, UNIT, SinkHandler::new()).await;

    let client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert!(wait_until(UNIT, || server.tracker().has_active()).await);

    // Several idle checks pass while the connection stays open
    tokio::time::sleep(UNIT * 4).await;
    assert!(!server.is_shutting_down());
    assert!(server.health().is_healthy());

    // Once the client leaves, the next check finds the server idle
    drop(client);
    assert!(wait_until(UNIT * 5, || server.is_shutting_down()).await);
    assert_eq!(
        server.shutdown_controller().reason(),
        Some(ShutdownReason::IdleTimeout)
    );

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_first_trigger_wins() {
    let server = start_server(UNIT / 2, UNIT * 2, SinkHandler::new()).await;

    assert_eq!(
        server.wait_for_shutdown_request().await,
        ShutdownReason::MaxLifetime
    );

    // Let the idle check run against a server that is already shutting down
    tokio::time::sleep(UNIT * 3).await;
    assert_eq!(
        server.shutdown_controller().reason(),
        Some(ShutdownReason::MaxLifetime)
    );

    server.shutdown().await.unwrap();
}
