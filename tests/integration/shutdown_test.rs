use crate::{expect_closed_by_server, start_server, wait_until, GatedHandler, NEVER};
use driftgate_common::Error;
use driftgate_core::{LifecycleState, ShutdownReason, SinkHandler};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn test_connections_after_forced_shutdown_are_dropped() {
    let handler = GatedHandler::new();
    let server = start_server(NEVER, NEVER, handler.clone()).await;

    // Two connections are in flight when shutdown is forced
    let mut in_flight = Vec::new();
    for _ in 0..2 {
        in_flight.push(TcpStream::connect(server.local_addr()).await.unwrap());
    }
    assert!(wait_until(Duration::from_secs(2), || handler.dispatched() == 2).await);

    assert!(server.request_shutdown(ShutdownReason::Operator));

    for _ in 0..3 {
        let client = TcpStream::connect(server.local_addr()).await.unwrap();
        expect_closed_by_server(client).await;
    }

    assert_eq!(handler.dispatched(), 2, "dispatch count must not grow after shutdown");
    assert_eq!(server.tracker().active(), 2);
    assert_eq!(server.state(), LifecycleState::Draining);

    handler.release();
    server.shutdown().await.unwrap();
    assert_eq!(handler.completed(), 2);
    assert!(!server.tracker().has_active());
}

#[tokio::test]
async fn test_connections_before_shutdown_are_dispatched() {
    let handler = GatedHandler::released();
    let server = start_server(NEVER, NEVER, handler.clone()).await;

    for _ in 0..3 {
        let _client = TcpStream::connect(server.local_addr()).await.unwrap();
    }

    assert!(wait_until(Duration::from_secs(2), || handler.completed() == 3).await);
    server.shutdown().await.unwrap();
    assert_eq!(handler.dispatched(), 3);
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_handler() {
    let handler = GatedHandler::new();
    let server = std::sync::Arc::new(start_server(NEVER, NEVER, handler.clone()).await);

    let _client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || handler.dispatched() == 1).await);

    let shutdown = tokio::spawn({
        let server = std::sync::Arc::clone(&server);
        async move { server.shutdown().await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!shutdown.is_finished(), "shutdown returned before the handler finished");
    assert_eq!(server.state(), LifecycleState::Draining);
    assert!(!server.health().is_healthy());

    handler.release();
    shutdown.await.unwrap().unwrap();

    assert_eq!(handler.completed(), 1);
    assert!(!server.tracker().has_active());
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_shutdown_waits_for_client_to_finish() {
    let server = std::sync::Arc::new(start_server(NEVER, NEVER, SinkHandler::new()).await);

    let mut client = TcpStream::connect(server.local_addr()).await.unwrap();
    client.write_all(b"partial upload").await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.tracker().active() == 1).await);

    let shutdown = tokio::spawn({
        let server = std::sync::Arc::clone(&server);
        async move { server.shutdown().await }
    });

    client.write_all(b" keeps flowing during drain").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!shutdown.is_finished());

    drop(client);
    tokio::time::timeout(Duration::from_secs(2), shutdown)
        .await
        .expect("shutdown should finish once the client hangs up")
        .unwrap()
        .unwrap();
    assert!(!server.tracker().has_active());
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let server = start_server(NEVER, NEVER, SinkHandler::new()).await;

    let (first, second) = tokio::join!(server.shutdown(), server.shutdown());
    first.unwrap();
    second.unwrap();

    server.shutdown().await.unwrap();
    assert_eq!(server.state(), LifecycleState::Stopped);
    assert_eq!(
        server.shutdown_controller().reason(),
        Some(ShutdownReason::Operator)
    );
}

#[tokio::test]
async fn test_listener_refuses_after_shutdown() {
    let server = start_server(NEVER, NEVER, SinkHandler::new()).await;
    let addr = server.local_addr();

    server.shutdown().await.unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_timeout_gives_up_without_cutting_connection() {
    let handler = GatedHandler::new();
    let server = start_server(NEVER, NEVER, handler.clone()).await;

    let _client = TcpStream::connect(server.local_addr()).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || handler.dispatched() == 1).await);

    let err = server
        .shutdown_timeout(Duration::from_millis(150))
        .await
        .unwrap_err();
    match err {
        Error::DrainTimeout { active, .. } => assert_eq!(active, 1),
        other => panic!("expected drain timeout, got {other:?}"),
    }
    assert_eq!(handler.completed(), 0);
    assert_eq!(server.state(), LifecycleState::Draining);

    handler.release();
    server.shutdown().await.unwrap();
    assert_eq!(handler.completed(), 1);
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_shutdown_timeout_succeeds_when_idle() {
    let server = start_server(NEVER, NEVER, SinkHandler::new()).await;
    server
        .shutdown_timeout(Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(server.state(), LifecycleState::Stopped);
}
