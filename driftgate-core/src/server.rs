//! Accept loop and shutdown sequencing.
//!
//! # Example
//!
//! ```rust,no_run
//! use driftgate_common::ServerConfig;
//! use driftgate_core::{Server, SinkHandler};
//!
//! # async fn example() -> driftgate_common::Result<()> {
//! let config = ServerConfig::builder()
//!     .listen_addr("127.0.0.1:1935".parse().unwrap())
//!     .build()?;
//!
//! let server = Server::bind(config).await?.start(SinkHandler::new());
//!
//! // Runs until a watchdog or the operator asks it to stop.
//! server.wait_for_shutdown_request().await;
//! server.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::handler::ConnectionHandler;
use crate::health::{HealthReporter, LifecycleState};
use crate::shutdown::{ShutdownController, ShutdownReason};
use crate::tracker::ConnectionTracker;
use crate::watchdog::{spawn_idle_watchdog, spawn_lifetime_watchdog};
use async_trait::async_trait;
use driftgate_common::{Error, Result, ServerConfig};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

/// A bound listener that has not started accepting yet.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Validate `config` and bind the listening socket.
    ///
    /// Failing to bind is fatal: the error is returned as is and never retried.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| Error::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        Ok(Self {
            config,
            listener,
            local_addr,
        })
    }

    /// The bound address. Differs from the configured one when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start the accept loop and both watchdogs; the lifetime clock starts now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H: ConnectionHandler>(self, handler: H) -> ServerHandle {
        let shutdown = ShutdownController::new();
        let tracker = ConnectionTracker::new();
        let close_listener = CancellationToken::new();
        let stop_watchdogs = CancellationToken::new();
        let listener_closed = Arc::new(AtomicBool::new(false));
        let health = HealthReporter::new(
            shutdown.clone(),
            tracker.clone(),
            Arc::clone(&listener_closed),
        );

        info!(
            max_lifetime_secs = self.config.max_lifetime.as_secs(),
            idle_interval_secs = self.config.idle_interval.as_secs(),
            "Starting accept loop"
        );

        let watchdogs = vec![
            spawn_lifetime_watchdog(
                self.config.max_lifetime,
                shutdown.clone(),
                stop_watchdogs.clone(),
            ),
            spawn_idle_watchdog(
                self.config.idle_interval,
                shutdown.clone(),
                tracker.clone(),
                stop_watchdogs.clone(),
            ),
        ];

        let accept = AcceptLoop {
            listener: self.listener,
            handler: Arc::new(handler),
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
            close: close_listener.clone(),
            listener_closed,
            nodelay: self.config.nodelay,
        };
        let accept_task = tokio::spawn(accept.run());

        ServerHandle {
            local_addr: self.local_addr,
            shutdown,
            tracker,
            health,
            close_listener,
            stop_watchdogs,
            accept_task: Mutex::new(Some(accept_task)),
            watchdogs: Mutex::new(watchdogs),
        }
    }
}

/// Pause after a failed accept. Errors such as EMFILE persist while the
/// pending connection sits in the backlog.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Source of incoming connections for the accept loop.
#[async_trait]
pub(crate) trait Accept: Send + Sync + 'static {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

struct AcceptLoop<H, L = TcpListener> {
    listener: L,
    handler: Arc<H>,
    shutdown: ShutdownController,
    tracker: ConnectionTracker,
    close: CancellationToken,
    listener_closed: Arc<AtomicBool>,
    nodelay: bool,
}

impl<H: ConnectionHandler, L: Accept> AcceptLoop<H, L> {
    async fn run(self) {
        loop {
            let accepted = tokio::select! {
                () = self.close.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) if self.shutdown.is_shutting_down() => {
                    debug!(error = %e, "accept failed while shutting down, stopping accept loop");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Error accepting connection");
                    crate::metrics::accept_error();
                    tokio::select! {
                        () = self.close.cancelled() => break,
                        () = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => continue,
                    }
                }
            };

            // Check and register under one read lock: a shutdown request either
            // happened before (drop the stream) or waits until the guard exists.
            let Some(guard) = self.shutdown.admit(|| self.tracker.add()) else {
                debug!(peer_addr = %peer, "Shutting down, closing connection without dispatch");
                crate::metrics::connection_rejected();
                drop(stream);
                continue;
            };

            if self.nodelay {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }
            }
            crate::metrics::connection_accepted();

            let handler = Arc::clone(&self.handler);
            tokio::spawn(
                async move {
                    let _guard = guard;
                    debug!("connection dispatched");
                    if let Err(e) = handler.handle(stream, peer).await {
                        warn!(error = %e, "Connection handler failed");
                        crate::metrics::handler_error();
                    }
                }
                .instrument(debug_span!("connection", peer_addr = %peer)),
            );
        }

        drop(self.listener);
        self.listener_closed.store(true, Ordering::SeqCst);
        info!("Listener closed, no further connections will be dispatched");
    }
}

/// Control surface of a running server.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) closes the
/// listener and stops the watchdogs but leaves in-flight connections running
/// detached.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: ShutdownController,
    tracker: ConnectionTracker,
    health: HealthReporter,
    close_listener: CancellationToken,
    stop_watchdogs: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    watchdogs: Mutex<Vec<JoinHandle<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn health(&self) -> HealthReporter {
        self.health.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_shutting_down()
    }

    pub fn state(&self) -> LifecycleState {
        self.health.state()
    }

    /// Stop dispatching new connections without closing the listener or waiting.
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        self.shutdown.request_shutdown(reason)
    }

    /// Resolve once any trigger has requested shutdown.
    pub async fn wait_for_shutdown_request(&self) -> ShutdownReason {
        self.shutdown.wait().await
    }

    /// Stop accepting, close the listener, and wait for every in-flight
    /// connection to finish.
    ///
    /// Connections are never cut short. Calling this again after it returned
    /// is a cheap no-op; concurrent calls all return once the drain is over.
    pub async fn shutdown(&self) -> Result<()> {
        self.drain(None).await
    }

    /// Like [`shutdown`](Self::shutdown), but give up waiting after `limit`.
    ///
    /// On expiry this returns [`Error::DrainTimeout`]; the remaining
    /// connections keep running and a later `shutdown` can still wait for them.
    pub async fn shutdown_timeout(&self, limit: Duration) -> Result<()> {
        self.drain(Some(limit)).await
    }

    async fn drain(&self, limit: Option<Duration>) -> Result<()> {
        if self.shutdown.request_shutdown(ShutdownReason::Operator) {
            info!("Shutdown requested by operator");
        }
        info!(
            active_connections = self.tracker.active(),
            "Shutting down server"
        );

        self.stop_accepting().await?;

        match limit {
            None => self.tracker.wait().await,
            Some(limit) => {
                if tokio::time::timeout(limit, self.tracker.wait()).await.is_err() {
                    let active = self.tracker.active();
                    warn!(
                        active_connections = active,
                        "Drain timeout reached with connections still active"
                    );
                    return Err(Error::DrainTimeout {
                        elapsed: limit,
                        active,
                    });
                }
            }
        }

        self.stop_watchdogs().await;
        info!("All connections closed, server shutdown complete");
        Ok(())
    }

    async fn stop_accepting(&self) -> Result<()> {
        self.close_listener.cancel();
        // Hold the lock across the join so a concurrent caller cannot move on
        // to draining before the socket is actually closed.
        let mut accept_task = self.accept_task.lock().await;
        if let Some(task) = accept_task.take() {
            task.await
                .map_err(|e| Error::InvalidState(format!("accept loop task failed: {e}")))?;
        }
        Ok(())
    }

    async fn stop_watchdogs(&self) {
        self.stop_watchdogs.cancel();
        let watchdogs = std::mem::take(&mut *self.watchdogs.lock().await);
        for watchdog in watchdogs {
            if let Err(e) = watchdog.await {
                warn!("Watchdog task failed: {}", e);
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        // Best-effort: never leave the accept loop or timers running behind us
        self.close_listener.cancel();
        self.stop_watchdogs.cancel();
    }
}
