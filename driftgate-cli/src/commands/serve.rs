//! Serve subcommand implementation

use crate::health;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use driftgate_common::{parse_duration, parse_listen_addr, ServerConfig, DEFAULT_HEALTH_BIND};
use driftgate_core::{EchoHandler, Server, ServerHandle, ShutdownReason, SinkHandler};
use driftgate_observability::{
    init_metrics, init_minimal_logging, init_tracing, shutdown_tracing, TracingConfig,
};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HandlerKind {
    /// Read and discard until the client closes
    Sink,
    /// Write back everything received
    Echo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port or address to listen on (`8080`, `:8080`, `127.0.0.1:8080`)
    #[arg(long, default_value = "8080", env = "PORT", value_parser = parse_listen_addr)]
    listen: SocketAddr,

    /// Stop accepting after this long (`6h`, `90m`, ...)
    #[arg(long, default_value = "6h", env = "DRIFTGATE_MAX_LIFETIME", value_parser = parse_duration)]
    max_lifetime: Duration,

    /// Stop accepting if no connection is open at one of these periodic checks
    #[arg(long, default_value = "15m", env = "DRIFTGATE_IDLE_INTERVAL", value_parser = parse_duration)]
    idle_interval: Duration,

    /// Health endpoint bind address
    #[arg(long, default_value = DEFAULT_HEALTH_BIND, env = "DRIFTGATE_HEALTH_BIND")]
    health_bind: SocketAddr,

    /// Give up waiting for in-flight connections after this long
    #[arg(long, env = "DRIFTGATE_DRAIN_TIMEOUT", value_parser = parse_duration)]
    drain_timeout: Option<Duration>,

    /// What to do with each accepted connection
    #[arg(long, value_enum, default_value_t = HandlerKind::Sink, env = "DRIFTGATE_HANDLER")]
    handler: HandlerKind,

    /// Minimum time the sink handler keeps a connection open
    #[arg(long, env = "DRIFTGATE_HOLD", value_parser = parse_duration)]
    hold: Option<Duration>,

    /// Leave Nagle's algorithm enabled on accepted connections
    #[arg(long, env = "DRIFTGATE_NO_NODELAY")]
    no_nodelay: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "DRIFTGATE_LOG_FORMAT")]
    log_format: LogFormat,

    /// Export spans to the collector in OTEL_EXPORTER_OTLP_ENDPOINT
    #[arg(long, env = "DRIFTGATE_OBSERVABILITY")]
    observability: bool,

    /// Serve Prometheus metrics on the health listener
    #[arg(long, env = "DRIFTGATE_METRICS")]
    metrics: bool,

    /// Drain and exit as soon as a watchdog fires instead of waiting for
    /// SIGINT/SIGTERM
    #[arg(long, env = "DRIFTGATE_EXIT_ON_SHUTDOWN_REQUEST")]
    exit_on_shutdown_request: bool,
}

impl ServeArgs {
    fn server_config(&self) -> Result<ServerConfig> {
        ServerConfig::builder()
            .listen_addr(self.listen)
            .max_lifetime(self.max_lifetime)
            .idle_interval(self.idle_interval)
            .nodelay(!self.no_nodelay)
            .build()
            .context("invalid server configuration")
    }
}

fn init_logging(args: &ServeArgs) -> Result<()> {
    if args.metrics {
        init_metrics();
    }

    let json = args.log_format == LogFormat::Json;
    if args.observability || json {
        let otlp_endpoint = if args.observability {
            std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()
        } else {
            None
        };
        init_tracing(TracingConfig {
            service_name: "driftgate".to_string(),
            otlp_endpoint,
            json,
        })
    } else {
        init_minimal_logging();
        Ok(())
    }
}

pub async fn run(args: ServeArgs) -> Result<()> {
    init_logging(&args)?;
    info!("Starting driftgate v{}", env!("CARGO_PKG_VERSION"));

    let config = args.server_config()?;
    let server = Server::bind(config).await?;

    let health_listener = TcpListener::bind(args.health_bind)
        .await
        .with_context(|| format!("failed to bind health endpoint to {}", args.health_bind))?;
    info!("Health endpoint listening on http://{}/health", args.health_bind);

    let server = match args.handler {
        HandlerKind::Sink => {
            let sink = match args.hold {
                Some(hold) => SinkHandler::new().with_min_hold(hold),
                None => SinkHandler::new(),
            };
            server.start(sink)
        }
        HandlerKind::Echo => server.start(EchoHandler),
    };

    let app = health::router(server.health(), args.metrics);
    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, app).await {
            error!("Health server error: {}", e);
        }
    });

    let reason =
        wait_for_trigger(&server, shutdown_signal(), args.exit_on_shutdown_request).await;
    info!(reason = %reason, "Draining connections before exit");

    let result = drain(&server, args.drain_timeout).await;

    health_task.abort();
    shutdown_tracing();
    result
}

/// Wait until the process should run the shutdown sequence.
///
/// A watchdog only flips the server to unhealthy; by default the process keeps
/// serving `/health` (500) and the existing connections until `signal`
/// resolves, leaving the orchestrator to decide when to stop it. With
/// `exit_on_request` a watchdog firing is enough.
async fn wait_for_trigger<F>(
    server: &ServerHandle,
    signal: F,
    exit_on_request: bool,
) -> ShutdownReason
where
    F: Future<Output = ()>,
{
    let requested = async {
        let reason = server.wait_for_shutdown_request().await;
        if exit_on_request {
            return reason;
        }
        info!(reason = %reason, "Reporting unhealthy until a shutdown signal arrives");
        std::future::pending::<ShutdownReason>().await
    };

    tokio::select! {
        () = signal => {
            server.request_shutdown(ShutdownReason::Operator);
            server.shutdown_controller().reason().unwrap_or(ShutdownReason::Operator)
        }
        reason = requested => reason,
    }
}

async fn drain(server: &ServerHandle, limit: Option<Duration>) -> Result<()> {
    match limit {
        Some(limit) => server
            .shutdown_timeout(limit)
            .await
            .context("connections still open when the drain timeout expired"),
        None => server.shutdown().await.context("shutdown failed"),
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
