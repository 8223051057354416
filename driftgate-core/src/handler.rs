//! Per-connection work.
//!
//! The server treats a [`ConnectionHandler`] as a black box: it hands over an
//! owned stream and only requires that `handle` eventually returns. Whatever
//! the handler returns, the stream is closed and the connection slot released
//! afterwards. Errors are logged and never retried.

use async_trait::async_trait;
use driftgate_common::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Protocol-specific processing of one accepted connection.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()>;
}

#[async_trait]
impl<F, Fut> ConnectionHandler for F
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        (self)(stream, peer).await
    }
}

/// Reads and discards everything the peer sends until it closes the stream.
///
/// With a minimum hold the handler also keeps the connection open for at
/// least that long, which stands in for real processing time.
#[derive(Debug, Clone, Default)]
pub struct SinkHandler {
    min_hold: Option<Duration>,
}

/// Buffer size for draining a sink connection
const SINK_BUFFER_SIZE: usize = 16 * 1024;

impl SinkHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep each connection open for at least `hold`.
    #[must_use]
    pub fn with_min_hold(mut self, hold: Duration) -> Self {
        self.min_hold = Some(hold);
        self
    }
}

#[async_trait]
impl ConnectionHandler for SinkHandler {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let start = Instant::now();
        let drain = async {
            let mut buf = vec![0u8; SINK_BUFFER_SIZE];
            let mut total: u64 = 0;
            loop {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<_, std::io::Error>(total);
                }
                total += n as u64;
            }
        };
        let hold = async {
            if let Some(hold) = self.min_hold {
                tokio::time::sleep(hold).await;
            }
        };

        let (bytes, ()) = tokio::join!(drain, hold);
        let bytes = bytes?;
        debug!(
            peer_addr = %peer,
            duration_ms = start.elapsed().as_millis(),
            bytes_rx = bytes,
            "sink connection closed"
        );
        Ok(())
    }
}

/// Writes back everything it reads until the peer closes the stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

#[async_trait]
impl ConnectionHandler for EchoHandler {
    async fn handle(&self, mut stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let (mut reader, mut writer) = stream.split();
        let echoed = tokio::io::copy(&mut reader, &mut writer).await?;
        debug!(peer_addr = %peer, bytes = echoed, "echo connection closed");
        Ok(())
    }
}
