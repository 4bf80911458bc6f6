use crate::address::Endpoint;
use async_trait::async_trait;
use futures::TryFutureExt;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::{error::Elapsed, timeout};
use tracing::debug;

/// Outcome of a reachability probe. `connect_latency` is only set when the connection
/// was established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub endpoint: Endpoint,
    pub port: u16,
    pub reachable: bool,
    pub connect_latency: Option<Duration>,
}

impl ProbeResult {
    pub fn reachable(endpoint: Endpoint, port: u16, latency: Duration) -> Self {
        Self {
            endpoint,
            port,
            reachable: true,
            connect_latency: Some(latency),
        }
    }

    pub fn unreachable(endpoint: Endpoint, port: u16) -> Self {
        Self {
            endpoint,
            port,
            reachable: false,
            connect_latency: None,
        }
    }
}

#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// Test whether `endpoint.host:port` accepts a transport connection within `timeout`.
    async fn probe(&self, endpoint: &Endpoint, port: u16, timeout: Duration) -> ProbeResult;
}

/// Probes by opening (and immediately dropping) a TCP connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

#[async_trait]
impl ReachabilityProber for TcpProber {
    async fn probe(&self, endpoint: &Endpoint, port: u16, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        match connect(&endpoint.host, port, timeout).await {
            Ok(_stream) => ProbeResult::reachable(endpoint.clone(), port, start.elapsed()),
            Err(e) => {
                debug!("Probe of {}:{} failed: {}", endpoint.host, port, e);
                ProbeResult::unreachable(endpoint.clone(), port)
            }
        }
    }
}

async fn connect(host: &str, port: u16, connection_timeout: Duration) -> Result<TcpStream, Error> {
    let connection = TcpStream::connect((host, port)).map_err(Error::ConnectionFailed);
    let stream = timeout(connection_timeout, connection)
        .map_err(Error::ConnectionTimedOut)
        .await??;
    Ok(stream)
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("Connection failed: {0:?}")]
    ConnectionFailed(std::io::Error),
    #[error("Connection timed out")]
    ConnectionTimedOut(Elapsed),
}
