//! TCP dialer built on `tokio::net::TcpStream`.

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::{Dialer, TransportError};

/// Socket options applied to every dialed stream.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Disable Nagle's algorithm. Commands are small and latency-bound.
    pub tcp_nodelay: bool,
    /// TCP keep-alive idle time and probe interval. `None` disables it.
    pub keep_alive: Option<Duration>,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keep_alive: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Applies `config` to a connected stream.
pub fn configure_stream(stream: &TcpStream, config: &SocketConfig) -> std::io::Result<()> {
    stream.set_nodelay(config.tcp_nodelay)?;

    if let Some(interval) = config.keep_alive {
        let keepalive = TcpKeepalive::new()
            .with_time(interval)
            .with_interval(interval);
        SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
    }

    Ok(())
}

/// Dials plain TCP connections.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    config: SocketConfig,
}

impl TcpDialer {
    /// Creates a dialer that applies `config` to every connection.
    pub fn new(config: SocketConfig) -> Self {
        Self { config }
    }

    /// The socket options this dialer applies.
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, addr: &str) -> Result<TcpStream, TransportError> {
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout(addr.to_string()))?
            .map_err(|source| TransportError::ConnectFailed {
                addr: addr.to_string(),
                source,
            })?;

        if let Err(e) = configure_stream(&stream, &self.config) {
            // Socket options are best-effort; the connection itself is fine.
            tracing::warn!(addr, error = %e, "failed to apply socket options");
        }

        tracing::debug!(addr, "tcp connection established");
        Ok(stream)
    }
}
