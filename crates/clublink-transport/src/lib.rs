//! Transport layer for clublink.
//!
//! Provides the [`Dialer`] trait that opens byte streams to the auth and
//! lobby endpoints, a TCP implementation, and [`FrameAssembler`], which
//! turns a byte stream back into length-prefixed frames.
//!
//! # Feature Flags
//!
//! - `tcp` (default): [`TcpDialer`] with keep-alive via `socket2`

mod error;
mod frame;
#[cfg(feature = "tcp")]
mod tcp;

pub use error::{FrameError, TransportError};
pub use frame::{
    declared_len, pump_frames, FrameAssembler, PumpExit, DEFAULT_BUFFER_CAPACITY,
    FRAME_HEADER_LEN, MAX_FRAME_LEN,
};
#[cfg(feature = "tcp")]
pub use tcp::{configure_stream, SocketConfig, TcpDialer};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique ID.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Opens outbound byte streams.
///
/// The session dials through this trait so tests can hand it in-memory
/// streams (`tokio::io::duplex`) or scripted failures instead of sockets.
pub trait Dialer: Send + Sync + 'static {
    /// The stream type produced by this dialer.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connects to `addr` (`host:port`).
    fn dial(
        &self,
        addr: &str,
    ) -> impl Future<Output = Result<Self::Stream, TransportError>> + Send;
}
