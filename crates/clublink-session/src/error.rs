//! Error types for the session layer.

use clublink_protocol::ProtocolError;
use clublink_transport::TransportError;

/// Errors returned by [`Session`](crate::Session) construction and its
/// control API.
///
/// Background failures (a socket dropping after the handshake, a frame
/// failing to decode) never surface here. They are logged and drive the
/// restart state machine; the owner learns about them through
/// [`EventHandler::on_reconnect_failed`](crate::EventHandler::on_reconnect_failed).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Dialing or talking to an endpoint failed.
    #[error(transparent)]
    Connection(#[from] TransportError),

    /// A record could not be built, enciphered, or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A handshake step got no answer in time.
    #[error("handshake timed out waiting for {stage}")]
    HandshakeTimeout { stage: &'static str },

    /// The server answered a handshake step with an explicit failure.
    /// Bad credentials end up here; they are not retried.
    #[error("{stage} rejected by server: {message}")]
    ServerRejected { stage: &'static str, message: String },

    /// A control-API argument was rejected locally.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The session was shut down or replaced.
    #[error("session is terminated")]
    Terminated,

    /// A pending handshake step was abandoned because the session was
    /// torn down underneath it.
    #[error("operation cancelled")]
    Cancelled,
}
