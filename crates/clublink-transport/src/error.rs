use std::io;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Dialing the remote endpoint failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Dialing the remote endpoint did not complete in time.
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// The remote peer closed the connection.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The byte stream could not be split into frames.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl TransportError {
    /// Returns `true` for failures caused by a deadline rather than a
    /// broken socket. Timeouts do not trigger a reconnect.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ConnectTimeout(_) => true,
            Self::SendFailed(e) | Self::ReceiveFailed(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Errors raised while reassembling frames from a byte stream.
///
/// Both variants mean the length accounting is out of sync with the
/// peer; the stream cannot be resynchronised and must be dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// A header declared a total length shorter than the header itself.
    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    /// Buffered bytes would exceed the assembler's capacity.
    #[error("frame buffer overflow: {buffered} bytes buffered, capacity {capacity}")]
    Overflow { buffered: usize, capacity: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout_connect_timeout_true() {
        assert!(TransportError::ConnectTimeout("127.0.0.1:1".into()).is_timeout());
    }

    #[test]
    fn test_is_timeout_timed_out_io_true() {
        let err = TransportError::ReceiveFailed(io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_is_timeout_reset_false() {
        let err = TransportError::SendFailed(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(!err.is_timeout());
        assert!(!TransportError::ConnectionClosed("eof".into()).is_timeout());
    }

    #[test]
    fn test_frame_error_converts_into_transport_error() {
        let err: TransportError = FrameError::InvalidLength(2).into();
        assert!(matches!(err, TransportError::Frame(FrameError::InvalidLength(2))));
        assert!(err.to_string().contains("invalid frame length 2"));
    }
}
