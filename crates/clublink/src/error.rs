//! Unified error type for clublink.

use std::io;
use std::path::PathBuf;

use clublink_protocol::ProtocolError;
use clublink_session::SessionError;
use clublink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `clublink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClubError {
    /// A transport-level error (dial, send, receive, framing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (record layout, cipher, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (handshake, rejected logon, terminated).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A config file could not be read.
    #[error("cannot read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A config file is not valid JSON for [`SessionConfig`](clublink_session::SessionConfig).
    #[error("invalid config {path}: {source}")]
    ConfigFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::Transport(_)));
        assert!(club_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidWidth(3);
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Terminated;
        let club_err: ClubError = err.into();
        assert!(matches!(club_err, ClubError::Session(_)));
    }

    #[test]
    fn test_config_error_names_the_file() {
        let err = ClubError::Config {
            path: PathBuf::from("/etc/clublink/bot.json"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/etc/clublink/bot.json"));
    }
}
