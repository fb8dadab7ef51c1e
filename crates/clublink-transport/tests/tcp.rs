//! Integration tests for the TCP dialer.
//!
//! These spin up a real listener on an OS-assigned port and check that
//! bytes written by the dialed stream arrive intact, and that dial
//! failures surface as the right error variant.

#[cfg(feature = "tcp")]
mod tcp {
    use std::time::Duration;

    use clublink_transport::{Dialer, SocketConfig, TcpDialer, TransportError};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.expect("should accept");
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(b"world").await.unwrap();
            buf
        });

        let dialer = TcpDialer::default();
        let mut stream = dialer.dial(&addr).await.expect("should dial");
        stream.write_all(b"hello").await.unwrap();

        let mut reply = [0u8; 5];
        stream.read_exact(&mut reply).await.unwrap();

        assert_eq!(&reply, b"world");
        assert_eq!(&server.await.unwrap(), b"hello");
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn test_dial_refused_is_connect_failed() {
        // Bind then drop to get a port that is almost certainly closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let dialer = TcpDialer::new(SocketConfig {
            connect_timeout: Duration::from_secs(2),
            ..SocketConfig::default()
        });
        let err = dialer.dial(&addr).await.expect_err("should fail");

        assert!(
            matches!(err, TransportError::ConnectFailed { .. }),
            "unexpected error: {err:?}"
        );
        assert!(!err.is_timeout());
    }
}
