//! Transport layer
//!
//! Provides:
//! - TCP connect with a bounded timeout
//! - TLS upgrade of an established stream (feature `tls`)

#[cfg(feature = "tls")]
pub mod tls;

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("TLS error: {0}")]
    Tls(String),
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout in seconds. Only the connect attempt is bounded;
    /// handshake replies and the response body are awaited until the peer
    /// closes or errors the stream.
    pub connect_timeout: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 10,
        }
    }
}

/// Open a TCP connection to `host:port`, bounded by the configured timeout.
///
/// Expiry aborts the attempt and surfaces as `ConnectTimeout`, distinct from
/// a rejected or failed connect.
pub async fn connect(
    host: &str,
    port: u16,
    config: &TransportConfig,
) -> Result<TcpStream, TransportError> {
    let timeout = Duration::from_secs(config.connect_timeout);

    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| TransportError::ConnectTimeout)?
        .map_err(TransportError::Io)?;

    stream.set_nodelay(true).ok();
    debug!("connected to {}:{}", host, port);

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_and_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(&buf[..n]).await.unwrap();
        });

        let mut stream = connect("127.0.0.1", addr.port(), &TransportConfig::default())
            .await
            .unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_is_io_error() {
        // Bind then drop to get a port with no listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect("127.0.0.1", addr.port(), &TransportConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
