//! Byte-exact stream reads
//!
//! Every multi-byte read in the protocol goes through [`read_exact_timeout`]:
//! it returns exactly the requested byte count or fails. Partial data is never
//! surfaced to callers.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to read {wanted} bytes: idle timeout after {timeout:?}")]
    Timeout { wanted: usize, timeout: Duration },

    #[error("failed to read {wanted} bytes: peer closed the connection")]
    PeerClosed { wanted: usize },

    #[error("failed to read {wanted} bytes: {source}")]
    Io {
        wanted: usize,
        #[source]
        source: io::Error,
    },
}

pub type TransportResult<T> = Result<T, TransportError>;

impl TransportError {
    /// True when the failure was the peer going away rather than a local fault.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, TransportError::PeerClosed { .. })
    }
}

/// Read exactly `wanted` bytes from the stream, accumulating across partial
/// deliveries. The timeout covers the whole accumulation; after a successful
/// return it has no effect on later reads.
///
/// A zero-length receive before `wanted` bytes arrive means the peer closed
/// and fails the read immediately.
pub async fn read_exact_timeout<R>(
    stream: &mut R,
    wanted: usize,
    timeout: Duration,
) -> TransportResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; wanted];

    match tokio::time::timeout(timeout, stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => Ok(buf),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(TransportError::PeerClosed { wanted })
        }
        Ok(Err(e)) => Err(TransportError::Io { wanted, source: e }),
        Err(_) => Err(TransportError::Timeout { wanted, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn collects_fragmented_delivery_in_order() {
        let (mut writer, mut reader) = socket_pair().await;

        let payload: Vec<u8> = (0u8..200).collect();
        let pieces: Vec<Vec<u8>> = payload.chunks(7).map(|c| c.to_vec()).collect();

        tokio::spawn(async move {
            for piece in pieces {
                writer.write_all(&piece).await.unwrap();
                writer.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let got = read_exact_timeout(&mut reader, payload.len(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(got, payload);
    }

    #[tokio::test]
    async fn early_close_is_never_a_short_success() {
        let (mut writer, mut reader) = socket_pair().await;

        tokio::spawn(async move {
            writer.write_all(b"abc").await.unwrap();
            writer.shutdown().await.unwrap();
        });

        let err = read_exact_timeout(&mut reader, 10, TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.is_peer_closed(), "expected PeerClosed, got {err}");
    }

    #[tokio::test]
    async fn idle_stream_times_out() {
        let (_writer, mut reader) = socket_pair().await;

        let err = read_exact_timeout(&mut reader, 4, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { wanted: 4, .. }));
    }

    #[tokio::test]
    async fn timeout_does_not_leak_into_later_reads() {
        let (mut writer, mut reader) = socket_pair().await;

        writer.write_all(b"ab").await.unwrap();
        let first = read_exact_timeout(&mut reader, 2, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(first, b"ab");

        // A later read gets its own full window.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            writer.write_all(b"cd").await.unwrap();
        });
        let second = read_exact_timeout(&mut reader, 2, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(second, b"cd");
    }
}
