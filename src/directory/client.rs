//! Client side of the text directory protocol

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::read_bounded_line;

/// Directory client errors
#[derive(Error, Debug)]
pub enum DirectoryClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Server closed the connection")]
    ServerClosed,
}

pub type DirectoryClientResult<T> = Result<T, DirectoryClientError>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// One control connection to the room directory. Each request line gets one
/// reply line.
pub struct DirectoryClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl DirectoryClient {
    pub async fn connect(addr: SocketAddr) -> DirectoryClientResult<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| DirectoryClientError::Timeout)??;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        })
    }

    /// Send one request line and wait for its reply line.
    pub async fn request(&mut self, line: &str) -> DirectoryClientResult<String> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        // Replies are bounded like request lines; a server streaming garbage
        // without a newline gets dropped instead of growing our buffer.
        match read_bounded_line(&mut self.reader).await? {
            Some(reply) => Ok(reply),
            None => Err(DirectoryClientError::ServerClosed),
        }
    }
}
