//! File-sharing client
//!
//! Connects to a file server and issues framed exchanges. GET and PUT are one
//! exchange per connection (the server closes afterwards), so those methods
//! consume the client; LIST and the reserved probes keep the session alive.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::protocol::{self, Command, ProtocolError};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Connection timeout")]
    Timeout,

    #[error("server reply is not valid UTF-8")]
    BadReply,
}

pub type ClientResult<T> = Result<T, ClientError>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// One control connection to a file-sharing server.
pub struct FileClient {
    stream: TcpStream,
    read_timeout: Duration,
}

impl FileClient {
    pub async fn connect(addr: SocketAddr) -> ClientResult<Self> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;
        tracing::debug!("Connected to file service at {}", addr);
        Ok(Self {
            stream,
            read_timeout: protocol::READ_TIMEOUT,
        })
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Request the server's file listing. The session stays open.
    pub async fn list(&mut self) -> ClientResult<String> {
        let frame = protocol::encode_command(Command::List);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        let payload = protocol::read_sized_payload(&mut self.stream, self.read_timeout).await?;
        String::from_utf8(payload).map_err(|_| ClientError::BadReply)
    }

    /// Download a file. One exchange per connection: the server closes after
    /// the transfer, so this consumes the client.
    pub async fn get(mut self, name: &str) -> ClientResult<Vec<u8>> {
        let frame = protocol::encode_get_request(name)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        let data = protocol::read_sized_payload(&mut self.stream, self.read_timeout).await?;
        tracing::debug!("Downloaded {} ({} bytes)", name, data.len());
        Ok(data)
    }

    /// Upload a file and return the server's acknowledgement text. Consumes
    /// the client for the same reason as [`FileClient::get`].
    pub async fn put(mut self, name: &str, data: &[u8]) -> ClientResult<String> {
        let frame = protocol::encode_put_request(name, data)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        let ack = protocol::read_sized_payload(&mut self.stream, self.read_timeout).await?;
        tracing::debug!("Uploaded {} ({} bytes)", name, data.len());
        String::from_utf8(ack).map_err(|_| ClientError::BadReply)
    }

    /// End the session. Returns the server's farewell text.
    pub async fn bye(mut self) -> ClientResult<String> {
        let frame = protocol::encode_command(Command::Bye);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        let ack = protocol::read_sized_payload(&mut self.stream, self.read_timeout).await?;
        let _ = self.stream.shutdown().await;
        String::from_utf8(ack).map_err(|_| ClientError::BadReply)
    }

    /// Send the reserved SCAN probe (no reply is defined).
    pub async fn scan(&mut self) -> ClientResult<()> {
        let frame = protocol::encode_command(Command::Scan);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send the reserved CONNECT probe (no reply is defined).
    pub async fn connect_probe(&mut self) -> ClientResult<()> {
        let frame = protocol::encode_command(Command::Connect);
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
