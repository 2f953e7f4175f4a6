//! File-sharing server
//!
//! Accepts control connections and runs the per-connection command
//! dispatcher. Each accepted connection gets its own task; the accept loop
//! never blocks on a connection's traffic.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::files::{FileStore, FileStoreError};
use crate::protocol::{self, Command, ProtocolError};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Reply sent for BYE before the connection closes.
const BYE_ACK: &str = "Connection closed";

/// File-sharing server.
pub struct FileServer {
    store: FileStore,
    read_timeout: Duration,
    shutdown_tx: Option<mpsc::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl FileServer {
    pub fn new(store: FileStore) -> Self {
        Self {
            store,
            read_timeout: protocol::READ_TIMEOUT,
            shutdown_tx: None,
            local_addr: None,
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind and spawn the accept loop. Returns the bound address.
    pub async fn start(&mut self, bind: SocketAddr) -> ServerResult<SocketAddr> {
        if self.shutdown_tx.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("File-sharing service listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let store = self.store.clone();
        let read_timeout = self.read_timeout;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::info!("File connection from {}", addr);
                                let store = store.clone();
                                tokio::spawn(async move {
                                    handle_connection(stream, addr, store, read_timeout).await;
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("File server shutdown requested");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    pub async fn stop(&mut self) -> ServerResult<()> {
        match self.shutdown_tx.take() {
            Some(tx) => {
                let _ = tx.send(()).await;
                Ok(())
            }
            None => Err(ServerError::NotRunning),
        }
    }
}

/// Dispatcher outcome for one handled command.
enum Dispatch {
    /// Return to awaiting the next command byte.
    Continue,
    /// The exchange is complete and the connection closes.
    Close,
}

/// Per-connection dispatcher loop.
///
/// Blocks on one command byte, dispatches by value, and loops until a handler
/// closes the connection. Any transport or protocol failure tears down this
/// connection only: fail-closed, no reply.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    store: FileStore,
    timeout: Duration,
) {
    loop {
        let cmd = match protocol::read_command(&mut stream, timeout).await {
            Ok(cmd) => cmd,
            Err(ProtocolError::Transport(e)) if e.is_peer_closed() => {
                tracing::info!("Connection {} closed by peer", addr);
                return;
            }
            Err(e) => {
                tracing::warn!("Dropping connection {}: {}", addr, e);
                return;
            }
        };

        let result = match cmd {
            Command::List => handle_list(&mut stream, &store).await,
            Command::Get => handle_get(&mut stream, &store, timeout).await,
            Command::Put => handle_put(&mut stream, &store, timeout).await,
            Command::Bye => handle_bye(&mut stream).await,
            Command::Connect => {
                tracing::debug!("CONNECT from {} (reserved, no-op)", addr);
                Ok(Dispatch::Continue)
            }
            Command::Scan => {
                tracing::debug!("SCAN from {} (reserved, no-op)", addr);
                Ok(Dispatch::Continue)
            }
        };

        match result {
            Ok(Dispatch::Continue) => continue,
            Ok(Dispatch::Close) => {
                let _ = stream.shutdown().await;
                return;
            }
            Err(e) => {
                tracing::warn!("Dropping connection {}: {}", addr, e);
                return;
            }
        }
    }
}

/// Handler errors are always fatal to the connection.
#[derive(Error, Debug)]
enum HandlerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("file store: {0}")]
    Store(#[from] FileStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

async fn handle_list(stream: &mut TcpStream, store: &FileStore) -> Result<Dispatch, HandlerError> {
    let listing = store.list().await?;
    send_response(stream, listing.as_bytes()).await?;
    tracing::info!("Sent file listing ({} bytes)", listing.len());
    Ok(Dispatch::Continue)
}

async fn handle_get(
    stream: &mut TcpStream,
    store: &FileStore,
    timeout: Duration,
) -> Result<Dispatch, HandlerError> {
    let name = protocol::read_name(stream, timeout).await?;

    match store.read(&name).await {
        Ok(data) => {
            send_response(stream, &data).await?;
            tracing::info!("Sent file {} ({} bytes)", name, data.len());
            Ok(Dispatch::Close)
        }
        Err(FileStoreError::NotFound(_)) => {
            // A GET miss closes with no data frame.
            tracing::warn!("Requested file is not available: {}", name);
            Ok(Dispatch::Close)
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_put(
    stream: &mut TcpStream,
    store: &FileStore,
    timeout: Duration,
) -> Result<Dispatch, HandlerError> {
    let name = protocol::read_name(stream, timeout).await?;
    let data = protocol::read_sized_payload(stream, timeout).await?;

    let path = store.write(&name, &data).await?;
    tracing::info!("Stored upload {} ({} bytes)", path.display(), data.len());

    let ack = format!("File {} uploaded ({} bytes)", name, data.len());
    send_response(stream, ack.as_bytes()).await?;
    Ok(Dispatch::Close)
}

async fn handle_bye(stream: &mut TcpStream) -> Result<Dispatch, HandlerError> {
    send_response(stream, BYE_ACK.as_bytes()).await?;
    tracing::info!("BYE received, closing");
    Ok(Dispatch::Close)
}

async fn send_response(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    let frame = protocol::encode_response(payload);
    stream.write_all(&frame).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::FileClient;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    async fn start_server(root: &std::path::Path) -> (FileServer, SocketAddr) {
        let mut server = FileServer::new(FileStore::new(root));
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (server, addr)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let (_server, addr) = start_server(dir.path()).await;

        let content: Vec<u8> = (0u8..=255).cycle().take(5000).collect();

        let client = FileClient::connect(addr).await.unwrap();
        let ack = client.put("blob.bin", &content).await.unwrap();
        assert!(ack.contains("blob.bin"), "{ack}");

        let client = FileClient::connect(addr).await.unwrap();
        let got = client.get("blob.bin").await.unwrap();
        assert_eq!(got, content);
    }

    #[tokio::test]
    async fn list_reports_uploaded_files_and_connection_stays_open() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("one.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("two.txt"), b"2").unwrap();
        let (_server, addr) = start_server(dir.path()).await;

        let mut client = FileClient::connect(addr).await.unwrap();
        let listing = client.list().await.unwrap();
        let names: Vec<&str> = listing.lines().collect();
        assert!(names.contains(&"one.txt"));
        assert!(names.contains(&"two.txt"));

        // LIST returns to the dispatch loop; a second exchange works on the
        // same connection.
        let listing_again = client.list().await.unwrap();
        assert_eq!(listing, listing_again);

        let ack = client.bye().await.unwrap();
        assert_eq!(ack, BYE_ACK);
    }

    #[tokio::test]
    async fn get_miss_closes_with_no_data_frame() {
        let dir = tempdir().unwrap();
        let (_server, addr) = start_server(dir.path()).await;

        let client = FileClient::connect(addr).await.unwrap();
        let err = client.get("missing.txt").await.unwrap_err();
        // The server closes silently; the client sees the close while waiting
        // for the response frame.
        assert!(err.to_string().contains("failed to read"), "{err}");
    }

    #[tokio::test]
    async fn unknown_command_drops_connection_without_reply() {
        let dir = tempdir().unwrap();
        let (_server, addr) = start_server(dir.path()).await;

        let mut raw = TcpStream::connect(addr).await.unwrap();
        raw.write_all(&[0x04]).await.unwrap();

        // Fail-closed: the server closes without writing anything.
        let mut buf = Vec::new();
        let n = raw.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn zero_length_name_drops_connection() {
        let dir = tempdir().unwrap();
        let (_server, addr) = start_server(dir.path()).await;

        let mut raw = TcpStream::connect(addr).await.unwrap();
        raw.write_all(&[Command::Get.as_u8(), 0x00]).await.unwrap();

        let mut buf = Vec::new();
        let n = raw.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn scan_and_connect_are_no_ops_that_keep_the_session() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), b"x").unwrap();
        let (_server, addr) = start_server(dir.path()).await;

        let mut client = FileClient::connect(addr).await.unwrap();
        client.scan().await.unwrap();
        client.connect_probe().await.unwrap();
        // The session is still serving commands afterwards.
        let listing = client.list().await.unwrap();
        assert_eq!(listing, "f.txt");
    }
}
