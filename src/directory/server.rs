//! Room directory server
//!
//! Exposes the directory as whitespace-tokenized text request/response lines
//! over TCP. This wire format predates the binary file-transfer framing and is
//! kept as an explicit compatibility mode: one request line in, one reply line
//! out. Validation failures are reported inline and the connection stays open.

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use super::{read_bounded_line, RoomDirectory};

/// Directory server errors
#[derive(Error, Debug)]
pub enum DirectoryServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server not running")]
    NotRunning,
}

pub type DirectoryServerResult<T> = Result<T, DirectoryServerError>;

/// Chat-room directory server (one task per accepted connection).
pub struct DirectoryServer {
    directory: RoomDirectory,
    shutdown_tx: Option<mpsc::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl DirectoryServer {
    pub fn new(directory: RoomDirectory) -> Self {
        Self {
            directory,
            shutdown_tx: None,
            local_addr: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind and spawn the accept loop. Returns the bound address.
    pub async fn start(&mut self, bind: SocketAddr) -> DirectoryServerResult<SocketAddr> {
        if self.shutdown_tx.is_some() {
            return Err(DirectoryServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(bind).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("Room directory listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let directory = self.directory.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                tracing::info!("Directory connection from {}", addr);
                                let directory = directory.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_client(stream, addr, directory).await {
                                        tracing::warn!("Directory client {} ended: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Directory accept error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Directory server shutdown requested");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    pub async fn stop(&mut self) -> DirectoryServerResult<()> {
        match self.shutdown_tx.take() {
            Some(tx) => {
                let _ = tx.send(()).await;
                Ok(())
            }
            None => Err(DirectoryServerError::NotRunning),
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    directory: RoomDirectory,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    // Oversized lines propagate as InvalidData: fail-closed, no reply, like
    // the binary side's payload cap.
    while let Some(line) = read_bounded_line(&mut reader).await? {
        let (reply, close) = execute_command(&directory, &line).await;
        write_half.write_all(reply.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
        write_half.flush().await?;
        if close {
            break;
        }
    }

    tracing::info!("Directory connection {} closed", addr);
    Ok(())
}

/// Execute one whitespace-tokenized request line. Returns the reply line and
/// whether the connection should close afterwards.
pub async fn execute_command(directory: &RoomDirectory, line: &str) -> (String, bool) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    tracing::debug!("Directory command: {:?}", parts);

    match parts.as_slice() {
        ["getdir"] => {
            let mut rooms = directory.snapshot().await;
            rooms.sort_by(|a, b| a.name.cmp(&b.name));
            let listing = rooms
                .iter()
                .map(|r| format!("{} {} {}", r.name, r.address, r.port))
                .collect::<Vec<_>>()
                .join(", ");
            (listing, false)
        }
        ["makeroom", name, address, port] => {
            let address: Ipv4Addr = match address.parse() {
                Ok(a) => a,
                Err(_) => {
                    return (
                        format!("Invalid multicast address: {}", address),
                        false,
                    )
                }
            };
            let port: u16 = match port.parse() {
                Ok(p) => p,
                Err(_) => return (format!("Invalid port: {}", port), false),
            };
            match directory.make_room(name, address, port).await {
                Ok(room) => (
                    format!(
                        "Chat room {} created with address {} and port {}",
                        room.name, room.address, room.port
                    ),
                    false,
                ),
                Err(e) => (e.to_string(), false),
            }
        }
        ["makeroom", ..] => (
            "Invalid makeroom command. Usage: makeroom <name> <address> <port>".to_string(),
            false,
        ),
        ["deleteroom", name] => match directory.delete_room(name).await {
            Ok(()) => (format!("Chat room {} deleted", name), false),
            Err(e) => (e.to_string(), false),
        },
        ["deleteroom", ..] => (
            "Invalid deleteroom command. Usage: deleteroom <name>".to_string(),
            false,
        ),
        ["getinfo", name] => match directory.get_info(name).await {
            Ok((address, port)) => (format!("{} {}", address, port), false),
            Err(e) => (e.to_string(), false),
        },
        ["getinfo", ..] => (
            "Invalid getinfo command. Usage: getinfo <name>".to_string(),
            false,
        ),
        ["bye"] => ("Connection closed".to_string(), true),
        _ => ("Invalid command".to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryClient;

    #[tokio::test]
    async fn text_command_round_trip() {
        let dir = RoomDirectory::new();

        let (reply, close) = execute_command(&dir, "makeroom r1 239.0.0.1 9000").await;
        assert!(reply.contains("created"), "{reply}");
        assert!(!close);

        let (reply, _) = execute_command(&dir, "getinfo r1").await;
        assert_eq!(reply, "239.0.0.1 9000");

        let (reply, _) = execute_command(&dir, "getdir").await;
        assert_eq!(reply, "r1 239.0.0.1 9000");

        let (reply, _) = execute_command(&dir, "deleteroom r1").await;
        assert_eq!(reply, "Chat room r1 deleted");

        let (reply, _) = execute_command(&dir, "getinfo r1").await;
        assert_eq!(reply, "chat room not found: r1");
    }

    #[tokio::test]
    async fn invalid_address_is_rejected_with_text_reply() {
        let dir = RoomDirectory::new();
        let (reply, close) = execute_command(&dir, "makeroom r1 238.0.0.1 5000").await;
        assert!(reply.contains("invalid multicast address"), "{reply}");
        assert!(!close);
        assert!(dir.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_commands_keep_connection_open() {
        let dir = RoomDirectory::new();
        let (reply, close) = execute_command(&dir, "makeroom onlyname").await;
        assert!(reply.starts_with("Invalid makeroom"));
        assert!(!close);

        let (reply, close) = execute_command(&dir, "frobnicate").await;
        assert_eq!(reply, "Invalid command");
        assert!(!close);
    }

    #[tokio::test]
    async fn bye_closes_the_connection() {
        let dir = RoomDirectory::new();
        let (reply, close) = execute_command(&dir, "bye").await;
        assert_eq!(reply, "Connection closed");
        assert!(close);
    }

    #[tokio::test]
    async fn endless_line_without_newline_drops_connection() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut server = DirectoryServer::new(RoomDirectory::new());
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let mut raw = TcpStream::connect(addr).await.unwrap();
        // A peer that never sends a newline must not grow server memory
        // without bound; past the line cap the connection is dropped.
        let _ = raw.write_all(&vec![b'a'; 64 * 1024]).await;

        let mut buf = Vec::new();
        match raw.read_to_end(&mut buf).await {
            // Clean close, nothing was replied.
            Ok(n) => assert_eq!(n, 0),
            // A reset from dropping unread bytes also means no reply.
            Err(_) => {}
        }

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn server_round_trip_over_tcp() {
        let mut server = DirectoryServer::new(RoomDirectory::new());
        let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let mut client = DirectoryClient::connect(addr).await.unwrap();
        let reply = client.request("makeroom lobby 239.0.0.7 7000").await.unwrap();
        assert!(reply.contains("created"), "{reply}");

        let reply = client.request("getinfo lobby").await.unwrap();
        assert_eq!(reply, "239.0.0.7 7000");

        // Validation failure leaves the connection usable.
        let reply = client.request("makeroom lobby 239.0.0.8 7001").await.unwrap();
        assert!(reply.contains("already exists"), "{reply}");

        let reply = client.request("bye").await.unwrap();
        assert_eq!(reply, "Connection closed");

        server.stop().await.unwrap();
    }
}
