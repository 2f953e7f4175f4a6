//! Chat-room directory
//!
//! The server-held registry mapping room names to multicast coordinates.
//! All mutation goes through [`RoomDirectory`]; connection handlers never
//! touch the map directly.

mod client;
mod server;

pub use client::*;
pub use server::*;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::RwLock;

use crate::protocol::MULTICAST_OCTET;

/// Longest line either side of the text protocol accepts. The binary side
/// caps payloads the same way; a peer that streams bytes without a newline
/// must not grow our buffers without bound.
pub(crate) const MAX_LINE_LEN: usize = 1024;

/// Read one `\n`-terminated line, without the newline. Returns `None` on a
/// clean end of stream and `InvalidData` once the line passes [`MAX_LINE_LEN`].
pub(crate) async fn read_bounded_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos, true),
            None => (available.len(), false),
        };
        line.extend_from_slice(&available[..used]);
        reader.consume(used + usize::from(done));
        if line.len() > MAX_LINE_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", MAX_LINE_LEN),
            ));
        }
        if done {
            break;
        }
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Directory errors. The room-creation variants are recoverable: they are
/// reported to the client as text and the connection stays open.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("chat room already exists: {0}")]
    DuplicateName(String),

    #[error("invalid multicast address {0}: must be in 239.0.0.0-239.255.255.255")]
    InvalidAddress(Ipv4Addr),

    #[error("address {0}:{1} is already in use by another chat room")]
    AddressInUse(Ipv4Addr, u16),

    #[error("chat room not found: {0}")]
    NotFound(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A chat room: immutable once created, destroyed only by `deleteroom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub name: String,
    pub address: Ipv4Addr,
    pub port: u16,
}

/// In-memory room registry, shared across connection handlers.
///
/// Held for the server process's whole lifetime; starts empty and is never
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: Arc<RwLock<HashMap<String, Room>>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room. Validation order: name uniqueness, address range,
    /// (address, port) uniqueness. On any failure the directory is unchanged.
    pub async fn make_room(
        &self,
        name: &str,
        address: Ipv4Addr,
        port: u16,
    ) -> DirectoryResult<Room> {
        let mut rooms = self.rooms.write().await;

        if rooms.contains_key(name) {
            return Err(DirectoryError::DuplicateName(name.to_string()));
        }
        if address.octets()[0] != MULTICAST_OCTET {
            return Err(DirectoryError::InvalidAddress(address));
        }
        if rooms
            .values()
            .any(|r| r.address == address && r.port == port)
        {
            return Err(DirectoryError::AddressInUse(address, port));
        }

        let room = Room {
            name: name.to_string(),
            address,
            port,
        };
        rooms.insert(name.to_string(), room.clone());
        Ok(room)
    }

    /// Remove a room by name.
    pub async fn delete_room(&self, name: &str) -> DirectoryResult<()> {
        let mut rooms = self.rooms.write().await;
        rooms
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    /// Look up a room's multicast coordinates.
    pub async fn get_info(&self, name: &str) -> DirectoryResult<(Ipv4Addr, u16)> {
        let rooms = self.rooms.read().await;
        rooms
            .get(name)
            .map(|r| (r.address, r.port))
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    /// Snapshot of the full mapping.
    pub async fn snapshot(&self) -> Vec<Room> {
        let rooms = self.rooms.read().await;
        rooms.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
