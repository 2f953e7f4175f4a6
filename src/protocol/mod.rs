//! Protocol module - Defines the wire protocol for CastNet exchanges
//!
//! File-transfer requests use a compact binary layout (big-endian):
//! - 1 byte command
//! - 1 byte name length + name (GET, PUT)
//! - 8 bytes payload length + payload (PUT)
//!
//! Responses carry an 8 byte payload length followed by the payload. The room
//! directory speaks a separate whitespace-tokenized text protocol, kept as a
//! compatibility mode (see `directory`).

mod codec;
mod command;

pub use codec::*;
pub use command::*;

use std::net::Ipv4Addr;
use std::time::Duration;

/// Width of the command field
pub const CMD_FIELD_LEN: usize = 1;

/// Width of the file name length field
pub const NAME_LEN_FIELD_LEN: usize = 1;

/// Width of the payload length field
pub const PAYLOAD_LEN_FIELD_LEN: usize = 8;

/// Hard cap on a single payload (1 GiB)
pub const MAX_PAYLOAD_SIZE: u64 = 1024 * 1024 * 1024;

/// Idle timeout covering one byte-exact read
pub const READ_TIMEOUT: Duration = Duration::from_secs(4);

/// Fixed ASCII token a client broadcasts to locate a server
pub const DISCOVERY_TOKEN: &str = "SERVICE DISCOVERY";

/// Well-known UDP port for service discovery
pub const DISCOVERY_PORT: u16 = 30000;

/// Well-known TCP port for the file-sharing service
pub const FILE_SHARING_PORT: u16 = 30001;

/// Well-known TCP port for the chat-room directory service
pub const CHAT_CONTROL_PORT: u16 = 5000;

/// Base address of the administratively scoped multicast block rooms live in
pub const MULTICAST_BASE: Ipv4Addr = Ipv4Addr::new(239, 0, 0, 1);

/// First octet every room address must carry
pub const MULTICAST_OCTET: u8 = 239;
