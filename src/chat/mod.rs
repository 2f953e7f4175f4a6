//! Multicast chat channel
//!
//! A client joins a room's multicast group independently of the control
//! connection. Messages are UTF-8 datagrams of the form `"name: text"`; every
//! group member receives every message, the sender included (no
//! self-filtering). Leaving signals the receive loop explicitly, so the loop
//! stops without a teardown race.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::network::bind_reuse_udp;

/// Chat errors
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("not a multicast address: {0}")]
    NotMulticast(Ipv4Addr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("membership already ended")]
    Ended,
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Largest chat datagram accepted.
const MAX_DATAGRAM: usize = 1024;

/// One message received from the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Sender's UDP endpoint
    pub from: SocketAddr,
    /// Full display text (`"name: text"`)
    pub text: String,
}

/// An active multicast group membership.
///
/// Created by `join`, destroyed by `leave` (or drop). A client holds at most
/// one at a time; the console layer enforces that by owning an
/// `Option<ChatMembership>`.
#[derive(Debug)]
pub struct ChatMembership {
    group: Ipv4Addr,
    port: u16,
    socket: Arc<UdpSocket>,
    shutdown_tx: mpsc::Sender<()>,
    recv_task: JoinHandle<()>,
}

impl ChatMembership {
    /// Bind the group port on all interfaces, join the group with the
    /// wildcard interface selector, and start the background receive loop.
    /// Received messages arrive on the returned channel.
    pub async fn join(
        group: Ipv4Addr,
        port: u16,
    ) -> ChatResult<(Self, mpsc::Receiver<ChatMessage>)> {
        if !group.is_multicast() {
            return Err(ChatError::NotMulticast(group));
        }

        let bind: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
        let socket = bind_reuse_udp(bind)?;
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        // Members must hear their own messages.
        socket.set_multicast_loop_v4(true)?;
        let socket = Arc::new(socket);

        let (msg_tx, msg_rx) = mpsc::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let recv_socket = socket.clone();
        let recv_task = tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM];
            loop {
                tokio::select! {
                    result = recv_socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, from)) => {
                                let text = String::from_utf8_lossy(&buf[..len]).into_owned();
                                if msg_tx.send(ChatMessage { from, text }).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                // A receive error after the socket goes away
                                // means the membership ended, not a fault.
                                tracing::debug!("Chat receive loop ending: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
            tracing::debug!("Chat receive loop stopped");
        });

        tracing::info!("Joined multicast group {}:{}", group, port);

        Ok((
            Self {
                group,
                port,
                socket,
                shutdown_tx,
                recv_task,
            },
            msg_rx,
        ))
    }

    pub fn group(&self) -> Ipv4Addr {
        self.group
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send a message to the group, prefixed with the display name. The
    /// sender receives its own copy like any other member.
    pub async fn send(&self, display_name: &str, text: &str) -> ChatResult<()> {
        let datagram = format!("{}: {}", display_name, text);
        let target = SocketAddrV4::new(self.group, self.port);
        self.socket.send_to(datagram.as_bytes(), target).await?;
        Ok(())
    }

    /// Stop the receive loop and release the membership.
    pub async fn leave(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.socket.leave_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED);
        let _ = self.recv_task.await;
        tracing::info!("Left multicast group {}:{}", self.group, self.port);
    }
}
