//! Service discovery
//!
//! A client broadcasts the fixed `SERVICE DISCOVERY` token over UDP to the
//! well-known port; a listening server that recognizes the token replies once
//! with its service name to the sender's address. The client waits a bounded
//! time and acts on the first reply only - no retries, no aggregation.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::network::bind_reuse_udp;
use crate::protocol::{DISCOVERY_PORT, DISCOVERY_TOKEN};

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("discovery timeout: no reply within {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Responder already running")]
    AlreadyRunning,

    #[error("Responder not running")]
    NotRunning,
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// The broadcast target a client probes by default.
pub fn broadcast_target() -> SocketAddr {
    SocketAddrV4::new(Ipv4Addr::BROADCAST, DISCOVERY_PORT).into()
}

/// Server-side discovery responder.
pub struct Responder {
    service_name: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl Responder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            shutdown_tx: None,
            local_addr: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the discovery port and spawn the listen loop. Datagrams carrying
    /// anything other than the token are ignored.
    pub async fn start(&mut self, bind: SocketAddr) -> DiscoveryResult<SocketAddr> {
        if self.shutdown_tx.is_some() {
            return Err(DiscoveryError::AlreadyRunning);
        }

        let socket = bind_reuse_udp(bind)?;
        let local_addr = socket.local_addr()?;
        self.local_addr = Some(local_addr);
        tracing::info!("Discovery responder listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let service_name = self.service_name.clone();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                tokio::select! {
                    result = socket.recv_from(&mut buf) => {
                        match result {
                            Ok((len, from)) => {
                                if &buf[..len] == DISCOVERY_TOKEN.as_bytes() {
                                    tracing::info!("Discovery request from {}", from);
                                    if let Err(e) = socket
                                        .send_to(service_name.as_bytes(), from)
                                        .await
                                    {
                                        tracing::warn!("Discovery reply to {} failed: {}", from, e);
                                    }
                                } else {
                                    tracing::debug!("Ignoring non-token datagram from {}", from);
                                }
                            }
                            Err(e) => {
                                tracing::error!("Discovery receive error: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Discovery responder shutdown requested");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    pub async fn stop(&mut self) -> DiscoveryResult<()> {
        match self.shutdown_tx.take() {
            Some(tx) => {
                let _ = tx.send(()).await;
                Ok(())
            }
            None => Err(DiscoveryError::NotRunning),
        }
    }
}

/// Probe for a server and return its service name.
///
/// Sends the token once to `target` (normally [`broadcast_target`]) and waits
/// up to `wait` for the first reply.
pub async fn discover(target: SocketAddr, wait: Duration) -> DiscoveryResult<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    socket.send_to(DISCOVERY_TOKEN.as_bytes(), target).await?;
    tracing::debug!("Sent discovery token to {}", target);

    let mut buf = [0u8; 1024];
    match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => {
            let name = String::from_utf8_lossy(&buf[..len]).into_owned();
            tracing::info!("Discovered \"{}\" at {}", name, from);
            Ok(name)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(DiscoveryError::Timeout(wait)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn live_responder_returns_service_name() {
        let mut responder = Responder::new("Test File Sharing Service");
        let addr = responder
            .start("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let name = discover(addr, Duration::from_secs(3)).await.unwrap();
        assert_eq!(name, "Test File Sharing Service");

        responder.stop().await.unwrap();
    }

    #[tokio::test]
    async fn no_responder_times_out() {
        // An unrelated bound socket that never replies.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = silent.local_addr().unwrap();

        let err = discover(target, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Timeout(_)));
    }

    #[tokio::test]
    async fn non_token_datagrams_are_ignored() {
        let mut responder = Responder::new("svc");
        let addr = responder
            .start("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        probe.send_to(b"NOT THE TOKEN", addr).await.unwrap();

        let mut buf = [0u8; 64];
        let reply = tokio::time::timeout(Duration::from_millis(300), probe.recv_from(&mut buf)).await;
        assert!(reply.is_err(), "responder must stay silent");

        responder.stop().await.unwrap();
    }
}
