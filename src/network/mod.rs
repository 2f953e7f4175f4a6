//! Network module - TCP file-sharing service and shared socket helpers
//!
//! Provides:
//! - Server accepting file-transfer control connections
//! - Client for issuing LIST/GET/PUT exchanges
//! - UDP bind helper with address reuse (shared by chat and discovery)

mod client;
mod server;

pub use client::*;
pub use server::*;

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind a UDP socket with SO_REUSEADDR so several processes on one host can
/// share a discovery or multicast port, then hand it to tokio.
pub fn bind_reuse_udp(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Resolve a hostname to a socket address.
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuse_bind_allows_two_sockets_on_one_port() {
        let first = bind_reuse_udp("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = first.local_addr().unwrap().port();
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        bind_reuse_udp(addr).expect("second bind on reused port");
    }

    #[tokio::test]
    async fn resolve_localhost() {
        let addr = resolve_host("localhost", 1234).await.unwrap();
        assert_eq!(addr.port(), 1234);
    }
}
