//! UDP transport for gossip messages
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::debug;

use super::messages::GossipMessage;
use crate::error::{GossipError, Result};

/// Largest datagram we will read
pub const MAX_PACKET_SIZE: usize = 65_536;

#[derive(Debug)]
pub struct GossipTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl GossipTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(GossipError::Bind)?;
        let local_addr = socket.local_addr().map_err(GossipError::Bind)?;
        debug!("Gossip transport bound to {}", local_addr);
        Ok(Self { socket, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn send(&self, target: SocketAddr, message: &GossipMessage) -> Result<()> {
        let bytes = message.encode()?;
        self.socket.send_to(&bytes, target).await?;
        Ok(())
    }

    /// Wait for the next datagram and decode it
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(GossipMessage, SocketAddr)> {
        let (len, from) = self.socket.recv_from(buf).await?;
        let message = GossipMessage::decode(&buf[..len])?;
        Ok((message, from))
    }
}

/// Local IP the OS would use to reach `target`; nothing is sent
pub async fn outbound_ip(target: SocketAddr) -> Option<std::net::IpAddr> {
    let bind: SocketAddr = if target.is_ipv4() {
        "0.0.0.0:0".parse().ok()?
    } else {
        "[::]:0".parse().ok()?
    };
    let socket = UdpSocket::bind(bind).await.ok()?;
    socket.connect(target).await.ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
