use crate::chord::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;
use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use std::net::SocketAddr;
use tokio::net::UdpSocket;

/// Best-effort, connectionless datagram delivery.
///
/// Implementations may drop, reorder or duplicate datagrams; the protocol
/// recovers through its own retry paths. Payload size limits are enforced by
/// the envelope codec, not here.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    fn local_addr(&self) -> SocketAddr;

    async fn send_to(&self, payload: &[u8], to: SocketAddr) -> Result<(), NetworkError>;

    /// Waits for the next datagram and its sender.
    async fn recv_from(&self) -> Result<(Bytes, SocketAddr), NetworkError>;
}

/// UDP socket transport.
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Binds `addr`; port 0 picks a free port, reported by [`Transport::local_addr`].
    pub async fn bind(addr: SocketAddr) -> Result<Self, NetworkError> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        info!("UDP transport bound to {}", local_addr);
        Ok(Self { socket, local_addr })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, payload: &[u8], to: SocketAddr) -> Result<(), NetworkError> {
        self.socket.send_to(payload, to).await?;
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Bytes, SocketAddr), NetworkError> {
        // one spare byte so an oversized datagram shows up as oversized, not truncated
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((Bytes::from(buf), from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn udp_round_trip() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();
        assert_ne!(a.local_addr().port(), 0);

        a.send_to(b"hello", b.local_addr()).await.unwrap();
        let (payload, from) = b.recv_from().await.unwrap();
        assert_eq!(&payload[..], b"hello");
        assert_eq!(from, a.local_addr());
    }

    #[tokio::test]
    async fn oversized_datagram_is_not_truncated_to_the_limit() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();

        let big = vec![b'x'; MAX_DATAGRAM_SIZE + 100];
        a.send_to(&big, b.local_addr()).await.unwrap();
        let (payload, _) = b.recv_from().await.unwrap();
        assert!(payload.len() > MAX_DATAGRAM_SIZE);
    }
}
