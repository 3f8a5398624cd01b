use crate::chord::DEFAULT_RECV_TIMEOUT;
use crate::error::{ChordError, DhtError};
use crate::network::messages::Message;
use crate::network::transport::{Transport, UdpTransport};
use log::{debug, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};

/// Issues PUT/GET requests to any ring member.
///
/// The contacted node routes the request around the ring; the owner replies
/// directly to this client's address. One attempt per call: a lost request or
/// reply surfaces as [`ChordError::NoReply`]. Replies carry no request id, so
/// anything already queued when a call starts is discarded as a late answer to
/// an earlier call.
pub struct DhtClient<T: Transport = UdpTransport> {
    transport: T,
    timeout: Duration,
}

impl DhtClient<UdpTransport> {
    pub async fn bind(addr: SocketAddr) -> Result<Self, DhtError> {
        Ok(Self::new(UdpTransport::bind(addr).await?))
    }
}

impl<T: Transport> DhtClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_RECV_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub async fn put(&self, contact: SocketAddr, key: &str, value: &str) -> Result<(), DhtError> {
        let request = Message::Put {
            key: key.to_string(),
            value: value.to_string(),
            from: Some(self.local_addr()),
        };
        match self.request(contact, key, request).await? {
            Message::Ack { .. } => Ok(()),
            other => Err(ChordError::UnexpectedReply(other.method().to_string()).into()),
        }
    }

    /// `Ok(None)` when the owning node has no value for `key`.
    pub async fn get(&self, contact: SocketAddr, key: &str) -> Result<Option<String>, DhtError> {
        let request = Message::Get {
            key: key.to_string(),
            from: Some(self.local_addr()),
        };
        match self.request(contact, key, request).await? {
            Message::Ack { value: Some(value) } => Ok(Some(value)),
            Message::NotFound { .. } => Ok(None),
            Message::Ack { value: None } => {
                Err(ChordError::UnexpectedReply("ACK without a value".to_string()).into())
            }
            other => Err(ChordError::UnexpectedReply(other.method().to_string()).into()),
        }
    }

    /// Drops datagrams that are already waiting without blocking.
    async fn drain_stale(&self) {
        while let Ok(Ok((_, from))) = timeout(Duration::ZERO, self.transport.recv_from()).await {
            debug!("Discarding stale datagram from {}", from);
        }
    }

    async fn request(
        &self,
        contact: SocketAddr,
        key: &str,
        request: Message,
    ) -> Result<Message, DhtError> {
        let payload = request.encode()?;
        self.drain_stale().await;
        self.transport.send_to(&payload, contact).await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let (bytes, from) = match timeout_at(deadline, self.transport.recv_from()).await {
                Ok(received) => received?,
                Err(_) => {
                    return Err(ChordError::NoReply {
                        peer: contact,
                        timeout: self.timeout,
                    }
                    .into())
                }
            };
            match Message::decode(&bytes) {
                Ok(Message::NotFound { key: missing }) if missing != key => {
                    debug!("Ignoring NOT_FOUND for {} from {}", missing, from)
                }
                Ok(reply @ (Message::Ack { .. } | Message::NotFound { .. })) => return Ok(reply),
                Ok(other) => debug!("Ignoring {} from {} while awaiting a reply", other.method(), from),
                Err(e) => warn!("Dropping malformed reply from {}: {}", from, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::memory::MemoryNetwork;

    fn addr(host: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, host], 7000))
    }

    #[tokio::test]
    async fn late_reply_to_a_timed_out_call_is_discarded() {
        let net = MemoryNetwork::new();
        let node = net.bind(addr(1)).unwrap();
        let client = DhtClient::new(net.bind(addr(2)).unwrap()).with_timeout(Duration::from_millis(50));

        let first = client.put(addr(1), "k", "v").await;
        assert!(matches!(first, Err(DhtError::Chord(ChordError::NoReply { .. }))));

        // the PUT's ACK shows up only after the client gave up on it
        let (put, from) = node.recv_from().await.unwrap();
        assert_eq!(Message::decode(&put).unwrap().method(), "PUT");
        node.send_to(&Message::Ack { value: None }.encode().unwrap(), from).await.unwrap();

        let responder = tokio::spawn(async move {
            let (get, from) = node.recv_from().await.unwrap();
            assert_eq!(Message::decode(&get).unwrap().method(), "GET");
            let stale = Message::NotFound { key: "other".into() };
            node.send_to(&stale.encode().unwrap(), from).await.unwrap();
            let reply = Message::Ack { value: Some("v".into()) };
            node.send_to(&reply.encode().unwrap(), from).await.unwrap();
            node
        });

        assert_eq!(client.get(addr(1), "k").await.unwrap(), Some("v".to_string()));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn not_found_for_the_requested_key_is_none() {
        let net = MemoryNetwork::new();
        let node = net.bind(addr(1)).unwrap();
        let client = DhtClient::new(net.bind(addr(2)).unwrap());

        let responder = tokio::spawn(async move {
            let (_, from) = node.recv_from().await.unwrap();
            let reply = Message::NotFound { key: "k".into() };
            node.send_to(&reply.encode().unwrap(), from).await.unwrap();
            node
        });

        assert_eq!(client.get(addr(1), "k").await.unwrap(), None);
        responder.await.unwrap();
    }
}
