use crate::error::NetworkError;
use crate::network::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use log::trace;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

type Datagram = (Bytes, SocketAddr);

/// An in-process datagram network.
///
/// Every bound address gets an unbounded inbox. Datagrams to unbound
/// addresses vanish, and a configurable fraction of all datagrams is dropped
/// to exercise the protocol's loss tolerance.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    inboxes: RwLock<HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
    loss_rate: RwLock<f64>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network that drops each datagram with probability `loss_rate`.
    pub fn lossy(loss_rate: f64) -> Self {
        let network = Self::default();
        network.set_loss_rate(loss_rate);
        network
    }

    pub fn set_loss_rate(&self, loss_rate: f64) {
        *self.inner.loss_rate.write() = loss_rate.clamp(0.0, 1.0);
    }

    pub fn bind(&self, addr: SocketAddr) -> Result<MemoryTransport, NetworkError> {
        let mut inboxes = self.inner.inboxes.write();
        if inboxes.contains_key(&addr) {
            return Err(NetworkError::AddressInUse(addr));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inboxes.insert(addr, tx);
        Ok(MemoryTransport {
            addr,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        })
    }

    /// Unbinds `addr`, as if its process had died.
    pub fn disconnect(&self, addr: SocketAddr) {
        self.inner.inboxes.write().remove(&addr);
    }

    fn deliver(&self, payload: &[u8], from: SocketAddr, to: SocketAddr) {
        let loss_rate = *self.inner.loss_rate.read();
        if loss_rate > 0.0 && rand::random::<f64>() < loss_rate {
            trace!("Dropping datagram {} -> {}", from, to);
            return;
        }
        if let Some(inbox) = self.inner.inboxes.read().get(&to) {
            let _ = inbox.send((Bytes::copy_from_slice(payload), from));
        }
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn send_to(&self, payload: &[u8], to: SocketAddr) -> Result<(), NetworkError> {
        self.network.deliver(payload, self.addr, to);
        Ok(())
    }

    async fn recv_from(&self) -> Result<(Bytes, SocketAddr), NetworkError> {
        self.inbox.lock().await.recv().await.ok_or(NetworkError::Closed)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.disconnect(self.addr);
    }
}
