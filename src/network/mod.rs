pub mod client;
pub mod memory;
pub mod messages;
pub mod node;
pub mod transport;

use crate::chord::{DEFAULT_RECV_TIMEOUT, DEFAULT_RING_BITS};
use std::net::SocketAddr;
use std::time::Duration;

/// Construction parameters for one ring member.
#[derive(Clone, Debug)]
pub struct PeerConfig {
    pub address: SocketAddr,          // where to bind; its `host:port` form is hashed into the ring
    pub bootstrap: Option<SocketAddr>, // ring contact to join through; None founds a new ring
    pub recv_timeout: Duration,       // idle wait before each stabilization round
    pub ring_bits: u8,                // m, identical across the whole ring
}

impl PeerConfig {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            bootstrap: None,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            ring_bits: DEFAULT_RING_BITS,
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: SocketAddr) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn with_recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    pub fn with_ring_bits(mut self, ring_bits: u8) -> Self {
        self.ring_bits = ring_bits;
        self
    }
}
