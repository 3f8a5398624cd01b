use crate::chord::MAX_RING_BITS;
use crate::error::ChordError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::SocketAddr;

/// NodeId is a position on the identifier ring, shared by nodes and hashed keys
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(value: u64) -> Self {
        NodeId(value)
    }
}

/// The circular identifier space `[0, 2^m)`.
///
/// `m` is fixed for the lifetime of a ring; every node of one ring must use the
/// same value or their hashes will disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingSpace {
    bits: u8,
}

impl RingSpace {
    pub fn new(bits: u8) -> Result<Self, ChordError> {
        if bits == 0 || bits > MAX_RING_BITS {
            return Err(ChordError::InvalidRingBits(bits));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Number of slots on the ring, saturating at `u64::MAX` for a 64-bit ring.
    pub fn size(&self) -> u64 {
        self.mask().saturating_add(1)
    }

    fn mask(&self) -> u64 {
        if self.bits == 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }

    /// Hashes an address or key into the ring.
    /// SHA-256 read as a big-endian integer and reduced mod 2^m, so only the
    /// trailing digest bytes matter.
    pub fn hash(&self, input: &str) -> NodeId {
        let digest = Sha256::digest(input.as_bytes());
        let mut tail = [0u8; 8];
        tail.copy_from_slice(&digest[digest.len() - 8..]);
        NodeId(u64::from_be_bytes(tail) & self.mask())
    }

    pub fn hash_addr(&self, addr: &SocketAddr) -> NodeId {
        self.hash(&addr.to_string())
    }

    /// Start of finger `slot` (1-based): `(id + 2^(slot-1)) mod 2^m`
    pub fn finger_target(&self, id: NodeId, slot: usize) -> NodeId {
        debug_assert!(slot >= 1 && slot <= self.bits as usize);
        NodeId(id.0.wrapping_add(1u64 << (slot - 1)) & self.mask())
    }
}

/// Whether `x` lies in `(from, to]` walking clockwise.
///
/// When `from >= to` the interval wraps past zero; `from == to` therefore
/// covers the whole ring.
pub fn in_interval(from: NodeId, to: NodeId, x: NodeId) -> bool {
    if from < to {
        from < x && x <= to
    } else {
        x > from || x <= to
    }
}

/// Whether `x` lies in `(from, to)`, the open variant of [`in_interval`].
pub fn in_open_interval(from: NodeId, to: NodeId, x: NodeId) -> bool {
    x != to && in_interval(from, to, x)
}

/// A ring member: its position and where to reach it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub address: SocketAddr,
}

impl NodeRef {
    pub fn new(id: NodeId, address: SocketAddr) -> Self {
        Self { id, address }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}
