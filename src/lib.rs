//! A Chord distributed hash table node.
//!
//! Nodes hash their `host:port` address onto an `m`-bit identifier ring and
//! route string keys to the node whose range `(predecessor, self]` contains the
//! key's hash. Routing state (successor, predecessor and an `m`-slot finger
//! table) is repaired by a periodic stabilization round that runs whenever a
//! node's receive wait times out.
//!
//! [`chord`] holds the ring arithmetic and the I/O-free protocol state machine;
//! [`network`] carries envelopes over a datagram transport and drives the
//! per-node event loop.

pub mod chord;
pub mod error;
pub mod network;
