pub mod actor;
pub mod routing;
pub mod types;

use std::time::Duration;

// Chord configuration
pub const DEFAULT_RING_BITS: u8 = 10;
pub const MAX_RING_BITS: u8 = 64;
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(3);

// Upper bound on an encoded envelope; larger datagrams are treated as malformed.
pub const MAX_DATAGRAM_SIZE: usize = 1024;
