use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DhtError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Chord protocol error: {0}")]
    Chord(#[from] ChordError),

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address already bound: {0}")]
    AddressInUse(SocketAddr),

    #[error("Transport closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ChordError {
    #[error("Ring bit-width must be between 1 and 64, got {0}")]
    InvalidRingBits(u8),

    #[error("Join cancelled before a JOIN_REP arrived")]
    JoinCancelled,

    #[error("No reply from {peer} within {timeout:?}")]
    NoReply { peer: SocketAddr, timeout: Duration },

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Failed to serialize message: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize message: {0}")]
    DeserializationFailed(String),

    #[error("Envelope of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}
