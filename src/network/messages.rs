use crate::chord::types::{NodeId, NodeRef};
use crate::chord::MAX_DATAGRAM_SIZE;
use crate::error::MessageError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Wire envelope exchanged between ring members and clients.
///
/// Encodes as `{"method": "JOIN_REQ", "args": {...}}` with camelCase argument
/// names. Requests that expect a reply carry `from` so the answer can go
/// straight back to the original requester instead of retracing the route.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(
    tag = "method",
    content = "args",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    JoinReq {
        address: SocketAddr,
        id: NodeId,
    },
    JoinRep {
        successor_id: NodeId,
        successor_addr: SocketAddr,
        // the admitting node, which is the joiner's predecessor
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predecessor_id: Option<NodeId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        predecessor_addr: Option<SocketAddr>,
    },
    Notify {
        predecessor_id: NodeId,
        predecessor_addr: SocketAddr,
    },
    Predecessor {},
    Stabilize {
        predecessor_id: Option<NodeId>,
        predecessor_addr: Option<SocketAddr>,
    },
    Successor {
        id: NodeId,
        from: SocketAddr,
    },
    SuccessorRep {
        req_id: NodeId,
        successor_id: NodeId,
        successor_addr: SocketAddr,
    },
    Put {
        key: String,
        value: String,
        #[serde(default)]
        from: Option<SocketAddr>,
    },
    Get {
        key: String,
        #[serde(default)]
        from: Option<SocketAddr>,
    },
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    NotFound {
        key: String,
    },
}

impl Message {
    /// JOIN_REP from `admitter`, naming the joiner's successor.
    pub fn join_rep(successor: NodeRef, admitter: NodeRef) -> Self {
        Message::JoinRep {
            successor_id: successor.id,
            successor_addr: successor.address,
            predecessor_id: Some(admitter.id),
            predecessor_addr: Some(admitter.address),
        }
    }

    pub fn notify(predecessor: NodeRef) -> Self {
        Message::Notify {
            predecessor_id: predecessor.id,
            predecessor_addr: predecessor.address,
        }
    }

    pub fn stabilize(predecessor: Option<NodeRef>) -> Self {
        Message::Stabilize {
            predecessor_id: predecessor.map(|p| p.id),
            predecessor_addr: predecessor.map(|p| p.address),
        }
    }

    /// The method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            Message::JoinReq { .. } => "JOIN_REQ",
            Message::JoinRep { .. } => "JOIN_REP",
            Message::Notify { .. } => "NOTIFY",
            Message::Predecessor {} => "PREDECESSOR",
            Message::Stabilize { .. } => "STABILIZE",
            Message::Successor { .. } => "SUCCESSOR",
            Message::SuccessorRep { .. } => "SUCCESSOR_REP",
            Message::Put { .. } => "PUT",
            Message::Get { .. } => "GET",
            Message::Ack { .. } => "ACK",
            Message::NotFound { .. } => "NOT_FOUND",
        }
    }

    /// Serializes into a single datagram, refusing anything over the size limit.
    pub fn encode(&self) -> Result<Bytes, MessageError> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| MessageError::SerializationFailed(e.to_string()))?;
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(MessageError::TooLarge {
                len: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(Bytes::from(payload))
    }

    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(MessageError::TooLarge {
                len: payload.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        serde_json::from_slice(payload)
            .map_err(|e| MessageError::DeserializationFailed(e.to_string()))
    }
}
