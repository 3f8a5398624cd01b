use crate::chord::routing::FingerTable;
use crate::chord::types::{in_interval, in_open_interval, NodeId, NodeRef, RingSpace};
use crate::network::messages::Message;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// Envelopes a handler wants delivered, in send order.
pub type Outbox = Vec<(SocketAddr, Message)>;

/// Where a request for some ring position should go next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// This node owns the position.
    Local,
    /// Hand the request to this address.
    Forward(SocketAddr),
}

/// The Chord protocol state of one node.
///
/// Holds the successor/predecessor pointers, the finger table and the keystore,
/// and turns every inbound envelope into state changes plus the envelopes to
/// send in response. It never touches the network; `ChordPeer` owns the
/// transport and feeds envelopes in one at a time, so all mutation is sequential.
pub struct ChordActor {
    ring: RingSpace,
    local: NodeRef,
    successor: NodeRef,
    predecessor: Option<NodeRef>,
    in_ring: bool,
    keystore: HashMap<String, String>,
    fingers: FingerTable,
    // (joiner, successor it was told); answers a retried JOIN_REQ whose reply was lost
    last_admission: Option<(NodeRef, NodeRef)>,
}

impl ChordActor {
    /// A node positioned at the hash of its own address.
    pub fn new(address: SocketAddr, ring: RingSpace) -> Self {
        Self::with_id(ring.hash_addr(&address), address, ring)
    }

    /// A node at an explicit ring position, for simulations that need a known layout.
    pub fn with_id(id: NodeId, address: SocketAddr, ring: RingSpace) -> Self {
        let local = NodeRef::new(id, address);
        Self {
            ring,
            local,
            successor: local,
            predecessor: None,
            in_ring: false,
            keystore: HashMap::new(),
            fingers: FingerTable::new(local, ring),
            last_admission: None,
        }
    }

    /// Becomes the sole member of a new ring: own successor, no predecessor.
    pub fn found_ring(&mut self) {
        self.successor = self.local;
        self.predecessor = None;
        self.in_ring = true;
        info!("Founded new ring: {}", self);
    }

    pub fn ring(&self) -> RingSpace {
        self.ring
    }

    pub fn id(&self) -> NodeId {
        self.local.id
    }

    pub fn address(&self) -> SocketAddr {
        self.local.address
    }

    pub fn local(&self) -> NodeRef {
        self.local
    }

    pub fn successor(&self) -> NodeRef {
        self.successor
    }

    pub fn predecessor(&self) -> Option<NodeRef> {
        self.predecessor
    }

    pub fn is_member(&self) -> bool {
        self.in_ring
    }

    pub fn finger_table(&self) -> &FingerTable {
        &self.fingers
    }

    pub fn keystore(&self) -> &HashMap<String, String> {
        &self.keystore
    }

    fn is_sole_member(&self) -> bool {
        self.successor.id == self.local.id
    }

    /// The JOIN_REQ a joining node keeps sending to its contact.
    pub fn join_request(&self) -> Message {
        Message::JoinReq {
            address: self.local.address,
            id: self.local.id,
        }
    }

    /// Dispatches one inbound envelope. `source` is the datagram's sender,
    /// used as the reply address for requests that carry no `from`.
    pub fn handle(&mut self, msg: Message, source: SocketAddr) -> Outbox {
        debug!("Node {} received {} from {}", self.local.id, msg.method(), source);

        if !self.in_ring {
            return match msg {
                Message::JoinRep { successor_id, successor_addr, predecessor_id, predecessor_addr } => {
                    let admitter = match (predecessor_id, predecessor_addr) {
                        (Some(id), Some(address)) => Some(NodeRef::new(id, address)),
                        _ => None,
                    };
                    self.on_join_rep(NodeRef::new(successor_id, successor_addr), admitter);
                    Vec::new()
                }
                other => {
                    debug!("Not in ring yet, dropping {}", other.method());
                    Vec::new()
                }
            };
        }

        match msg {
            Message::JoinReq { address, id } => self.on_join_req(NodeRef::new(id, address)),
            Message::Notify { predecessor_id, predecessor_addr } => {
                self.notify(NodeRef::new(predecessor_id, predecessor_addr));
                Vec::new()
            }
            Message::Predecessor {} => vec![(source, Message::stabilize(self.predecessor))],
            Message::Stabilize { predecessor_id, predecessor_addr } => {
                let reported = match (predecessor_id, predecessor_addr) {
                    (Some(id), Some(address)) => Some(NodeRef::new(id, address)),
                    _ => None,
                };
                self.on_stabilize(reported)
            }
            Message::Successor { id, from } => self.on_successor(id, from),
            Message::SuccessorRep { req_id, successor_id, successor_addr } => {
                self.on_successor_rep(req_id, NodeRef::new(successor_id, successor_addr));
                Vec::new()
            }
            Message::Put { key, value, from } => self.put(key, value, from.unwrap_or(source)),
            Message::Get { key, from } => self.get(key, from.unwrap_or(source)),
            Message::JoinRep { .. } => {
                debug!("Already a ring member, ignoring JOIN_REP from {}", source);
                Vec::new()
            }
            Message::Ack { .. } | Message::NotFound { .. } => {
                debug!("Ignoring client reply {} from {}", msg.method(), source);
                Vec::new()
            }
        }
    }

    fn on_join_req(&mut self, joiner: NodeRef) -> Outbox {
        // our own request looped back through the ring
        if joiner.address == self.local.address {
            return Vec::new();
        }
        if joiner.id == self.local.id {
            warn!("Node {} shares our id; dropping its JOIN_REQ", joiner);
            return Vec::new();
        }

        // The first JOIN_REP may have been lost; answer the retry the same way.
        if let Some((admitted, told)) = self.last_admission {
            if admitted == joiner && self.successor == joiner {
                debug!("Repeating JOIN_REP for {}", joiner);
                return vec![(joiner.address, Message::join_rep(told, self.local))];
            }
        }

        let reply = if self.is_sole_member() {
            // two-node ring: the joiner is both our successor and predecessor
            self.predecessor = Some(joiner);
            self.local
        } else if in_interval(self.local.id, self.successor.id, joiner.id) {
            self.successor
        } else {
            debug!("Find successor({}): forwarding to {}", joiner.id, self.successor);
            return vec![(self.successor.address, Message::JoinReq {
                address: joiner.address,
                id: joiner.id,
            })];
        };

        // Splice the joiner in right after us.
        self.successor = joiner;
        self.fingers.update(1, joiner);
        self.last_admission = Some((joiner, reply));
        info!("Admitted {}: {}", joiner, self);
        vec![(joiner.address, Message::join_rep(reply, self.local))]
    }

    fn on_join_rep(&mut self, successor: NodeRef, admitter: Option<NodeRef>) {
        self.successor = successor;
        self.fingers.fill_all(successor);
        self.predecessor = admitter.filter(|node| node.id != self.local.id);
        self.in_ring = true;
        info!("Joined ring: {}", self);
    }

    /// Accepts `candidate` as predecessor if there is none or it sits closer.
    pub fn notify(&mut self, candidate: NodeRef) {
        // a sole member notifies itself while stabilizing
        if candidate.id == self.local.id {
            return;
        }
        let accept = match self.predecessor {
            None => true,
            Some(current) => in_open_interval(current.id, self.local.id, candidate.id),
        };
        if accept && self.predecessor != Some(candidate) {
            self.predecessor = Some(candidate);
            info!("New predecessor {}: {}", candidate, self);
        }
    }

    /// First step of a stabilization round: ask the successor for its predecessor.
    pub fn start_stabilize(&self) -> Outbox {
        if !self.in_ring {
            return Vec::new();
        }
        vec![(self.successor.address, Message::Predecessor {})]
    }

    fn on_stabilize(&mut self, reported: Option<NodeRef>) -> Outbox {
        // A node between us and our successor joined since the last round.
        if let Some(candidate) = reported {
            if in_open_interval(self.local.id, self.successor.id, candidate.id) {
                self.successor = candidate;
                self.fingers.fill_all(candidate);
                info!("New successor {}: {}", candidate, self);
            }
        }

        // Tell the successor about us, then re-resolve every finger.
        let mut outbox = Vec::with_capacity(self.fingers.len() + 1);
        outbox.push((self.successor.address, Message::notify(self.local)));
        for (_, target, owner) in self.fingers.refresh_targets() {
            outbox.push((owner, Message::Successor {
                id: target,
                from: self.local.address,
            }));
        }
        outbox
    }

    fn on_successor(&self, id: NodeId, from: SocketAddr) -> Outbox {
        if in_interval(self.local.id, self.successor.id, id) {
            return vec![(from, Message::SuccessorRep {
                req_id: id,
                successor_id: self.successor.id,
                successor_addr: self.successor.address,
            })];
        }
        vec![(self.next_hop(id), Message::Successor { id, from })]
    }

    fn on_successor_rep(&mut self, req_id: NodeId, owner: NodeRef) {
        match self.fingers.slot_for_target(req_id) {
            Some(slot) => self.fingers.update(slot, owner),
            None => debug!("SUCCESSOR_REP for {} matches no finger target", req_id),
        }
    }

    /// Next node to hand a lookup for `id` to; never ourselves.
    fn next_hop(&self, id: NodeId) -> SocketAddr {
        let addr = self.fingers.closest_preceding_owner(id);
        if addr == self.local.address {
            self.successor.address
        } else {
            addr
        }
    }

    /// Three-way containment test shared by PUT and GET.
    pub fn route(&self, key_id: NodeId) -> Route {
        let owned = match self.predecessor {
            Some(pred) => in_interval(pred.id, self.local.id, key_id),
            None => self.is_sole_member(),
        };
        if owned {
            Route::Local
        } else if in_interval(self.local.id, self.successor.id, key_id) {
            Route::Forward(self.successor.address)
        } else {
            Route::Forward(self.next_hop(key_id))
        }
    }

    fn put(&mut self, key: String, value: String, from: SocketAddr) -> Outbox {
        let key_id = self.ring.hash(&key);
        debug!("Put: {} ({})", key, key_id);
        match self.route(key_id) {
            Route::Local => {
                self.keystore.insert(key, value);
                vec![(from, Message::Ack { value: None })]
            }
            Route::Forward(next) => {
                vec![(next, Message::Put { key, value, from: Some(from) })]
            }
        }
    }

    fn get(&self, key: String, from: SocketAddr) -> Outbox {
        let key_id = self.ring.hash(&key);
        debug!("Get: {} ({})", key, key_id);
        match self.route(key_id) {
            Route::Local => match self.keystore.get(&key) {
                Some(value) => vec![(from, Message::Ack { value: Some(value.clone()) })],
                None => vec![(from, Message::NotFound { key })],
            },
            Route::Forward(next) => vec![(next, Message::Get { key, from: Some(from) })],
        }
    }
}

impl fmt::Display for ChordActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node ID: {}; DHT: {}; Successor: {}; Predecessor: {}; FingerTable: {}",
            self.local.id,
            self.in_ring,
            self.successor.id,
            self.predecessor
                .map(|p| p.id.to_string())
                .unwrap_or_else(|| "None".to_string()),
            self.fingers,
        )
    }
}
