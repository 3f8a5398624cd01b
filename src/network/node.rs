use crate::chord::actor::{ChordActor, Outbox};
use crate::chord::types::{NodeId, RingSpace};
use crate::error::{ChordError, DhtError, NetworkError};
use crate::network::messages::Message;
use crate::network::transport::{Transport, UdpTransport};
use crate::network::PeerConfig;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

// Bytes of a rejected payload quoted in the warning.
const MALFORMED_PREVIEW: usize = 16;

enum Wait {
    Envelope(Message, SocketAddr),
    Timeout,
    Stopped,
}

/// One ring member: a [`ChordActor`] bound to a transport.
///
/// Everything runs on the task that calls [`ChordPeer::run`]: it blocks on the
/// next datagram until the stabilization deadline, handles exactly one envelope
/// (or one stabilization round) and loops. Stop it through the token from
/// [`ChordPeer::shutdown_token`]; `run` then hands back the final state.
pub struct ChordPeer<T: Transport = UdpTransport> {
    actor: ChordActor,
    transport: T,
    bootstrap: Option<SocketAddr>,
    recv_timeout: Duration,
    shutdown: CancellationToken,
}

impl ChordPeer<UdpTransport> {
    pub async fn bind(config: PeerConfig) -> Result<Self, DhtError> {
        let transport = UdpTransport::bind(config.address).await?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> ChordPeer<T> {
    /// Wraps an already bound transport. The node id is the hash of the
    /// transport's actual local address.
    pub fn with_transport(config: PeerConfig, transport: T) -> Result<Self, DhtError> {
        let ring = RingSpace::new(config.ring_bits)?;
        let actor = ChordActor::new(transport.local_addr(), ring);
        Ok(Self::assemble(config, transport, actor))
    }

    /// Like [`ChordPeer::with_transport`] but at a chosen ring position.
    pub fn with_id(config: PeerConfig, transport: T, id: NodeId) -> Result<Self, DhtError> {
        let ring = RingSpace::new(config.ring_bits)?;
        let actor = ChordActor::with_id(id, transport.local_addr(), ring);
        Ok(Self::assemble(config, transport, actor))
    }

    fn assemble(config: PeerConfig, transport: T, actor: ChordActor) -> Self {
        Self {
            actor,
            transport,
            bootstrap: config.bootstrap,
            recv_timeout: config.recv_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.actor.address()
    }

    pub fn node_id(&self) -> NodeId {
        self.actor.id()
    }

    pub fn actor(&self) -> &ChordActor {
        &self.actor
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Enters the ring: founds it without a bootstrap contact, otherwise sends
    /// JOIN_REQ to the contact every receive timeout until a JOIN_REP arrives.
    ///
    /// There is no retry cap; an unreachable contact keeps the node here until
    /// it is cancelled or the caller's own timeout fires.
    pub async fn join(&mut self) -> Result<(), DhtError> {
        let Some(contact) = self.bootstrap else {
            self.actor.found_ring();
            return Ok(());
        };

        info!("Node {} joining through {}", self.actor.id(), contact);
        let request = self.actor.join_request().encode()?;

        while !self.actor.is_member() {
            if self.shutdown.is_cancelled() {
                return Err(ChordError::JoinCancelled.into());
            }
            // Resend every timeout until a JOIN_REP makes us a member
            debug!("Sending JOIN_REQ to {}", contact);
            if let Err(e) = self.transport.send_to(&request, contact).await {
                warn!("Failed to send JOIN_REQ to {}: {}", contact, e);
            }

            let deadline = Instant::now() + self.recv_timeout;
            while !self.actor.is_member() {
                match self.next_envelope(deadline).await {
                    Wait::Envelope(msg, from) => {
                        let outbox = self.actor.handle(msg, from);
                        self.dispatch(outbox).await;
                    }
                    Wait::Timeout => break,
                    Wait::Stopped => return Err(ChordError::JoinCancelled.into()),
                }
            }
        }
        Ok(())
    }

    /// Joins (if not already a member) and serves until shutdown.
    pub async fn run(mut self) -> Result<ChordActor, DhtError> {
        if !self.actor.is_member() {
            self.join().await?;
        }
        self.serve().await;
        Ok(self.actor)
    }

    async fn serve(&mut self) {
        info!("Node {} serving on {}", self.actor.id(), self.actor.address());
        let mut deadline = Instant::now() + self.recv_timeout;

        while !self.shutdown.is_cancelled() {
            match self.next_envelope(deadline).await {
                // Handle one envelope to completion before the next receive
                Wait::Envelope(msg, from) => {
                    let outbox = self.actor.handle(msg, from);
                    self.dispatch(outbox).await;
                }
                // Deadline passed: run a stabilization round and re-arm
                Wait::Timeout => {
                    debug!("Node {} stabilizing", self.actor.id());
                    let outbox = self.actor.start_stabilize();
                    self.dispatch(outbox).await;
                    deadline = Instant::now() + self.recv_timeout;
                }
                Wait::Stopped => break,
            }
        }
        info!("Node {} stopped: {}", self.actor.id(), self.actor);
    }

    /// Next well-formed envelope, or why there is none before `deadline`.
    async fn next_envelope(&self, deadline: Instant) -> Wait {
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Wait::Stopped,
                _ = sleep_until(deadline) => return Wait::Timeout,
                received = self.transport.recv_from() => received,
            };

            match received {
                Ok((payload, from)) => match Message::decode(&payload) {
                    Ok(msg) => return Wait::Envelope(msg, from),
                    Err(e) => warn!(
                        "Dropping malformed envelope from {} ({}): {}",
                        from,
                        hex::encode(&payload[..payload.len().min(MALFORMED_PREVIEW)]),
                        e
                    ),
                },
                Err(NetworkError::Closed) => {
                    error!("Transport for node {} closed", self.actor.id());
                    return Wait::Stopped;
                }
                Err(e) => warn!("Receive failed on node {}: {}", self.actor.id(), e),
            }
        }
    }

    async fn dispatch(&self, outbox: Outbox) {
        for (to, msg) in outbox {
            let payload = match msg.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Not sending {} to {}: {}", msg.method(), to, e);
                    continue;
                }
            };
            if let Err(e) = self.transport.send_to(&payload, to).await {
                warn!("Failed to send {} to {}: {}", msg.method(), to, e);
            }
        }
    }
}
