//! Point-to-point wireless link between two nodes.
//!
//! The relay only depends on [`LinkSender`] and [`LinkReceiver`]. The
//! production link is [`ZenohLink`]; tests use [`MemoryLink`].

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;
use zenoh::Session;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use meterlink_common::keyexpr::{RelayKeys, is_valid_chunk};

/// Link errors.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid peer id '{0}'")]
    InvalidPeer(String),
    #[error("Peer {0} is not registered")]
    PeerNotRegistered(PeerId),
    #[error("Failed to send to {peer}: {reason}")]
    Send { peer: PeerId, reason: String },
    #[error("Link closed")]
    Closed,
    #[error("Zenoh error: {0}")]
    Zenoh(String),
}

/// Identifier of a node on the link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Result<Self, LinkError> {
        let id = id.into();
        if !is_valid_chunk(&id) {
            return Err(LinkError::InvalidPeer(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sending half of a link.
pub trait LinkSender: Send {
    /// Send one payload to a registered peer.
    fn send(
        &mut self,
        peer: &PeerId,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Make `peer` reachable for later sends.
    fn register_peer(&mut self, peer: &PeerId)
    -> impl Future<Output = Result<(), LinkError>> + Send;
}

/// Receiving half of a link.
pub trait LinkReceiver: Send {
    /// Wait for the next payload and the peer it came from.
    fn recv(&mut self) -> impl Future<Output = Result<(PeerId, Vec<u8>), LinkError>> + Send;
}

/// Link over a zenoh session.
///
/// Frames to `dest` are put on `<prefix>/<dest>/<self>`; the receiving half
/// subscribes to `<prefix>/<self>/*`.
pub struct ZenohLink {
    session: Arc<Session>,
    keys: RelayKeys,
    node: PeerId,
    peers: HashSet<PeerId>,
}

impl ZenohLink {
    pub fn new(session: Arc<Session>, keys: RelayKeys, node: PeerId) -> Self {
        Self {
            session,
            keys,
            node,
            peers: HashSet::new(),
        }
    }

    /// Subscribe to this node's inbox.
    pub async fn receiver(&self) -> Result<ZenohReceiver, LinkError> {
        let inbox = self.keys.inbox_wildcard(self.node.as_str());
        let subscriber = self
            .session
            .declare_subscriber(&inbox)
            .await
            .map_err(|e| LinkError::Zenoh(e.to_string()))?;

        debug!(inbox = %inbox, "Subscribed to relay inbox");

        Ok(ZenohReceiver {
            subscriber,
            keys: self.keys.clone(),
        })
    }
}

impl LinkSender for ZenohLink {
    async fn send(&mut self, peer: &PeerId, payload: Vec<u8>) -> Result<(), LinkError> {
        if !self.peers.contains(peer) {
            return Err(LinkError::PeerNotRegistered(peer.clone()));
        }

        let key = self.keys.frame_key(peer.as_str(), self.node.as_str());
        self.session
            .put(&key, payload)
            .await
            .map_err(|e| LinkError::Send {
                peer: peer.clone(),
                reason: e.to_string(),
            })
    }

    async fn register_peer(&mut self, peer: &PeerId) -> Result<(), LinkError> {
        if self.peers.insert(peer.clone()) {
            debug!(peer = %peer, "Registered relay peer");
        }
        Ok(())
    }
}

/// Receiving half of a [`ZenohLink`].
pub struct ZenohReceiver {
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    keys: RelayKeys,
}

impl LinkReceiver for ZenohReceiver {
    async fn recv(&mut self) -> Result<(PeerId, Vec<u8>), LinkError> {
        loop {
            let sample = self
                .subscriber
                .recv_async()
                .await
                .map_err(|_| LinkError::Closed)?;

            let key = sample.key_expr().as_str();
            let Some(parsed) = self.keys.parse_frame_key(key) else {
                debug!(key = %key, "Ignoring sample outside the relay layout");
                continue;
            };

            let peer = PeerId::new(parsed.src)?;
            return Ok((peer, sample.payload().to_bytes().to_vec()));
        }
    }
}

/// In-process link pair used by tests and single-host setups.
pub struct MemoryLink {
    node: PeerId,
    peers: HashSet<PeerId>,
    tx: mpsc::UnboundedSender<(PeerId, PeerId, Vec<u8>)>,
}

/// Receiving half of a [`MemoryLink`].
pub struct MemoryReceiver {
    node: PeerId,
    rx: mpsc::UnboundedReceiver<(PeerId, PeerId, Vec<u8>)>,
}

impl MemoryLink {
    /// Link `a` and `b`: frames sent by one arrive at the other.
    pub fn pair(a: PeerId, b: PeerId) -> ((MemoryLink, MemoryReceiver), (MemoryLink, MemoryReceiver)) {
        let (to_b, from_a) = mpsc::unbounded_channel();
        let (to_a, from_b) = mpsc::unbounded_channel();

        (
            (
                MemoryLink {
                    node: a.clone(),
                    peers: HashSet::new(),
                    tx: to_b,
                },
                MemoryReceiver {
                    node: a.clone(),
                    rx: from_b,
                },
            ),
            (
                MemoryLink {
                    node: b.clone(),
                    peers: HashSet::new(),
                    tx: to_a,
                },
                MemoryReceiver { node: b, rx: from_a },
            ),
        )
    }
}

impl LinkSender for MemoryLink {
    async fn send(&mut self, peer: &PeerId, payload: Vec<u8>) -> Result<(), LinkError> {
        if !self.peers.contains(peer) {
            return Err(LinkError::PeerNotRegistered(peer.clone()));
        }

        self.tx
            .send((peer.clone(), self.node.clone(), payload))
            .map_err(|_| LinkError::Send {
                peer: peer.clone(),
                reason: "receiver dropped".to_string(),
            })
    }

    async fn register_peer(&mut self, peer: &PeerId) -> Result<(), LinkError> {
        self.peers.insert(peer.clone());
        Ok(())
    }
}

impl LinkReceiver for MemoryReceiver {
    async fn recv(&mut self) -> Result<(PeerId, Vec<u8>), LinkError> {
        loop {
            let (dest, src, payload) = self.rx.recv().await.ok_or(LinkError::Closed)?;
            if dest == self.node {
                return Ok((src, payload));
            }
        }
    }
}
