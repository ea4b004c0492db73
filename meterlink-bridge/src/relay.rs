//! Wireless relay of polled response frames.
//!
//! The sending node forwards every fresh polled frame to its peer inside an
//! envelope carrying the request header:
//!
//! ```text
//! unit_addr(1) | function(1) | start_register(2, BE) | response frame (CRC'd)
//! ```
//!
//! The receiving node derives the master key from the header exactly like
//! the poller does and validates the frame against it before storing.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use meterlink_core::{
    Expect, FrameError, RelayFrame, SharedStore, UpdateError, decode_response, hex,
    resolve_offset,
};

use crate::config::RelayConfig;
use crate::link::{LinkError, LinkReceiver, LinkSender, PeerId};

/// Length of the envelope header.
pub const ENVELOPE_HEADER_LEN: usize = 4;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay envelope too short: {0} bytes")]
    EnvelopeTooShort(usize),
    #[error("Frame from unexpected peer {0}")]
    UnexpectedPeer(PeerId),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// A response frame with the request header it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEnvelope {
    pub unit_addr: u8,
    pub function: u8,
    pub start_register: u16,
    pub frame: Vec<u8>,
}

impl RelayEnvelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.frame.len());
        bytes.push(self.unit_addr);
        bytes.push(self.function);
        bytes.extend_from_slice(&self.start_register.to_be_bytes());
        bytes.extend_from_slice(&self.frame);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RelayError> {
        if bytes.len() <= ENVELOPE_HEADER_LEN {
            return Err(RelayError::EnvelopeTooShort(bytes.len()));
        }

        Ok(Self {
            unit_addr: bytes[0],
            function: bytes[1],
            start_register: u16::from_be_bytes([bytes[2], bytes[3]]),
            frame: bytes[ENVELOPE_HEADER_LEN..].to_vec(),
        })
    }

    /// Master key the header addresses.
    pub fn key(&self) -> Result<u32, FrameError> {
        resolve_offset(self.function, self.start_register)
            .ok_or(FrameError::UnsupportedFunction(self.function))
    }
}

impl From<RelayFrame> for RelayEnvelope {
    fn from(relay: RelayFrame) -> Self {
        Self {
            unit_addr: relay.source.unit_addr,
            function: relay.source.function.into(),
            start_register: relay.source.start_register,
            frame: relay.frame,
        }
    }
}

/// Timing of the relay send loop.
#[derive(Debug, Clone, Copy)]
pub struct RelayTiming {
    pub interval: Duration,
    pub send_pause: Duration,
    pub failure_backoff: Duration,
}

impl From<&RelayConfig> for RelayTiming {
    fn from(config: &RelayConfig) -> Self {
        Self {
            interval: config.interval(),
            send_pause: config.send_pause(),
            failure_backoff: config.failure_backoff(),
        }
    }
}

/// Outcome of one send cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sent: usize,
    pub failed: usize,
}

/// Forwards fresh polled frames to the peer.
pub struct RelaySender<L> {
    link: L,
    peer: PeerId,
    store: SharedStore,
    timing: RelayTiming,
}

impl<L: LinkSender> RelaySender<L> {
    pub fn new(link: L, peer: PeerId, store: SharedStore, timing: RelayTiming) -> Self {
        Self {
            link,
            peer,
            store,
            timing,
        }
    }

    /// Send every current relay candidate once.
    ///
    /// Sending does not consume liveness. An unregistered peer is
    /// registered and the rest of the cycle is skipped.
    pub async fn send_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        for candidate in self.store.relay_candidates() {
            let key = candidate.key;
            let envelope = RelayEnvelope::from(candidate);
            debug!(key, peer = %self.peer, frame = %hex(&envelope.frame), "Relaying frame");

            match self.link.send(&self.peer, envelope.encode()).await {
                Ok(()) => {
                    report.sent += 1;
                    tokio::time::sleep(self.timing.send_pause).await;
                }
                Err(LinkError::PeerNotRegistered(peer)) => {
                    info!(peer = %peer, "Registering relay peer");
                    if let Err(e) = self.link.register_peer(&peer).await {
                        warn!(peer = %peer, error = %e, "Failed to register relay peer");
                    }
                    report.failed += 1;
                    break;
                }
                Err(e) => {
                    warn!(key, error = %e, "Relay send failed");
                    report.failed += 1;
                    tokio::time::sleep(self.timing.failure_backoff).await;
                }
            }
        }

        report
    }

    /// Run the send loop.
    pub async fn run(mut self) {
        info!(peer = %self.peer, "Starting relay sender");

        loop {
            let report = self.send_cycle().await;
            if report.sent + report.failed > 0 {
                debug!(sent = report.sent, failed = report.failed, "Relay cycle complete");
            }
            tokio::time::sleep(self.timing.interval).await;
        }
    }
}

/// Stores frames relayed by the peer.
pub struct RelayReceiver<R> {
    link: R,
    peer: PeerId,
    store: SharedStore,
}

impl<R: LinkReceiver> RelayReceiver<R> {
    pub fn new(link: R, peer: PeerId, store: SharedStore) -> Self {
        Self { link, peer, store }
    }

    /// Validate one envelope from `from` and store it.
    ///
    /// Returns the master key that was updated.
    pub fn ingest(&self, from: &PeerId, payload: &[u8]) -> Result<u32, RelayError> {
        if *from != self.peer {
            return Err(RelayError::UnexpectedPeer(from.clone()));
        }

        let envelope = RelayEnvelope::decode(payload)?;
        let key = envelope.key()?;

        let pdu = decode_response(
            &envelope.frame,
            Some(Expect {
                unit_addr: envelope.unit_addr,
                function: envelope.function,
            }),
        )?;

        let value = self.store.ingest_response(key, &pdu, envelope.frame)?;
        debug!(key, value = ?value, "Relayed master register updated");
        Ok(key)
    }

    /// Receive and ingest one message.
    pub async fn recv_once(&mut self) -> Result<u32, RelayError> {
        let (from, payload) = self.link.recv().await?;
        self.ingest(&from, &payload)
    }

    /// Run the receive loop until the link closes.
    pub async fn run(mut self) {
        info!(peer = %self.peer, "Starting relay receiver");

        loop {
            match self.recv_once().await {
                Ok(_) => {}
                Err(RelayError::Link(LinkError::Closed)) => {
                    error!("Relay link closed");
                    return;
                }
                Err(e) => warn!(error = %e, "Relayed frame rejected"),
            }
        }
    }
}
