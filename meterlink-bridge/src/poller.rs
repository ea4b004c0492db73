//! Upstream meter polling.
//!
//! Each round sends every configured request in order and records the
//! validated responses in the register store.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use meterlink_core::{
    Expect, FrameError, PollSource, SharedStore, UpdateError, decode_response, encode_request, hex,
};

use crate::config::UpstreamConfig;
use crate::serial::{RtuPort, TransportError};

/// Error type for a single poll request.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("Response for {key} declares {actual} bytes, request needs {expected}")]
    UnexpectedByteCount { key: u32, expected: usize, actual: u8 },
}

/// Timing of the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollTiming {
    pub settle: Duration,
    pub response_timeout: Duration,
    pub interval: Duration,
}

impl From<&UpstreamConfig> for PollTiming {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            settle: config.settle(),
            response_timeout: config.response_timeout(),
            interval: config.interval(),
        }
    }
}

/// Outcome of one poll round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub updated: usize,
    pub failed: usize,
}

/// Master side of the upstream serial line.
pub struct Poller<T> {
    port: RtuPort<T>,
    requests: Vec<PollSource>,
    store: SharedStore,
    timing: PollTiming,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Poller<T> {
    pub fn new(
        port: RtuPort<T>,
        requests: Vec<PollSource>,
        store: SharedStore,
        timing: PollTiming,
    ) -> Self {
        Self {
            port,
            requests,
            store,
            timing,
        }
    }

    /// Run the polling loop.
    pub async fn run(mut self) {
        info!(
            requests = self.requests.len(),
            interval_ms = self.timing.interval.as_millis() as u64,
            "Starting upstream poller"
        );

        loop {
            let report = self.poll_round().await;
            debug!(
                updated = report.updated,
                failed = report.failed,
                "Poll round complete"
            );

            tokio::time::sleep(self.timing.interval).await;
        }
    }

    /// Send every request once.
    pub async fn poll_round(&mut self) -> RoundReport {
        let mut report = RoundReport::default();

        for index in 0..self.requests.len() {
            let source = self.requests[index];
            let key = source.key();

            match self.poll_one(source).await {
                Ok(value) => {
                    debug!(key, value = ?value, "Master register updated");
                    report.updated += 1;
                }
                Err(PollerError::Transport(TransportError::Timeout(timeout))) => {
                    warn!(
                        key,
                        unit_addr = source.unit_addr,
                        timeout_ms = timeout.as_millis() as u64,
                        "Upstream timeout"
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(key, error = %e, "Poll request failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn poll_one(&mut self, source: PollSource) -> Result<Option<f64>, PollerError> {
        let key = source.key();
        let function = u8::from(source.function);

        // Costs one step whether or not the refresh below succeeds.
        self.store.degrade(key);

        let request = encode_request(
            source.unit_addr,
            function,
            source.start_register,
            source.quantity,
        );
        debug!(key, frame = %hex(&request), "Upstream request");
        self.port.write_frame(&request).await?;

        tokio::time::sleep(self.timing.settle).await;

        let frame = self.port.read_frame(self.timing.response_timeout).await?;
        debug!(key, frame = %hex(&frame), "Upstream response");

        let pdu = decode_response(
            &frame,
            Some(Expect {
                unit_addr: source.unit_addr,
                function,
            }),
        )?;

        // A late answer to an earlier request has the wrong size.
        let expected = source.response_byte_count();
        if usize::from(pdu.byte_count) != expected {
            return Err(PollerError::UnexpectedByteCount {
                key,
                expected,
                actual: pdu.byte_count,
            });
        }

        Ok(self.store.record_response(key, &pdu, frame)?)
    }
}
