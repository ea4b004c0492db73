//! Downstream slave responder.
//!
//! Answers read requests from the downstream device out of the register
//! store. Requests that cannot be answered get no reply at all: no Modbus
//! exception is ever sent.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace, warn};

use meterlink_core::{
    FrameError, REQUEST_LEN, ResponseBody, ServeError, SharedStore, decode_request,
    encode_response, hex,
};

use crate::config::DownstreamConfig;
use crate::serial::{RtuPort, TransportError};

/// Reasons a downstream request gets no reply.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("Request for unit {0} is not ours")]
    ForeignUnit(u8),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Serve(#[from] ServeError),
}

/// Slave side of the downstream serial line.
pub struct Responder<T> {
    port: RtuPort<T>,
    unit_addrs: Vec<u8>,
    store: SharedStore,
    request_timeout: Duration,
    idle_backoff: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Responder<T> {
    pub fn new(port: RtuPort<T>, config: &DownstreamConfig, store: SharedStore) -> Self {
        Self {
            port,
            unit_addrs: config.unit_addrs.clone(),
            store,
            request_timeout: config.request_timeout(),
            idle_backoff: config.idle_backoff(),
        }
    }

    /// Response frame for one request frame.
    pub fn handle(&self, frame: &[u8]) -> Result<Vec<u8>, ResponderError> {
        if frame.len() < REQUEST_LEN {
            return Err(FrameError::FrameTooShort {
                len: frame.len(),
                min: REQUEST_LEN,
            }
            .into());
        }

        // Other slaves on a shared bus are not our business.
        if !self.unit_addrs.contains(&frame[0]) {
            return Err(ResponderError::ForeignUnit(frame[0]));
        }

        let request = decode_request(frame)?;
        let offset = request
            .offset()
            .ok_or(FrameError::UnsupportedFunction(request.function))?;

        let payload = self.store.serve(offset, request.function)?;

        Ok(encode_response(
            request.unit_addr,
            request.function,
            ResponseBody::Passthrough(&payload),
        ))
    }

    /// Wait for one request and answer it if possible.
    ///
    /// Returns whether a response was written.
    pub async fn run_once(&mut self) -> Result<bool, TransportError> {
        let frame = match self.port.read_frame(self.request_timeout).await {
            Ok(frame) => frame,
            Err(TransportError::Timeout(_)) => {
                if !self.idle_backoff.is_zero() {
                    tokio::time::sleep(self.idle_backoff).await;
                }
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        debug!(frame = %hex(&frame), "Downstream request");

        match self.handle(&frame) {
            Ok(response) => {
                debug!(frame = %hex(&response), "Downstream response");
                self.port.write_frame(&response).await?;
                Ok(true)
            }
            Err(ResponderError::ForeignUnit(unit)) => {
                trace!(unit, "Ignoring request for another unit");
                Ok(false)
            }
            Err(e) => {
                debug!(error = %e, "Request not answered");
                Ok(false)
            }
        }
    }

    /// Run the responder loop.
    pub async fn run(mut self) {
        info!(unit_addrs = ?self.unit_addrs, "Starting downstream responder");

        loop {
            if let Err(e) = self.run_once().await {
                warn!(error = %e, "Downstream serial error");
                tokio::time::sleep(self.request_timeout).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SerialConfig;
    use meterlink_core::{
        FunctionCode, LivenessPolicy, MasterRef, MasterRegister, NumberFormat, NumericKind,
        RegisterStore, SlaveRegister, Transform, append_crc, verify,
    };
    use tokio_test::io::Builder;

    const READ_40015: [u8; 8] = [0x01, 0x03, 0x00, 0x0e, 0x00, 0x01, 0xe5, 0xc9];

    fn config() -> DownstreamConfig {
        DownstreamConfig {
            serial: SerialConfig {
                port: "/dev/null".to_string(),
                baud_rate: 9600,
                data_bits: 8,
                parity: "none".to_string(),
                stop_bits: 1,
            },
            unit_addrs: vec![1],
            request_timeout_ms: 1000,
            idle_backoff_ms: 0,
        }
    }

    fn store() -> SharedStore {
        let power = MasterRegister::new(
            30013,
            Transform::Unpack {
                format: NumberFormat::F32,
                scale: 1.0,
                unit: None,
            },
        );
        let slave = SlaveRegister::new(
            FunctionCode::ReadHoldingRegisters,
            14,
            MasterRef::Key(30013),
            Transform::Pack {
                format: NumberFormat::I16,
                scale: 1.0,
                kind: NumericKind::Int,
            },
        );
        let store =
            RegisterStore::new(vec![power], vec![slave], LivenessPolicy::default()).unwrap();
        let shared = SharedStore::new(store);
        shared.update_master(30013, vec![0x04, 0x43, 0x16, 0x00, 0x00], Vec::new(), Some(150.0));
        shared
    }

    fn responder<T: AsyncRead + AsyncWrite + Unpin>(io: T) -> Responder<T> {
        Responder::new(RtuPort::new(io, 9600), &config(), store())
    }

    #[tokio::test]
    async fn test_handle_fresh_request() {
        let responder = responder(Builder::new().build());
        let response = responder.handle(&READ_40015).unwrap();

        assert_eq!(response, vec![0x01, 0x03, 0x02, 0x00, 0x96, 0x38, 0x2a]);
        assert!(verify(&response).is_ok());
    }

    #[tokio::test]
    async fn test_handle_drops() {
        let responder = responder(Builder::new().build());

        assert!(matches!(
            responder.handle(&READ_40015[..6]),
            Err(ResponderError::Frame(FrameError::FrameTooShort { .. }))
        ));

        let mut other_unit = vec![0x02, 0x03, 0x00, 0x0e, 0x00, 0x01];
        append_crc(&mut other_unit);
        assert!(matches!(
            responder.handle(&other_unit),
            Err(ResponderError::ForeignUnit(2))
        ));

        let mut bad_crc = READ_40015;
        bad_crc[7] ^= 0xff;
        assert!(matches!(
            responder.handle(&bad_crc),
            Err(ResponderError::Frame(FrameError::CrcMismatch { .. }))
        ));

        let mut unknown = vec![0x01, 0x03, 0x00, 0x63, 0x00, 0x01];
        append_crc(&mut unknown);
        assert!(matches!(
            responder.handle(&unknown),
            Err(ResponderError::Serve(ServeError::UnknownOffset(40100)))
        ));

        let mut write = vec![0x01, 0x06, 0x00, 0x0e, 0x00, 0x01];
        append_crc(&mut write);
        assert!(matches!(
            responder.handle(&write),
            Err(ResponderError::Frame(FrameError::UnsupportedFunction(0x06)))
        ));
    }

    #[tokio::test]
    async fn test_run_once_writes_response() {
        let mock = Builder::new()
            .read(&READ_40015)
            .write(&[0x01, 0x03, 0x02, 0x00, 0x96, 0x38, 0x2a])
            .build();

        let mut responder = responder(mock);
        assert!(responder.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_run_once_stale_gets_no_reply() {
        let mut responder = responder(Builder::new().read(&READ_40015).build());
        responder.store.with(|store| {
            for _ in 0..6 {
                store.degrade(30013);
            }
        });

        assert!(!responder.run_once().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_timeout() {
        let (_panel, host) = tokio::io::duplex(64);
        let mut responder = responder(host);

        assert!(!responder.run_once().await.unwrap());
    }
}
