//! RTU transport over a serial line.
//!
//! RTU has no length prefix or delimiter: a frame ends when the line goes
//! silent for 3.5 character times.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialStream;
use tracing::trace;

use meterlink_core::hex;

use crate::config::SerialConfig;

/// Largest RTU frame on the wire.
pub const MAX_FRAME_LEN: usize = 256;

/// Shortest inter-frame silence, used at high baud rates.
const MIN_FRAME_GAP: Duration = Duration::from_millis(2);

/// Bits per RTU character: start, 8 data, parity or second stop, stop.
const BITS_PER_CHAR: u64 = 11;

/// Serial transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No frame within {0:?}")]
    Timeout(Duration),
    #[error("Frame exceeds {max} bytes")]
    Oversize { max: usize },
    #[error("Serial line closed")]
    Closed,
    #[error("Serial I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to open serial port '{port}': {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
}

/// Silence that ends a frame at `baud_rate`: 3.5 character times.
pub fn frame_gap(baud_rate: u32) -> Duration {
    let baud = u64::from(baud_rate.max(1));
    let micros = BITS_PER_CHAR * 3_500_000 / baud;
    Duration::from_micros(micros).max(MIN_FRAME_GAP)
}

/// Frame-oriented wrapper around a serial byte stream.
#[derive(Debug)]
pub struct RtuPort<T> {
    io: T,
    frame_gap: Duration,
}

impl<T: AsyncRead + AsyncWrite + Unpin> RtuPort<T> {
    pub fn new(io: T, baud_rate: u32) -> Self {
        Self::with_frame_gap(io, frame_gap(baud_rate))
    }

    pub fn with_frame_gap(io: T, frame_gap: Duration) -> Self {
        Self { io, frame_gap }
    }

    pub fn frame_gap(&self) -> Duration {
        self.frame_gap
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    /// Write one complete frame.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        trace!(frame = %hex(frame), "Serial write");
        self.io.write_all(frame).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read one frame.
    ///
    /// The first byte must arrive within `timeout`; the frame then extends
    /// until the line has been silent for the frame gap.
    pub async fn read_frame(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut chunk = [0u8; 64];

        let n = match tokio::time::timeout(timeout, self.io.read(&mut chunk)).await {
            Err(_) => return Err(TransportError::Timeout(timeout)),
            Ok(Ok(0)) => return Err(TransportError::Closed),
            Ok(result) => result?,
        };

        let mut frame = chunk[..n].to_vec();

        loop {
            match tokio::time::timeout(self.frame_gap, self.io.read(&mut chunk)).await {
                Err(_) | Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    frame.extend_from_slice(&chunk[..n]);
                    if frame.len() > MAX_FRAME_LEN {
                        return Err(TransportError::Oversize { max: MAX_FRAME_LEN });
                    }
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }

        trace!(frame = %hex(&frame), "Serial read");
        Ok(frame)
    }
}

/// Open the serial port described by `config`.
pub fn open_serial(config: &SerialConfig) -> Result<SerialStream, TransportError> {
    let parity = match config.parity.to_lowercase().as_str() {
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    };

    let stop_bits = match config.stop_bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    };

    let data_bits = match config.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };

    let builder = tokio_serial::new(&config.port, config.baud_rate)
        .parity(parity)
        .stop_bits(stop_bits)
        .data_bits(data_bits);

    SerialStream::open(&builder).map_err(|source| TransportError::Open {
        port: config.port.clone(),
        source,
    })
}

/// Open `config` as an [`RtuPort`] with the matching frame gap.
pub fn open_port(config: &SerialConfig) -> Result<RtuPort<SerialStream>, TransportError> {
    let stream = open_serial(config)?;
    Ok(RtuPort::new(stream, config.baud_rate))
}
