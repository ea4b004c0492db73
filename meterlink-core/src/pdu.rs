//! RTU frame codec: `[unit_addr][function][payload][crc16 LE]`.
//!
//! Every decoder gates on minimum length first and then recomputes the CRC.
//! Partial or garbled serial reads are normal on a shared line, so nothing
//! in the frame (including length fields) is trusted before the CRC passes.

use std::fmt;

use crate::crc::{CRC_LEN, append_crc, verify};
use crate::error::FrameError;
use crate::function::resolve_offset;

/// Length of a fixed-header read request frame.
pub const REQUEST_LEN: usize = 8;

/// Shortest frame a response can be: address, function, one byte, CRC.
pub const MIN_RESPONSE_LEN: usize = 3 + CRC_LEN;

/// Bit set in the function code of an exception response.
pub const EXCEPTION_BIT: u8 = 0x80;

/// Decoded fixed-header read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPdu {
    pub unit_addr: u8,
    pub function: u8,
    pub register_addr: u16,
    pub quantity: u16,
}

impl RequestPdu {
    /// Absolute offset this request addresses, if the function is supported.
    pub fn offset(&self) -> Option<u32> {
        resolve_offset(self.function, self.register_addr)
    }
}

/// Decoded read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePdu {
    pub unit_addr: u8,
    pub function: u8,
    pub byte_count: u8,
    pub data: Vec<u8>,
}

impl ResponsePdu {
    /// Bytes after the address and function, before the CRC.
    ///
    /// This is `byte_count|data`, the form the register store keeps as the
    /// raw payload and replays verbatim downstream.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.data.len() + 1);
        payload.push(self.byte_count);
        payload.extend_from_slice(&self.data);
        payload
    }
}

/// Request context a response is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expect {
    pub unit_addr: u8,
    pub function: u8,
}

/// Body of a response frame.
#[derive(Debug, Clone, Copy)]
pub enum ResponseBody<'a> {
    /// Value bytes; the encoder prefixes their length.
    Values(&'a [u8]),
    /// Bytes already carrying their own byte count (or a raw relay payload).
    Passthrough(&'a [u8]),
}

/// Build `addr|func|reg(BE)|qty(BE)|crc(LE)`.
pub fn encode_request(unit_addr: u8, function: u8, register_addr: u16, quantity: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(REQUEST_LEN);
    frame.push(unit_addr);
    frame.push(function);
    frame.extend_from_slice(&register_addr.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    append_crc(&mut frame);
    frame
}

/// Build a CRC-stamped response frame.
pub fn encode_response(unit_addr: u8, function: u8, body: ResponseBody<'_>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + CRC_LEN + body_len(&body));
    frame.push(unit_addr);
    frame.push(function);
    match body {
        ResponseBody::Values(values) => {
            frame.push(values.len() as u8);
            frame.extend_from_slice(values);
        }
        ResponseBody::Passthrough(bytes) => frame.extend_from_slice(bytes),
    }
    append_crc(&mut frame);
    frame
}

fn body_len(body: &ResponseBody<'_>) -> usize {
    match body {
        ResponseBody::Values(values) => values.len() + 1,
        ResponseBody::Passthrough(bytes) => bytes.len(),
    }
}

/// Decode a fixed-header read request.
pub fn decode_request(frame: &[u8]) -> Result<RequestPdu, FrameError> {
    if frame.len() < REQUEST_LEN {
        return Err(FrameError::FrameTooShort {
            len: frame.len(),
            min: REQUEST_LEN,
        });
    }

    let body = verify(frame)?;

    Ok(RequestPdu {
        unit_addr: body[0],
        function: body[1],
        register_addr: u16::from_be_bytes([body[2], body[3]]),
        quantity: u16::from_be_bytes([body[4], body[5]]),
    })
}

/// Decode a read response, optionally checking it against its request.
pub fn decode_response(frame: &[u8], expect: Option<Expect>) -> Result<ResponsePdu, FrameError> {
    if frame.len() < MIN_RESPONSE_LEN {
        return Err(FrameError::FrameTooShort {
            len: frame.len(),
            min: MIN_RESPONSE_LEN,
        });
    }

    let body = verify(frame)?;
    let unit_addr = body[0];
    let function = body[1];

    if let Some(expect) = expect {
        if unit_addr != expect.unit_addr {
            return Err(FrameError::UnitAddrMismatch {
                expected: expect.unit_addr,
                actual: unit_addr,
            });
        }
        if function == (expect.function | EXCEPTION_BIT) {
            return Err(FrameError::Exception {
                function: expect.function,
                code: body[2],
            });
        }
        if function != expect.function {
            return Err(FrameError::FunctionMismatch {
                expected: expect.function,
                actual: function,
            });
        }
    } else if function & EXCEPTION_BIT != 0 {
        return Err(FrameError::Exception {
            function: function & !EXCEPTION_BIT,
            code: body[2],
        });
    }

    let byte_count = body[2];
    let data = &body[3..];
    if usize::from(byte_count) != data.len() {
        return Err(FrameError::ByteCountMismatch {
            declared: byte_count,
            actual: data.len(),
        });
    }

    Ok(ResponsePdu {
        unit_addr,
        function,
        byte_count,
        data: data.to_vec(),
    })
}

/// Lazily formats bytes as space separated hex for log fields.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Shorthand for [`Hex`].
pub fn hex(bytes: &[u8]) -> Hex<'_> {
    Hex(bytes)
}
