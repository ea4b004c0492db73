//! meterlink core
//!
//! The register-bridge core of a meterlink node. No I/O happens here:
//!
//! - [`crc`] - Modbus CRC16
//! - [`pdu`] - RTU request/response framing
//! - [`function`] - Read function codes and absolute offsets
//! - [`transform`] - Value transforms between register bytes and scalars
//! - [`store`] - Master/slave register store with liveness countdown
//! - [`error`] - Error types

pub mod crc;
pub mod error;
pub mod function;
pub mod pdu;
pub mod store;
pub mod transform;

pub use crc::{append_crc, crc16, verify};
pub use error::{FrameError, ServeError, StoreError, TransformError, UpdateError};
pub use function::{FunctionCode, resolve_offset};
pub use pdu::{
    EXCEPTION_BIT, Expect, REQUEST_LEN, RequestPdu, ResponseBody, ResponsePdu, decode_request,
    decode_response, encode_request, encode_response, hex,
};
pub use store::{
    LivenessPolicy, MasterRef, MasterRegister, PollSource, RegisterStatus, RegisterStore,
    RelayFrame, SharedStore, SlaveRegister,
};
pub use transform::{NumberFormat, NumericKind, Transform};
