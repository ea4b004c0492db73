//! Error taxonomy of the register-bridge core.
//!
//! None of these errors is fatal: callers catch them at the task-iteration
//! boundary, log them, and produce no output for that iteration.

use thiserror::Error;

/// Framing and validation errors for a single serial/relay frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes, need at least {min}")]
    FrameTooShort { len: usize, min: usize },

    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch { expected: u16, actual: u16 },

    #[error("Unit address mismatch: expected {expected}, got {actual}")]
    UnitAddrMismatch { expected: u8, actual: u8 },

    #[error("Function code mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    FunctionMismatch { expected: u8, actual: u8 },

    #[error("Byte count mismatch: header says {declared}, frame carries {actual}")]
    ByteCountMismatch { declared: u8, actual: usize },

    #[error("Modbus exception: function 0x{function:02X}, code 0x{code:02X}")]
    Exception { function: u8, code: u8 },

    #[error("Unsupported function code 0x{0:02X}")]
    UnsupportedFunction(u8),
}

/// Numeric coercion failures in the value transform engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("Cannot pack float value {value} into integer format {format}")]
    Coercion { value: f64, format: &'static str },

    #[error("Value {value} out of range for {format}")]
    OutOfRange { value: f64, format: &'static str },

    #[error("Value is not finite: {0}")]
    NotFinite(f64),

    #[error("Expected {expected} bytes for {format}, got {actual}")]
    Width {
        format: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Transform {0} cannot be used in this direction")]
    Direction(&'static str),
}

/// Reasons the register store produced no answer for a downstream request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServeError {
    #[error("No slave register at offset {0}")]
    UnknownOffset(u32),

    #[error("Offset {offset} expects function 0x{expected:02X}, got 0x{actual:02X}")]
    FunctionMismatch { offset: u32, expected: u8, actual: u8 },

    #[error("Master register {key} is stale (alive {alive} < {threshold})")]
    StaleRegister { key: u32, alive: u8, threshold: u8 },

    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// Errors detected while building the register store from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Duplicate master register key {0}")]
    DuplicateMaster(u32),

    #[error("Duplicate slave register offset {0}")]
    DuplicateSlave(u32),

    #[error("Slave register {offset} references unknown master {key}")]
    DanglingMaster { offset: u32, key: u32 },

    #[error("Invalid liveness policy: fresh threshold {threshold}, max {max}")]
    Liveness { threshold: u8, max: u8 },
}

/// Errors recording a producer response into a master register.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpdateError {
    #[error("No master register with key {0}")]
    UnknownMaster(u32),

    #[error("Master register {0} is fed by the local poller")]
    PollOwned(u32),

    #[error(transparent)]
    Transform(#[from] TransformError),
}
