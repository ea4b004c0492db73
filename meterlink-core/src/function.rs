//! Function codes and the absolute offset table.
//!
//! | Function | Region                  | Offsets       |
//! |----------|-------------------------|---------------|
//! | 0x01     | discrete output coils   | 1 - 9999      |
//! | 0x02     | discrete input contacts | 10001 - 19999 |
//! | 0x04     | analog input registers  | 30001 - 39999 |
//! | 0x03     | holding registers       | 40001 - 49999 |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FrameError;

/// Read function codes the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    ReadHoldingRegisters = 0x03,
    ReadInputRegisters = 0x04,
}

impl FunctionCode {
    /// Offset of register address 0 for this function.
    pub fn base(self) -> u32 {
        match self {
            FunctionCode::ReadCoils => 1,
            FunctionCode::ReadDiscreteInputs => 10001,
            FunctionCode::ReadHoldingRegisters => 40001,
            FunctionCode::ReadInputRegisters => 30001,
        }
    }

    /// Absolute offset of `register_address` in this function's region.
    pub fn offset(self, register_address: u16) -> u32 {
        self.base() + u32::from(register_address)
    }

    /// Short region name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            FunctionCode::ReadCoils => "coil",
            FunctionCode::ReadDiscreteInputs => "discrete",
            FunctionCode::ReadHoldingRegisters => "holding",
            FunctionCode::ReadInputRegisters => "input",
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = FrameError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0x01 => Ok(FunctionCode::ReadCoils),
            0x02 => Ok(FunctionCode::ReadDiscreteInputs),
            0x03 => Ok(FunctionCode::ReadHoldingRegisters),
            0x04 => Ok(FunctionCode::ReadInputRegisters),
            other => Err(FrameError::UnsupportedFunction(other)),
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> Self {
        code as u8
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} ({})", *self as u8, self.as_str())
    }
}

/// Absolute offset for a raw function code and register address.
///
/// Returns `None` for function codes outside the read set.
pub fn resolve_offset(function: u8, register_address: u16) -> Option<u32> {
    FunctionCode::try_from(function)
        .ok()
        .map(|code| code.offset(register_address))
}
