//! Modbus CRC16 (reflected polynomial 0xA001, init 0xFFFF), table-driven.

use crate::error::FrameError;

/// Number of CRC bytes trailing every RTU frame.
pub const CRC_LEN: usize = 2;

const POLY: u16 = 0xA001;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the Modbus CRC16 of `data`.
///
/// The result is the numeric CRC; on the wire it is sent low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u16::from(byte)) & 0xFF) as usize]
    })
}

/// Append the CRC16 of `frame` to it, little-endian.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Check the trailing CRC of `frame` and return the bytes it covers.
pub fn verify(frame: &[u8]) -> Result<&[u8], FrameError> {
    if frame.len() <= CRC_LEN {
        return Err(FrameError::FrameTooShort {
            len: frame.len(),
            min: CRC_LEN + 1,
        });
    }

    let (body, tail) = frame.split_at(frame.len() - CRC_LEN);
    let actual = u16::from_le_bytes([tail[0], tail[1]]);
    let expected = crc16(body);

    if expected != actual {
        return Err(FrameError::CrcMismatch { expected, actual });
    }

    Ok(body)
}
