//! Value transforms between device byte layouts and scalars.
//!
//! A master register decodes its raw response data with `Unpack`; a slave
//! register encodes the master's scalar for the downstream device with
//! `Pack`. `Raw` on either side means the raw payload is replayed verbatim.

use serde::{Deserialize, Serialize};

use crate::error::TransformError;

/// How a register's bytes are turned into a value or back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transform {
    /// Serve the raw payload verbatim.
    #[default]
    Raw,
    /// Decode response data into a scalar, then multiply by `scale`.
    Unpack {
        format: NumberFormat,
        #[serde(default = "default_scale")]
        scale: f64,
        /// Unit of measurement (for logs and status only).
        #[serde(default)]
        unit: Option<String>,
    },
    /// Multiply a scalar by `scale`, coerce it to `kind` and encode it as
    /// `[byte_len][bytes]`.
    Pack {
        format: NumberFormat,
        #[serde(default = "default_scale")]
        scale: f64,
        #[serde(default)]
        kind: NumericKind,
    },
}

fn default_scale() -> f64 {
    1.0
}

/// Fixed-width numeric layouts found in meter register maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberFormat {
    /// Unsigned 16-bit integer
    U16,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 32-bit integer (big-endian)
    U32,
    /// Signed 32-bit integer (big-endian)
    I32,
    /// 32-bit float (big-endian)
    F32,
    /// Unsigned 32-bit integer (little-endian word order)
    U32Le,
    /// Signed 32-bit integer (little-endian word order)
    I32Le,
    /// 32-bit float (little-endian word order)
    F32Le,
    /// 64-bit float (big-endian)
    F64,
}

/// Numeric type a value is coerced to before packing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    /// Truncate toward zero.
    #[default]
    Int,
    /// Keep the fractional part.
    Float,
}

impl NumberFormat {
    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            NumberFormat::U16 | NumberFormat::I16 => 2,
            NumberFormat::F64 => 8,
            _ => 4,
        }
    }

    /// Name used in error messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            NumberFormat::U16 => "u16",
            NumberFormat::I16 => "i16",
            NumberFormat::U32 => "u32",
            NumberFormat::I32 => "i32",
            NumberFormat::F32 => "f32",
            NumberFormat::U32Le => "u32le",
            NumberFormat::I32Le => "i32le",
            NumberFormat::F32Le => "f32le",
            NumberFormat::F64 => "f64",
        }
    }

    fn is_integer(self) -> bool {
        !matches!(
            self,
            NumberFormat::F32 | NumberFormat::F32Le | NumberFormat::F64
        )
    }

    fn is_word_swapped(self) -> bool {
        matches!(
            self,
            NumberFormat::U32Le | NumberFormat::I32Le | NumberFormat::F32Le
        )
    }

    /// Decode exactly `self.width()` bytes.
    pub fn decode(self, data: &[u8]) -> Result<f64, TransformError> {
        if data.len() != self.width() {
            return Err(TransformError::Width {
                format: self.as_str(),
                expected: self.width(),
                actual: data.len(),
            });
        }

        if self == NumberFormat::U16 {
            return Ok(f64::from(u16::from_be_bytes([data[0], data[1]])));
        }
        if self == NumberFormat::I16 {
            return Ok(f64::from(i16::from_be_bytes([data[0], data[1]])));
        }
        if self == NumberFormat::F64 {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(data);
            return Ok(f64::from_be_bytes(bytes));
        }

        let mut word = [data[0], data[1], data[2], data[3]];
        if self.is_word_swapped() {
            word = [data[2], data[3], data[0], data[1]];
        }

        Ok(match self {
            NumberFormat::U32 | NumberFormat::U32Le => f64::from(u32::from_be_bytes(word)),
            NumberFormat::I32 | NumberFormat::I32Le => f64::from(i32::from_be_bytes(word)),
            _ => f64::from(f32::from_be_bytes(word)),
        })
    }

    /// Encode an already coerced value.
    pub fn encode(self, value: f64, kind: NumericKind) -> Result<Vec<u8>, TransformError> {
        if !value.is_finite() {
            return Err(TransformError::NotFinite(value));
        }

        if self.is_integer() && kind == NumericKind::Float {
            return Err(TransformError::Coercion {
                value,
                format: self.as_str(),
            });
        }

        let out_of_range = || TransformError::OutOfRange {
            value,
            format: self.as_str(),
        };

        let bytes = match self {
            NumberFormat::U16 => {
                check_range(value, f64::from(u16::MIN), f64::from(u16::MAX)).ok_or_else(out_of_range)?;
                (value as u16).to_be_bytes().to_vec()
            }
            NumberFormat::I16 => {
                check_range(value, f64::from(i16::MIN), f64::from(i16::MAX)).ok_or_else(out_of_range)?;
                (value as i16).to_be_bytes().to_vec()
            }
            NumberFormat::U32 | NumberFormat::U32Le => {
                check_range(value, f64::from(u32::MIN), f64::from(u32::MAX)).ok_or_else(out_of_range)?;
                (value as u32).to_be_bytes().to_vec()
            }
            NumberFormat::I32 | NumberFormat::I32Le => {
                check_range(value, f64::from(i32::MIN), f64::from(i32::MAX)).ok_or_else(out_of_range)?;
                (value as i32).to_be_bytes().to_vec()
            }
            NumberFormat::F32 | NumberFormat::F32Le => {
                let narrowed = value as f32;
                if !narrowed.is_finite() {
                    return Err(out_of_range());
                }
                narrowed.to_be_bytes().to_vec()
            }
            NumberFormat::F64 => value.to_be_bytes().to_vec(),
        };

        if self.is_word_swapped() {
            return Ok(vec![bytes[2], bytes[3], bytes[0], bytes[1]]);
        }
        Ok(bytes)
    }
}

fn check_range(value: f64, min: f64, max: f64) -> Option<()> {
    (value >= min && value <= max).then_some(())
}

impl Transform {
    /// Short name for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::Raw => "raw",
            Transform::Unpack { .. } => "unpack",
            Transform::Pack { .. } => "pack",
        }
    }

    /// Unit attached to an `Unpack` transform.
    pub fn unit(&self) -> Option<&str> {
        match self {
            Transform::Unpack { unit, .. } => unit.as_deref(),
            _ => None,
        }
    }

    /// Decode response data (after the byte count) into a scalar.
    ///
    /// `Raw` decodes to `None`: the register is served from its payload.
    pub fn decode(&self, data: &[u8]) -> Result<Option<f64>, TransformError> {
        match self {
            Transform::Raw => Ok(None),
            Transform::Unpack { format, scale, .. } => {
                let value = format.decode(data)?;
                Ok(Some(value * scale))
            }
            Transform::Pack { .. } => Err(TransformError::Direction(self.as_str())),
        }
    }

    /// Encode a scalar as `[byte_len][bytes]`.
    pub fn encode(&self, value: f64) -> Result<Vec<u8>, TransformError> {
        match self {
            Transform::Pack {
                format,
                scale,
                kind,
            } => {
                let scaled = value * scale;
                let coerced = match kind {
                    NumericKind::Int => scaled.trunc(),
                    NumericKind::Float => scaled,
                };
                let bytes = format.encode(coerced, *kind)?;

                let mut out = Vec::with_capacity(bytes.len() + 1);
                out.push(bytes.len() as u8);
                out.extend_from_slice(&bytes);
                Ok(out)
            }
            Transform::Raw | Transform::Unpack { .. } => {
                Err(TransformError::Direction(self.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack(format: NumberFormat, scale: f64, kind: NumericKind) -> Transform {
        Transform::Pack {
            format,
            scale,
            kind,
        }
    }

    fn unpack(format: NumberFormat, scale: f64) -> Transform {
        Transform::Unpack {
            format,
            scale,
            unit: None,
        }
    }

    #[test]
    fn test_decode_f32_big_endian() {
        let value = unpack(NumberFormat::F32, 1.0)
            .decode(&[0xc2, 0x2c, 0x92, 0x3c])
            .unwrap()
            .unwrap();

        let expected = f64::from(f32::from_be_bytes([0xc2, 0x2c, 0x92, 0x3c]));
        assert_eq!(value, expected);
        assert!((value + 43.1428).abs() < 0.001);
    }

    #[test]
    fn test_decode_applies_scale() {
        let value = unpack(NumberFormat::U16, 0.1)
            .decode(&[0x03, 0xe8])
            .unwrap()
            .unwrap();
        assert!((value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_word_swapped() {
        // 123.456 = 0x42F6E979, low word first on the wire.
        let value = NumberFormat::F32Le.decode(&[0xe9, 0x79, 0x42, 0xf6]).unwrap();
        assert!((value - 123.456).abs() < 0.001);

        let value = NumberFormat::I32Le.decode(&[0xff, 0xfe, 0xff, 0xff]).unwrap();
        assert_eq!(value, -2.0);
    }

    #[test]
    fn test_decode_width_mismatch() {
        let err = unpack(NumberFormat::F32, 1.0)
            .decode(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::Width {
                format: "f32",
                expected: 4,
                actual: 6
            }
        );
    }

    #[test]
    fn test_raw_decodes_to_none() {
        assert_eq!(Transform::Raw.decode(&[0x01, 0x02]), Ok(None));
    }

    #[test]
    fn test_encode_int16() {
        let bytes = pack(NumberFormat::I16, 1.0, NumericKind::Int)
            .encode(150.0)
            .unwrap();
        assert_eq!(bytes, vec![0x02, 0x00, 0x96]);
    }

    #[test]
    fn test_encode_truncates_toward_zero() {
        let bytes = pack(NumberFormat::I16, 1.0, NumericKind::Int)
            .encode(-43.1428)
            .unwrap();
        assert_eq!(bytes, vec![0x02, 0xff, 0xd5]);
    }

    #[test]
    fn test_encode_scale_before_coercion() {
        let bytes = pack(NumberFormat::U16, 10.0, NumericKind::Int)
            .encode(23.45)
            .unwrap();
        assert_eq!(bytes, vec![0x02, 0x00, 0xea]);
    }

    #[test]
    fn test_encode_float_formats() {
        let bytes = pack(NumberFormat::F32, 1.0, NumericKind::Float)
            .encode(-43.142807)
            .unwrap();
        assert_eq!(bytes, vec![0x04, 0xc2, 0x2c, 0x92, 0x3c]);

        let bytes = pack(NumberFormat::F32Le, 1.0, NumericKind::Int)
            .encode(1.0)
            .unwrap();
        assert_eq!(bytes, vec![0x04, 0x00, 0x00, 0x3f, 0x80]);
    }

    #[test]
    fn test_encode_errors() {
        assert!(matches!(
            pack(NumberFormat::I16, 1.0, NumericKind::Float).encode(1.5),
            Err(TransformError::Coercion { .. })
        ));
        assert!(matches!(
            pack(NumberFormat::I16, 1.0, NumericKind::Int).encode(40000.0),
            Err(TransformError::OutOfRange { .. })
        ));
        assert!(matches!(
            pack(NumberFormat::U16, 1.0, NumericKind::Int).encode(-1.0),
            Err(TransformError::OutOfRange { .. })
        ));
        assert!(matches!(
            pack(NumberFormat::F32, 1.0, NumericKind::Float).encode(f64::NAN),
            Err(TransformError::NotFinite(_))
        ));
        assert!(matches!(
            pack(NumberFormat::F32, 1.0, NumericKind::Float).encode(1e300),
            Err(TransformError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_direction_errors() {
        assert_eq!(
            Transform::Raw.encode(1.0),
            Err(TransformError::Direction("raw"))
        );
        assert_eq!(
            pack(NumberFormat::I16, 1.0, NumericKind::Int).decode(&[0, 1]),
            Err(TransformError::Direction("pack"))
        );
    }

    #[test]
    fn test_deserialize_transforms() {
        let t: Transform = json5::from_str(r#"{ type: "unpack", format: "f32", unit: "W" }"#).unwrap();
        assert_eq!(
            t,
            Transform::Unpack {
                format: NumberFormat::F32,
                scale: 1.0,
                unit: Some("W".to_string())
            }
        );
        assert_eq!(t.unit(), Some("W"));

        let t: Transform = json5::from_str(r#"{ type: "pack", format: "i16", scale: 0.1 }"#).unwrap();
        assert_eq!(t, pack(NumberFormat::I16, 0.1, NumericKind::Int));

        let t: Transform = json5::from_str(r#"{ type: "raw" }"#).unwrap();
        assert_eq!(t, Transform::Raw);
    }
}
