//! Typed register values and the fixed-size payload codec.
//!
//! Every value crossing the SMC boundary travels in a 32-byte buffer
//! ([`PAYLOAD_SIZE`]); only the first `len` bytes are meaningful and the
//! rest is zero padding. Multi-byte integers are big-endian on the wire.
//! Decoding is strict: a value whose declared length does not match its
//! type's size is an error, never a truncated or zero-extended number.

use strum_macros::Display;

use crate::error::SmcError;

/// Fixed payload size of the SMC call structure.
pub const PAYLOAD_SIZE: usize = 32;

/// SMC data types, identified on the wire by a four-character type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DataType {
    /// `ui8 ` - unsigned 8-bit integer
    #[strum(to_string = "ui8")]
    Ui8,
    /// `ui16` - unsigned 16-bit integer, big-endian
    #[strum(to_string = "ui16")]
    Ui16,
    /// `ui32` - unsigned 32-bit integer, big-endian
    #[strum(to_string = "ui32")]
    Ui32,
    /// `flt ` - IEEE-754 single precision, big-endian bit pattern
    #[strum(to_string = "flt")]
    Flt,
    /// `sp78` - signed 8.8 fixed point; raw / 256.0 is degrees Celsius
    #[strum(to_string = "sp78")]
    Sp78,
    /// `flag` - single boolean byte
    #[strum(to_string = "flag")]
    Flag,
    /// `hex_` - single raw byte, rendered as hex
    #[strum(to_string = "hex8")]
    Hex8,
    /// `ch8*` - character string, variable length
    #[strum(to_string = "ch8*")]
    Ch8,
}

impl DataType {
    /// The four-character wire code for this type.
    pub fn code(&self) -> [u8; 4] {
        match self {
            DataType::Ui8 => *b"ui8 ",
            DataType::Ui16 => *b"ui16",
            DataType::Ui32 => *b"ui32",
            DataType::Flt => *b"flt ",
            DataType::Sp78 => *b"sp78",
            DataType::Flag => *b"flag",
            DataType::Hex8 => *b"hex_",
            DataType::Ch8 => *b"ch8*",
        }
    }

    pub fn from_code(code: [u8; 4]) -> Result<Self, SmcError> {
        match &code {
            b"ui8 " => Ok(DataType::Ui8),
            b"ui16" => Ok(DataType::Ui16),
            b"ui32" => Ok(DataType::Ui32),
            b"flt " => Ok(DataType::Flt),
            b"sp78" => Ok(DataType::Sp78),
            b"flag" => Ok(DataType::Flag),
            b"hex_" => Ok(DataType::Hex8),
            b"ch8*" => Ok(DataType::Ch8),
            _ => Err(SmcError::UnknownType(
                String::from_utf8_lossy(&code).to_string(),
            )),
        }
    }

    /// Declared byte length, or `None` for variable-length types.
    pub fn size(&self) -> Option<usize> {
        match self {
            DataType::Ui8 | DataType::Flag | DataType::Hex8 => Some(1),
            DataType::Ui16 | DataType::Sp78 => Some(2),
            DataType::Ui32 | DataType::Flt => Some(4),
            DataType::Ch8 => None,
        }
    }
}

/// A typed register value: type tag, meaningful length, 32-byte buffer.
#[derive(Clone, Copy, PartialEq)]
pub struct SmcValue {
    data_type: DataType,
    len: usize,
    bytes: [u8; PAYLOAD_SIZE],
}

impl SmcValue {
    /// Build a value from raw register bytes, enforcing the type's size.
    pub fn new(data_type: DataType, data: &[u8]) -> Result<Self, SmcError> {
        if data.len() > PAYLOAD_SIZE {
            return Err(SmcError::PayloadTooLarge {
                limit: PAYLOAD_SIZE,
                actual: data.len(),
            });
        }
        if let Some(expected) = data_type.size() {
            if data.len() != expected {
                return Err(SmcError::SizeMismatch {
                    expected,
                    actual: data.len(),
                });
            }
        }
        let mut bytes = [0u8; PAYLOAD_SIZE];
        bytes[..data.len()].copy_from_slice(data);
        Ok(SmcValue {
            data_type,
            len: data.len(),
            bytes,
        })
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The meaningful bytes of the payload.
    pub fn raw(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The full zero-padded protocol buffer.
    pub fn payload(&self) -> &[u8; PAYLOAD_SIZE] {
        &self.bytes
    }

    fn check(&self, accepted: &[DataType], expected_len: usize) -> Result<(), SmcError> {
        if !accepted.contains(&self.data_type) {
            return Err(SmcError::TypeMismatch {
                expected: accepted[0],
                actual: self.data_type,
            });
        }
        if self.len != expected_len {
            return Err(SmcError::SizeMismatch {
                expected: expected_len,
                actual: self.len,
            });
        }
        Ok(())
    }

    pub fn as_u8(&self) -> Result<u8, SmcError> {
        // hex_ registers are plain unsigned bytes on the wire.
        self.check(&[DataType::Ui8, DataType::Hex8], 1)?;
        Ok(self.bytes[0])
    }

    pub fn as_u16(&self) -> Result<u16, SmcError> {
        self.check(&[DataType::Ui16], 2)?;
        Ok(u16::from_be_bytes([self.bytes[0], self.bytes[1]]))
    }

    pub fn as_u32(&self) -> Result<u32, SmcError> {
        self.check(&[DataType::Ui32], 4)?;
        Ok(u32::from_be_bytes([
            self.bytes[0],
            self.bytes[1],
            self.bytes[2],
            self.bytes[3],
        ]))
    }

    /// Reinterprets the big-endian 32-bit pattern as IEEE-754.
    pub fn as_f32(&self) -> Result<f32, SmcError> {
        self.check(&[DataType::Flt], 4)?;
        let bits = u32::from_be_bytes([
            self.bytes[0],
            self.bytes[1],
            self.bytes[2],
            self.bytes[3],
        ]);
        Ok(f32::from_bits(bits))
    }

    /// Signed 8.8 fixed point: raw / 256.0 degrees Celsius.
    pub fn as_temperature(&self) -> Result<f32, SmcError> {
        self.check(&[DataType::Sp78], 2)?;
        let raw = i16::from_be_bytes([self.bytes[0], self.bytes[1]]);
        Ok(f32::from(raw) / 256.0)
    }

    pub fn as_bool(&self) -> Result<bool, SmcError> {
        self.check(&[DataType::Flag, DataType::Ui8, DataType::Hex8], 1)?;
        Ok(self.bytes[0] != 0)
    }

    pub fn as_str(&self) -> Result<String, SmcError> {
        if self.data_type != DataType::Ch8 {
            return Err(SmcError::TypeMismatch {
                expected: DataType::Ch8,
                actual: self.data_type,
            });
        }
        let end = self.raw().iter().position(|&b| b == 0).unwrap_or(self.len);
        Ok(String::from_utf8_lossy(&self.bytes[..end]).to_string())
    }

    pub fn encode_u8(data_type: DataType, v: u8) -> Result<Self, SmcError> {
        require_size(data_type, 1)?;
        SmcValue::new(data_type, &[v])
    }

    pub fn encode_u16(data_type: DataType, v: u16) -> Result<Self, SmcError> {
        if data_type != DataType::Ui16 {
            return Err(SmcError::TypeMismatch {
                expected: DataType::Ui16,
                actual: data_type,
            });
        }
        SmcValue::new(data_type, &v.to_be_bytes())
    }

    pub fn encode_u32(data_type: DataType, v: u32) -> Result<Self, SmcError> {
        if data_type != DataType::Ui32 {
            return Err(SmcError::TypeMismatch {
                expected: DataType::Ui32,
                actual: data_type,
            });
        }
        SmcValue::new(data_type, &v.to_be_bytes())
    }

    pub fn encode_f32(data_type: DataType, v: f32) -> Result<Self, SmcError> {
        if data_type != DataType::Flt {
            return Err(SmcError::TypeMismatch {
                expected: DataType::Flt,
                actual: data_type,
            });
        }
        SmcValue::new(data_type, &v.to_bits().to_be_bytes())
    }

    pub fn encode_temperature(data_type: DataType, celsius: f32) -> Result<Self, SmcError> {
        if data_type != DataType::Sp78 {
            return Err(SmcError::TypeMismatch {
                expected: DataType::Sp78,
                actual: data_type,
            });
        }
        let raw = (celsius * 256.0) as i16;
        SmcValue::new(data_type, &raw.to_be_bytes())
    }
}

fn require_size(data_type: DataType, expected: usize) -> Result<(), SmcError> {
    match data_type.size() {
        Some(size) if size == expected => Ok(()),
        Some(size) => Err(SmcError::SizeMismatch {
            expected,
            actual: size,
        }),
        None => Err(SmcError::TypeMismatch {
            expected: DataType::Ui8,
            actual: data_type,
        }),
    }
}

impl std::fmt::Debug for SmcValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SmcValue({} {} bytes: {})",
            self.data_type,
            self.len,
            hex::encode(self.raw())
        )
    }
}
