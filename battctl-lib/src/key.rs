use std::fmt;
use std::str::FromStr;

use crate::error::SmcError;

/// A four-byte SMC register key, conventionally four printable ASCII
/// characters (`BCLM`, `CH0B`, `TB0T`, ...).
///
/// Equality is byte-for-byte. The wire representation is the big-endian
/// `u32` packing of the four bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; 4]);

impl Key {
    pub const fn new(code: [u8; 4]) -> Self {
        Key(code)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Big-endian packing used by the SMC call structure.
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn from_u32(raw: u32) -> Self {
        Key(raw.to_be_bytes())
    }
}

impl FromStr for Key {
    type Err = SmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| SmcError::InvalidKey(s.to_string()))?;
        Ok(Key(bytes))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(\"{self}\")")
    }
}
