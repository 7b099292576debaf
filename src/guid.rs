//! 128-bit archive identifiers
//!
//! Archive GUIDs are four little-endian `u32` words. The all-zero GUID is the
//! sentinel for the primary (static) key; every other GUID names a dynamic key.

use std::fmt;
use std::io::Read;
use std::str::FromStr;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl Guid {
    /// Sentinel GUID of the primary key
    pub const ZERO: Guid = Guid { a: 0, b: 0, c: 0, d: 0 };

    pub const fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Guid { a, b, c, d }
    }

    pub fn is_zero(&self) -> bool {
        *self == Guid::ZERO
    }

    /// Read a GUID stored as four little-endian words
    pub fn read_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Guid {
            a: reader.read_u32::<LittleEndian>()?,
            b: reader.read_u32::<LittleEndian>()?,
            c: reader.read_u32::<LittleEndian>()?,
            d: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.a.to_le_bytes());
        out[4..8].copy_from_slice(&self.b.to_le_bytes());
        out[8..12].copy_from_slice(&self.c.to_le_bytes());
        out[12..16].copy_from_slice(&self.d.to_le_bytes());
        out
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}{:08X}{:08X}", self.a, self.b, self.c, self.d)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

impl FromStr for Guid {
    type Err = Error;

    /// Accepts the canonical 32 hex digit form; dashes are ignored
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.trim().chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidGuid(s.to_string()));
        }

        let word = |i: usize| {
            u32::from_str_radix(&digits[i * 8..(i + 1) * 8], 16)
                .map_err(|_| Error::InvalidGuid(s.to_string()))
        };

        Ok(Guid {
            a: word(0)?,
            b: word(1)?,
            c: word(2)?,
            d: word(3)?,
        })
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let guid = Guid::new(0x0123ABCD, 0x1, 0xFFFFFFFF, 0xDEADBEEF);
        let text = guid.to_string();
        assert_eq!(text, "0123ABCD00000001FFFFFFFFDEADBEEF");
        assert_eq!(text.parse::<Guid>().unwrap(), guid);
        assert_eq!(
            "0123abcd-00000001-ffffffff-deadbeef".parse::<Guid>().unwrap(),
            guid
        );
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(Guid::ZERO.is_zero());
        assert!(!Guid::new(0, 0, 0, 1).is_zero());
        assert_eq!(Guid::ZERO.to_string(), "0".repeat(32));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("xyz".parse::<Guid>().is_err());
        assert!("0123".parse::<Guid>().is_err());
    }

    #[test]
    fn test_le_bytes_read_back() {
        let guid = Guid::new(1, 2, 3, 4);
        let bytes = guid.to_le_bytes();
        let read = Guid::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, guid);
    }

    #[test]
    fn test_serde_as_string() {
        let guid = Guid::new(0xA, 0xB, 0xC, 0xD);
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"0000000A0000000B0000000C0000000D\"");
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guid);
    }
}
