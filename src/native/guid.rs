//! The GUID type used for provider, activity and event identifiers
//!
//! Laid out like the Windows `GUID` struct, so that `data1`, `data2` and `data3` are stored
//! little-endian in event buffers while `data4` is a plain byte array.
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

/// A 128-bit globally unique identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Returned when a string cannot be parsed into a [`Guid`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidParseError(String);

impl Display for GuidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid GUID string {:?}", self.0)
    }
}

impl std::error::Error for GuidParseError {}

impl Guid {
    /// The all-zero GUID
    pub const NULL: Guid = Guid::from_values(0, 0, 0, [0; 8]);

    /// Size of a GUID inside a buffer
    pub const SIZE: usize = 16;

    pub const fn from_values(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Decode a GUID from its 16-byte in-memory representation
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Guid {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4,
        }
    }

    /// Decode a GUID from the start of `bytes`, or `None` if fewer than 16 bytes are available
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: &[u8; 16] = bytes.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(array))
    }

    /// The 16-byte in-memory representation of this GUID
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.data1.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.data2.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.data3.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.data4);
        bytes
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

impl Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl FromStr for Guid {
    type Err = GuidParseError;

    /// Accepts `D733D8B0-7D18-4AEB-A3FC-8C4613BC2A40`, optionally wrapped in braces
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || GuidParseError(s.to_owned());

        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|t| t.strip_suffix('}'))
            .unwrap_or(trimmed);

        let groups: Vec<&str> = inner.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if groups.len() != lengths.len()
            || groups
                .iter()
                .zip(lengths.iter())
                .any(|(g, l)| g.len() != *l || !g.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(err());
        }

        let data1 = u32::from_str_radix(groups[0], 16).map_err(|_| err())?;
        let data2 = u16::from_str_radix(groups[1], 16).map_err(|_| err())?;
        let data3 = u16::from_str_radix(groups[2], 16).map_err(|_| err())?;

        let tail = format!("{}{}", groups[3], groups[4]);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[2 * i..2 * i + 2], 16).map_err(|_| err())?;
        }

        Ok(Guid::from_values(data1, data2, data3, data4))
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Serialize for Guid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        if serializer.is_human_readable() {
            return serializer.collect_str(self);
        }

        serde::ser::Serialize::serialize(
            &(self.data1, self.data2, self.data3, self.data4),
            serializer,
        )
    }
}
