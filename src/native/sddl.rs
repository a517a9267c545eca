//! Security identifiers (SID) found in event payloads and extended data
//!
//! A SID is `Revision: u8, SubAuthorityCount: u8, IdentifierAuthority: [u8; 6] (big-endian),
//! SubAuthority: [u32; SubAuthorityCount]`, so its size is only known once its second byte is read.
use std::fmt::{self, Write};

/// A SID borrowed from a buffer, validated to fit in it
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sid<'a> {
    bytes: &'a [u8],
}

impl<'a> Sid<'a> {
    /// Size of a SID with no sub-authority
    pub const MIN_SIZE: usize = 8;

    /// Size of a SID with `sub_authority_count` sub-authorities
    pub const fn size_for(sub_authority_count: u8) -> usize {
        Self::MIN_SIZE + 4 * sub_authority_count as usize
    }

    /// Split a SID off the start of `bytes`
    ///
    /// Returns `None` if `bytes` is shorter than the size the SID declares for itself.
    pub fn from_bytes(bytes: &'a [u8]) -> Option<Self> {
        let count = *bytes.get(1)?;
        let size = Self::size_for(count);
        Some(Sid {
            bytes: bytes.get(..size)?,
        })
    }

    /// Size of this SID, in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn revision(&self) -> u8 {
        self.bytes[0]
    }

    pub fn sub_authority_count(&self) -> u8 {
        self.bytes[1]
    }

    /// The 48-bit identifier authority
    pub fn identifier_authority(&self) -> u64 {
        self.bytes[2..8]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
    }

    pub fn sub_authorities(&self) -> impl Iterator<Item = u32> + 'a {
        self.bytes[Self::MIN_SIZE..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }
}

/// The `S-R-I-S-S...` string form, as produced by `ConvertSidToStringSid`
impl fmt::Display for Sid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-", self.revision())?;

        let authority = self.identifier_authority();
        if authority >> 32 == 0 {
            write!(f, "{}", authority)?;
        } else {
            write!(f, "0x{:012X}", authority)?;
        }

        for sub in self.sub_authorities() {
            f.write_char('-')?;
            write!(f, "{}", sub)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Sid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Serialize for Sid<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.collect_str(self)
    }
}
