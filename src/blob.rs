//! Bounds-checked reads over borrowed byte buffers
//!
//! Record and schema buffers come from outside this crate and may be truncated or malformed.
//! Every read in this module is validated against the length of the underlying slice, and
//! out-of-range reads yield `None` rather than panicking: a missing value is an expected outcome
//! when decoding ETW data.
use std::fmt;

use crate::native::guid::Guid;

/// A read-only view over a blob of known length, addressed by byte offsets
#[derive(Clone, Copy)]
pub struct BlobReader<'a> {
    blob: &'a [u8],
}

macro_rules! impl_read_primitive {
    ($name:ident, $T:ident) => {
        #[doc = concat!("Read a little-endian `", stringify!($T), "` at `offset`")]
        pub fn $name(&self, offset: usize) -> Option<$T> {
            Some($T::from_le_bytes(self.array(offset)?))
        }
    };
}

impl<'a> BlobReader<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        BlobReader { blob }
    }

    pub fn len(&self) -> usize {
        self.blob.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.blob
    }

    /// Returns `len` bytes starting at `offset`
    ///
    /// `None` if `offset` is not inside the blob or if the range would run past its end.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        if offset >= self.blob.len() {
            return None;
        }
        let end = offset.checked_add(len)?;
        self.blob.get(offset..end)
    }

    /// Returns everything from `offset` to the end of the blob
    pub fn tail(&self, offset: usize) -> Option<&'a [u8]> {
        if offset >= self.blob.len() {
            return None;
        }
        self.blob.get(offset..)
    }

    fn array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.bytes(offset, N)?.try_into().ok()
    }

    impl_read_primitive!(read_u8, u8);
    impl_read_primitive!(read_i8, i8);
    impl_read_primitive!(read_u16, u16);
    impl_read_primitive!(read_i16, i16);
    impl_read_primitive!(read_u32, u32);
    impl_read_primitive!(read_i32, i32);
    impl_read_primitive!(read_u64, u64);
    impl_read_primitive!(read_i64, i64);
    impl_read_primitive!(read_f32, f32);
    impl_read_primitive!(read_f64, f64);

    pub fn read_guid(&self, offset: usize) -> Option<Guid> {
        Some(Guid::from_bytes(&self.array(offset)?))
    }

    /// Read a null-terminated UTF-16 string starting at `offset`
    ///
    /// Returns `None` when `offset` is 0 (the "no string" convention of TDH offsets),
    /// misaligned, outside the blob, or when no terminating null code unit exists before the end of the blob.
    pub fn read_wstr(&self, offset: usize) -> Option<BoundedString<'a>> {
        if offset == 0 || offset % 2 != 0 {
            return None;
        }
        let tail = self.tail(offset)?;
        BoundedString::from_terminated(tail).map(|(s, _)| s)
    }
}

impl fmt::Debug for BlobReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobReader")
            .field("len", &self.blob.len())
            .finish()
    }
}

/// A UTF-16 string borrowed from a buffer, proven to lie within that buffer
///
/// The empty string doubles as the "no value" state, so accessors that may not find a string
/// can hand out `BoundedString::default()` instead of an `Option`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BoundedString<'a> {
    // little-endian code units, terminator excluded, always an even number of bytes
    bytes: &'a [u8],
}

impl<'a> BoundedString<'a> {
    /// Split a terminated string off the start of `bytes`
    ///
    /// On success, also returns the number of bytes consumed, terminator included.
    pub(crate) fn from_terminated(bytes: &'a [u8]) -> Option<(Self, usize)> {
        let units = bytes.chunks_exact(2).position(|c| c[0] == 0 && c[1] == 0)?;
        let len = units * 2;
        Some((BoundedString { bytes: &bytes[..len] }, len + 2))
    }

    /// Wrap a run of code units whose length is known from elsewhere (counted strings)
    ///
    /// A trailing odd byte is ignored.
    pub(crate) fn from_units(bytes: &'a [u8]) -> Self {
        let even = bytes.len() & !1;
        BoundedString {
            bytes: &bytes[..even],
        }
    }

    /// Same as [`Self::from_units`], but stops at the first null code unit if there is one
    pub(crate) fn from_padded_units(bytes: &'a [u8]) -> Self {
        match Self::from_terminated(bytes) {
            Some((s, _)) => s,
            None => Self::from_units(bytes),
        }
    }

    /// Number of UTF-16 code units
    pub fn char_count(&self) -> usize {
        self.bytes.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw little-endian bytes of the string, terminator excluded
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn units(&self) -> impl Iterator<Item = u16> + 'a {
        self.bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
    }

    /// Decode into a `String`, replacing invalid surrogates with U+FFFD
    pub fn to_string_lossy(&self) -> String {
        widestring::decode_utf16_lossy(self.units()).collect()
    }

    /// Compare against a Rust string without allocating
    pub fn eq_str(&self, other: &str) -> bool {
        self.units().eq(other.encode_utf16())
    }
}

impl fmt::Display for BoundedString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in widestring::decode_utf16_lossy(self.units()) {
            fmt::Write::write_char(f, c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BoundedString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

impl PartialEq<str> for BoundedString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.eq_str(other)
    }
}

impl PartialEq<&str> for BoundedString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.eq_str(other)
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Serialize for BoundedString<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.collect_str(self)
    }
}
