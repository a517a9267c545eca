use std::iter;

/// Encode a Rust string the way TDH stores strings: UTF-16, null-terminated
pub trait EncodeUtf16 {
    fn into_utf16(self) -> Vec<u16>;

    /// Little-endian bytes of [`EncodeUtf16::into_utf16`]
    fn into_utf16_bytes(self) -> Vec<u8>
    where
        Self: Sized,
    {
        self.into_utf16()
            .into_iter()
            .flat_map(|u| u.to_le_bytes())
            .collect()
    }
}

impl EncodeUtf16 for &str {
    fn into_utf16(self) -> Vec<u16> {
        self.encode_utf16() // Make a UTF-16 iterator
            .chain(iter::once(0)) // Append a null
            .collect() // Collect the iterator into a vector
    }
}

impl EncodeUtf16 for String {
    fn into_utf16(self) -> Vec<u16> {
        self.as_str().into_utf16()
    }
}
