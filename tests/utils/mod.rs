#![allow(dead_code)] // not every test binary uses every helper

use ferrisetw_decode::builder::{EventRecordBuilder, SchemaBuilder};
use ferrisetw_decode::native::etw_types::EventDescriptor;
use ferrisetw_decode::Guid;

/// Microsoft-Windows-Kernel-Process
pub const KERNEL_PROCESS_PROVIDER: &str = "22FB2CD6-0E7B-422B-A0C7-2FAD1FD0E716";

/// Route the crate log messages to the test output
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn provider_guid() -> Guid {
    KERNEL_PROCESS_PROVIDER.parse().unwrap()
}

pub fn descriptor(id: u16) -> EventDescriptor {
    EventDescriptor {
        id,
        version: 1,
        level: 4,
        ..Default::default()
    }
}

/// A schema builder for event `id` of the test provider
pub fn schema_for(id: u16) -> SchemaBuilder {
    SchemaBuilder::new(provider_guid(), descriptor(id))
}

/// A record builder for event `id` of the test provider
pub fn record_for(id: u16) -> EventRecordBuilder {
    EventRecordBuilder::new()
        .provider_id(provider_guid())
        .descriptor(descriptor(id))
        .process_id(4242)
        .thread_id(4243)
}

/// Null-terminated little-endian UTF-16
pub fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Little-endian UTF-16, without terminator
pub fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Builds a user data blob one field at a time
#[derive(Default)]
pub struct UserData {
    bytes: Vec<u8>,
}

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.bytes.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.bytes.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn guid(mut self, v: Guid) -> Self {
        self.bytes.extend_from_slice(&v.to_bytes());
        self
    }

    pub fn raw(mut self, v: &[u8]) -> Self {
        self.bytes.extend_from_slice(v);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
