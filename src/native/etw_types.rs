//! Basic ETW types
//!
//! The `etw_types` module provides bit-exact definitions of the native structures that make up an
//! event record (`EVENT_HEADER`, `EVENT_DESCRIPTOR`, `EVENT_RECORD`, `EVENT_HEADER_EXTENDED_DATA_ITEM`),
//! along with the flag and enum values needed to interpret them.
//!
//! The layouts are those of a 64-bit process, with little-endian fields. Pointer-valued fields of a
//! record are expected to hold byte offsets relative to the start of the record buffer
//! (see [`EventRecord`]).
//!
//! In most cases a user of the crate won't have to deal with these raw layouts and can use the
//! safe views exposed by [`EventRecord`] and [`Schema`](crate::schema::Schema) instead.
use zerocopy::byteorder::{LittleEndian, I64, U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

pub mod event_record;
pub use event_record::{CpuTime, EventRecord, RecordError};

pub mod extended_data;
pub use extended_data::{
    EventHeaderExtendedDataItem, ExtendedDataItem, ExtendedDataScanner, ExtendedDataType,
};

// EVENT_HEADER.Flags values
pub const EVENT_HEADER_FLAG_EXTENDED_INFO: u16 = 0x0001;
pub const EVENT_HEADER_FLAG_PRIVATE_SESSION: u16 = 0x0002;
pub const EVENT_HEADER_FLAG_STRING_ONLY: u16 = 0x0004;
pub const EVENT_HEADER_FLAG_TRACE_MESSAGE: u16 = 0x0008;
pub const EVENT_HEADER_FLAG_NO_CPUTIME: u16 = 0x0010;
pub const EVENT_HEADER_FLAG_32_BIT_HEADER: u16 = 0x0020;
pub const EVENT_HEADER_FLAG_64_BIT_HEADER: u16 = 0x0040;
pub const EVENT_HEADER_FLAG_DECODE_GUID: u16 = 0x0080;
pub const EVENT_HEADER_FLAG_CLASSIC_HEADER: u16 = 0x0100;
pub const EVENT_HEADER_FLAG_PROCESSOR_INDEX: u16 = 0x0200;

/// Native `EVENT_DESCRIPTOR` (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct EventDescriptorRaw {
    pub id: U16<LittleEndian>,
    pub version: u8,
    pub channel: u8,
    pub level: u8,
    pub opcode: u8,
    pub task: U16<LittleEndian>,
    pub keyword: U64<LittleEndian>,
}

/// Native `EVENT_HEADER` (80 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct EventHeaderRaw {
    pub size: U16<LittleEndian>,
    pub header_type: U16<LittleEndian>,
    pub flags: U16<LittleEndian>,
    pub event_property: U16<LittleEndian>,
    pub thread_id: U32<LittleEndian>,
    pub process_id: U32<LittleEndian>,
    pub timestamp: I64<LittleEndian>,
    pub provider_id: [u8; 16],
    pub event_descriptor: EventDescriptorRaw,
    /// Union of `{KernelTime: u32, UserTime: u32}` and `ProcessorTime: u64`
    pub time: [u8; 8],
    pub activity_id: [u8; 16],
}

/// Native `EVENT_RECORD` (112 bytes), with pointers relocated to buffer offsets
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct EventRecordRaw {
    pub event_header: EventHeaderRaw,
    /// Union of `{ProcessorNumber: u8, Alignment: u8}` and `ProcessorIndex: u16`
    pub processor: [u8; 2],
    pub logger_id: U16<LittleEndian>,
    pub extended_data_count: U16<LittleEndian>,
    pub user_data_length: U16<LittleEndian>,
    pub extended_data: U64<LittleEndian>,
    pub user_data: U64<LittleEndian>,
    pub user_context: U64<LittleEndian>,
}

/// Native `EVENT_HEADER_EXTENDED_DATA_ITEM` (16 bytes), with `DataPtr` relocated to a buffer offset
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct ExtendedDataItemRaw {
    pub reserved1: U16<LittleEndian>,
    pub ext_type: U16<LittleEndian>,
    /// Bit 0 is `Linkage`, the rest is reserved
    pub reserved2: U16<LittleEndian>,
    pub data_size: U16<LittleEndian>,
    pub data_ptr: U64<LittleEndian>,
}

/// Value type for an `EVENT_DESCRIPTOR`
///
/// Equality is structural over all fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EventDescriptor {
    pub id: u16,
    pub version: u8,
    pub channel: u8,
    pub level: u8,
    pub opcode: u8,
    pub task: u16,
    pub keyword: u64,
}

impl From<&EventDescriptorRaw> for EventDescriptor {
    fn from(raw: &EventDescriptorRaw) -> Self {
        EventDescriptor {
            id: raw.id.get(),
            version: raw.version,
            channel: raw.channel,
            level: raw.level,
            opcode: raw.opcode,
            task: raw.task.get(),
            keyword: raw.keyword.get(),
        }
    }
}

impl From<&EventDescriptor> for EventDescriptorRaw {
    fn from(d: &EventDescriptor) -> Self {
        EventDescriptorRaw {
            id: U16::new(d.id),
            version: d.version,
            channel: d.channel,
            level: d.level,
            opcode: d.opcode,
            task: U16::new(d.task),
            keyword: U64::new(d.keyword),
        }
    }
}

/// Wrapper over the `DECODING_SOURCE` values
///
/// Tells which kind of metadata TDH used to build a schema.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum DecodingSource {
    DecodingSourceXMLFile = 0,
    DecodingSourceWbem = 1,
    DecodingSourceWPP = 2,
    DecodingSourceTlg = 3,
    DecodingSourceMax = 4,
}

impl From<u32> for DecodingSource {
    fn from(val: u32) -> Self {
        num_traits::FromPrimitive::from_u32(val).unwrap_or(DecodingSource::DecodingSourceMax)
    }
}
