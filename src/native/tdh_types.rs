//! Basic TDH types
//!
//! The `tdh_types` module provides an abstraction over the basic TDH types, this module act as a
//! helper for the parser to determine which IN and OUT type are expected from a property within an
//! event
//!
//! It also holds the bit-exact layouts of `TRACE_EVENT_INFO` and `EVENT_PROPERTY_INFO`. These are
//! only ever read through [`Schema`](crate::schema::Schema) and
//! [`PropertyDescriptor`](crate::property::PropertyDescriptor), which guard their unions.
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::native::etw_types::EventDescriptorRaw;

/// Native `TRACE_EVENT_INFO` header (112 bytes), followed by `property_count` [`EventPropertyInfoRaw`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct TraceEventInfoRaw {
    pub provider_guid: [u8; 16],
    pub event_guid: [u8; 16],
    pub event_descriptor: EventDescriptorRaw,
    pub decoding_source: U32<LittleEndian>,
    pub provider_name_offset: U32<LittleEndian>,
    pub level_name_offset: U32<LittleEndian>,
    pub channel_name_offset: U32<LittleEndian>,
    pub keywords_name_offset: U32<LittleEndian>,
    pub task_name_offset: U32<LittleEndian>,
    pub opcode_name_offset: U32<LittleEndian>,
    pub event_message_offset: U32<LittleEndian>,
    pub provider_message_offset: U32<LittleEndian>,
    pub binary_xml_offset: U32<LittleEndian>,
    pub binary_xml_size: U32<LittleEndian>,
    /// Union of `EventNameOffset` and `ActivityIDNameOffset`
    pub event_name_offset: U32<LittleEndian>,
    /// Union of `EventAttributesOffset` and `RelatedActivityIDNameOffset`
    pub event_attributes_offset: U32<LittleEndian>,
    pub property_count: U32<LittleEndian>,
    pub top_level_property_count: U32<LittleEndian>,
    pub flags: U32<LittleEndian>,
}

/// Native `EVENT_PROPERTY_INFO` (24 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromZeroes, FromBytes, AsBytes, Unaligned)]
pub struct EventPropertyInfoRaw {
    pub flags: U32<LittleEndian>,
    pub name_offset: U32<LittleEndian>,
    /// `{InType: u16, OutType: u16, MapNameOffset: u32}` or
    /// `{StructStartIndex: u16, NumOfStructMembers: u16, padding: u32}`
    pub type_union: [u8; 8],
    /// `count` or `countPropertyIndex`
    pub count: U16<LittleEndian>,
    /// `length` or `lengthPropertyIndex`
    pub length: U16<LittleEndian>,
    /// `Reserved` or `{Tags: 28 bits}`
    pub tags: U32<LittleEndian>,
}

impl EventPropertyInfoRaw {
    pub const SIZE: usize = 24;

    pub(crate) fn union_u16(&self, index: usize) -> u16 {
        u16::from_le_bytes([self.type_union[2 * index], self.type_union[2 * index + 1]])
    }

    pub(crate) fn union_u32_high(&self) -> u32 {
        let b = &self.type_union[4..8];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

/// Represent a TDH_IN_TYPE
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq, Hash, Default)]
pub enum TdhInType {
    // Deprecated values are not defined
    #[default]
    InTypeNull,
    InTypeUnicodeString,
    InTypeAnsiString,
    InTypeInt8,    // Field size is 1 byte
    InTypeUInt8,   // Field size is 1 byte
    InTypeInt16,   // Field size is 2 bytes
    InTypeUInt16,  // Field size is 2 bytes
    InTypeInt32,   // Field size is 4 bytes
    InTypeUInt32,  // Field size is 4 bytes
    InTypeInt64,   // Field size is 8 bytes
    InTypeUInt64,  // Field size is 8 bytes
    InTypeFloat,   // Field size is 4 bytes
    InTypeDouble,  // Field size is 8 bytes
    InTypeBoolean, // Field size is 4 bytes
    InTypeBinary,  // Depends on the OutType
    InTypeGuid,
    InTypePointer,
    InTypeFileTime,   // Field size is 8 bytes
    InTypeSystemTime, // Field size is 16 bytes
    InTypeSid,        // Field size determined by the first few bytes of the field
    InTypeHexInt32,
    InTypeHexInt64,
    InTypeCountedString = 300, // u16 byte-count prefix
    InTypeCountedAnsiString,
    InTypeReversedCountedString, // big-endian u16 byte-count prefix
    InTypeReversedCountedAnsiString,
    InTypeNonNullTerminatedString, // Runs to the end of the user data
    InTypeNonNullTerminatedAnsiString,
    InTypeUnicodeChar,
    InTypeAnsiChar,
    InTypeSizeT,
    InTypeHexDump, // u32 byte-count prefix
    InTypeWbemSid, // TOKEN_USER followed by a SID
}

impl TdhInType {
    /// Size of a single element of a fixed-size type
    ///
    /// `pointer_size` is used for pointer-sized types. Returns `None` for variable-sized types.
    pub fn fixed_size(&self, pointer_size: usize) -> Option<usize> {
        let size = match self {
            TdhInType::InTypeInt8
            | TdhInType::InTypeUInt8
            | TdhInType::InTypeAnsiChar => 1,
            TdhInType::InTypeInt16 | TdhInType::InTypeUInt16 | TdhInType::InTypeUnicodeChar => 2,
            TdhInType::InTypeInt32
            | TdhInType::InTypeUInt32
            | TdhInType::InTypeHexInt32
            | TdhInType::InTypeFloat
            | TdhInType::InTypeBoolean => 4,
            TdhInType::InTypeInt64
            | TdhInType::InTypeUInt64
            | TdhInType::InTypeHexInt64
            | TdhInType::InTypeDouble
            | TdhInType::InTypeFileTime => 8,
            TdhInType::InTypeGuid | TdhInType::InTypeSystemTime => 16,
            TdhInType::InTypePointer | TdhInType::InTypeSizeT => pointer_size,
            _ => return None,
        };
        Some(size)
    }
}

/// Represent a TDH_OUT_TYPE
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq, Hash, Default)]
pub enum TdhOutType {
    #[default]
    OutTypeNull,
    OutTypeString,
    OutTypeDateTime,
    OutTypeInt8,    // Field size is 1 byte
    OutTypeUInt8,   // Field size is 1 byte
    OutTypeInt16,   // Field size is 2 bytes
    OutTypeUInt16,  // Field size is 2 bytes
    OutTypeInt32,   // Field size is 4 bytes
    OutTypeUInt32,  // Field size is 4 bytes
    OutTypeInt64,   // Field size is 8 bytes
    OutTypeUInt64,  // Field size is 8 bytes
    OutTypeFloat,   // Field size is 4 bytes
    OutTypeDouble,  // Field size is 8 bytes
    OutTypeBoolean, // Field size is 4 bytes
    OutTypeGuid,
    OutTypeHexBinary,
    OutTypeHexInt8,
    OutTypeHexInt16,
    OutTypeHexInt32,
    OutTypeHexInt64,
    OutTypePid,
    OutTypeTid,
    OutTypePort,
    OutTypeIpv4,
    OutTypeIpv6,
    OutTypeSocketAddress,
    OutTypeCimDateTime,
    OutTypeEtwTime,
    OutTypeXml,
    OutTypeErrorCode,
    OutTypeWin32Error,
    OutTypeNtStatus,
    OutTypeHResult,
    OutTypeCultureInsensitiveDateTime,
    OutTypeJson,
    OutTypeUtf8,
    OutTypePkcs7,
    OutTypeCodePointer,
    OutTypeDatetimeUtc,
}

bitflags! {
    /// Represents the Property flags
    ///
    /// See: [Property Flags enum](https://docs.microsoft.com/en-us/windows/win32/api/tdh/ne-tdh-property_flags)
    #[derive(Default)]
    pub struct PropertyFlags: u32 {
        const PROPERTY_STRUCT = 0x1;
        const PROPERTY_PARAM_LENGTH = 0x2;
        const PROPERTY_PARAM_COUNT = 0x4;
        const PROPERTY_WBEMXML_FRAGMENT = 0x8;
        const PROPERTY_PARAM_FIXED_LENGTH = 0x10;
        const PROPERTY_PARAM_FIXED_COUNT = 0x20;
        const PROPERTY_HAS_TAGS = 0x40;
        const PROPERTY_HAS_CUSTOM_SCHEMA = 0x80;
    }
}

impl From<u32> for PropertyFlags {
    fn from(val: u32) -> Self {
        PropertyFlags::from_bits_truncate(val)
    }
}

bitflags! {
    /// `TEMPLATE_FLAGS` found in `TRACE_EVENT_INFO.Flags`
    #[derive(Default)]
    pub struct TemplateFlags: u32 {
        const TEMPLATE_EVENT_DATA = 0x1;
        const TEMPLATE_USER_DATA = 0x2;
        const TEMPLATE_CONTROL_GUID = 0x4;
    }
}
