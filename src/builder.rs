//! Writers for record and schema buffers
//!
//! Code that receives native `EVENT_RECORD`s and `TRACE_EVENT_INFO`s (e.g. from a trace
//! session callback) can use these builders to flatten them into self-contained buffers that
//! [`EventRecord`](crate::EventRecord) and [`Schema`](crate::Schema) understand.
//!
//! A record buffer is laid out as the fixed `EVENT_RECORD`, then the extended data item array,
//! then each item payload (8-byte aligned), then the user data.
//! A schema buffer is laid out as the `TRACE_EVENT_INFO` header, then the property array, then the
//! string table.
use zerocopy::byteorder::{LittleEndian, I64, U16, U32, U64};
use zerocopy::AsBytes;

use crate::native::etw_types::{
    DecodingSource, EventDescriptor, EventDescriptorRaw, EventRecordRaw, ExtendedDataItemRaw,
    EVENT_HEADER_FLAG_EXTENDED_INFO,
};
use crate::native::guid::Guid;
use crate::native::tdh_types::{
    EventPropertyInfoRaw, PropertyFlags, TdhInType, TdhOutType, TemplateFlags, TraceEventInfoRaw,
};
use crate::utils::EncodeUtf16;
use crate::EventRecord;

const PAYLOAD_ALIGNMENT: usize = 8;

fn pad_to(buffer: &mut Vec<u8>, alignment: usize) {
    let rem = buffer.len() % alignment;
    if rem != 0 {
        buffer.resize(buffer.len() + alignment - rem, 0);
    }
}

/// Builds a relocated record buffer
#[derive(Debug, Clone, Default)]
pub struct EventRecordBuilder {
    raw: EventRecordRaw,
    extended_items: Vec<(u16, Vec<u8>)>,
    user_data: Vec<u8>,
}

impl EventRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_id(mut self, provider_id: Guid) -> Self {
        self.raw.event_header.provider_id = provider_id.to_bytes();
        self
    }

    pub fn descriptor(mut self, descriptor: EventDescriptor) -> Self {
        self.raw.event_header.event_descriptor = EventDescriptorRaw::from(&descriptor);
        self
    }

    pub fn activity_id(mut self, activity_id: Guid) -> Self {
        self.raw.event_header.activity_id = activity_id.to_bytes();
        self
    }

    pub fn process_id(mut self, process_id: u32) -> Self {
        self.raw.event_header.process_id = U32::new(process_id);
        self
    }

    pub fn thread_id(mut self, thread_id: u32) -> Self {
        self.raw.event_header.thread_id = U32::new(thread_id);
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.raw.event_header.timestamp = I64::new(timestamp);
        self
    }

    /// Adds `EVENT_HEADER_FLAG_*` values to the header flags
    pub fn flags(mut self, flags: u16) -> Self {
        let current = self.raw.event_header.flags.get();
        self.raw.event_header.flags = U16::new(current | flags);
        self
    }

    pub fn event_property(mut self, event_property: u16) -> Self {
        self.raw.event_header.event_property = U16::new(event_property);
        self
    }

    /// The raw 8 bytes of the `{KernelTime, UserTime} | ProcessorTime` union
    pub fn cpu_time(mut self, time: [u8; 8]) -> Self {
        self.raw.event_header.time = time;
        self
    }

    /// The raw `{ProcessorNumber, Alignment} | ProcessorIndex` union
    pub fn processor(mut self, processor: [u8; 2]) -> Self {
        self.raw.processor = processor;
        self
    }

    pub fn logger_id(mut self, logger_id: u16) -> Self {
        self.raw.logger_id = U16::new(logger_id);
        self
    }

    /// Appends an extended data item
    pub fn extended_item(mut self, ext_type: u16, data: &[u8]) -> Self {
        self.extended_items.push((ext_type, data.to_vec()));
        self
    }

    pub fn user_data(mut self, user_data: &[u8]) -> Self {
        self.user_data = user_data.to_vec();
        self
    }

    /// Lays out the buffer.
    ///
    /// Extended items and user data longer than `u16::MAX` bytes are cut, as their size fields are 16-bit.
    pub fn build(self) -> Vec<u8> {
        let mut raw = self.raw;
        let items_offset = EventRecord::FIXED_SIZE;
        let items_len = self.extended_items.len() * std::mem::size_of::<ExtendedDataItemRaw>();

        let mut payloads = Vec::new();
        let mut items = Vec::with_capacity(self.extended_items.len());
        for (ext_type, data) in &self.extended_items {
            let size = data.len().min(u16::MAX as usize);
            let offset = items_offset + items_len + payloads.len();
            items.push(ExtendedDataItemRaw {
                ext_type: U16::new(*ext_type),
                data_size: U16::new(size as u16),
                data_ptr: U64::new(offset as u64),
                ..Default::default()
            });
            payloads.extend_from_slice(&data[..size]);
            pad_to(&mut payloads, PAYLOAD_ALIGNMENT);
        }

        if !items.is_empty() {
            let flags = raw.event_header.flags.get() | EVENT_HEADER_FLAG_EXTENDED_INFO;
            raw.event_header.flags = U16::new(flags);
        }
        raw.extended_data_count = U16::new(items.len().min(u16::MAX as usize) as u16);
        raw.extended_data = U64::new(if items.is_empty() { 0 } else { items_offset as u64 });

        let user_data_offset = items_offset + items_len + payloads.len();
        let user_len = self.user_data.len().min(u16::MAX as usize);
        raw.user_data_length = U16::new(user_len as u16);
        raw.user_data = U64::new(user_data_offset as u64);

        let total = user_data_offset + user_len;
        raw.event_header.size = U16::new(total.min(u16::MAX as usize) as u16);

        let mut buffer = Vec::with_capacity(total);
        buffer.extend_from_slice(raw.as_bytes());
        for item in &items {
            buffer.extend_from_slice(item.as_bytes());
        }
        buffer.extend_from_slice(&payloads);
        buffer.extend_from_slice(&self.user_data[..user_len]);
        buffer
    }
}

#[derive(Debug, Clone)]
enum PropertyShape {
    Scalar {
        in_type: u16,
        out_type: u16,
        map_name: Option<String>,
    },
    Struct {
        start_index: u16,
        member_count: u16,
    },
}

/// One entry of the property array of a [`SchemaBuilder`]
#[derive(Debug, Clone)]
pub struct PropertyDefinition {
    name: String,
    shape: PropertyShape,
    flags: PropertyFlags,
    count: u16,
    length: u16,
    tags: u32,
}

impl PropertyDefinition {
    /// A simple-typed property, with a count of 1 and a length of 0
    pub fn scalar(name: &str, in_type: TdhInType, out_type: TdhOutType) -> Self {
        Self::raw_scalar(name, in_type as u16, out_type as u16)
    }

    /// Same as [`Self::scalar`], taking type codes this crate may not know about
    pub fn raw_scalar(name: &str, in_type: u16, out_type: u16) -> Self {
        PropertyDefinition {
            name: name.to_string(),
            shape: PropertyShape::Scalar {
                in_type,
                out_type,
                map_name: None,
            },
            flags: PropertyFlags::empty(),
            count: 1,
            length: 0,
            tags: 0,
        }
    }

    /// A struct whose members are the `member_count` properties starting at `start_index`
    pub fn structure(name: &str, start_index: u16, member_count: u16) -> Self {
        PropertyDefinition {
            name: name.to_string(),
            shape: PropertyShape::Struct {
                start_index,
                member_count,
            },
            flags: PropertyFlags::PROPERTY_STRUCT,
            count: 1,
            length: 0,
            tags: 0,
        }
    }

    pub fn with_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    pub fn with_fixed_length(mut self, length: u16) -> Self {
        self.flags |= PropertyFlags::PROPERTY_PARAM_FIXED_LENGTH;
        self.length = length;
        self
    }

    /// The length is the value of the property at `index`
    pub fn with_length_from(mut self, index: u16) -> Self {
        self.flags |= PropertyFlags::PROPERTY_PARAM_LENGTH;
        self.length = index;
        self
    }

    pub fn with_count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    pub fn with_fixed_count(mut self, count: u16) -> Self {
        self.flags |= PropertyFlags::PROPERTY_PARAM_FIXED_COUNT;
        self.count = count;
        self
    }

    /// The element count is the value of the property at `index`
    pub fn with_count_from(mut self, index: u16) -> Self {
        self.flags |= PropertyFlags::PROPERTY_PARAM_COUNT;
        self.count = index;
        self
    }

    /// Has no effect on structs, which have no map
    pub fn with_map_name(mut self, name: &str) -> Self {
        if let PropertyShape::Scalar { map_name, .. } = &mut self.shape {
            *map_name = Some(name.to_string());
        }
        self
    }

    pub fn with_tags(mut self, tags: u32) -> Self {
        self.flags |= PropertyFlags::PROPERTY_HAS_TAGS;
        self.tags = tags & 0x0fff_ffff;
        self
    }
}

/// Builds a `TRACE_EVENT_INFO` buffer
///
/// Properties are laid out in the order they are added. Unless told otherwise, every property is a
/// top-level one; schemas with structs list their top-level properties first and set
/// [`Self::top_level_property_count`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    raw: TraceEventInfoRaw,
    names: SchemaNames,
    properties: Vec<PropertyDefinition>,
    top_level_count: Option<u32>,
}

#[derive(Debug, Clone, Default)]
struct SchemaNames {
    provider: Option<String>,
    level: Option<String>,
    channel: Option<String>,
    keywords: Option<String>,
    task: Option<String>,
    opcode: Option<String>,
    event_message: Option<String>,
    provider_message: Option<String>,
    event_name: Option<String>,
}

impl SchemaBuilder {
    pub fn new(provider_guid: Guid, descriptor: EventDescriptor) -> Self {
        let mut builder = Self::default();
        builder.raw.provider_guid = provider_guid.to_bytes();
        builder.raw.event_descriptor = EventDescriptorRaw::from(&descriptor);
        builder.raw.decoding_source = U32::new(DecodingSource::DecodingSourceXMLFile as u32);
        builder
    }

    pub fn event_guid(mut self, guid: Guid) -> Self {
        self.raw.event_guid = guid.to_bytes();
        self
    }

    pub fn decoding_source(mut self, source: DecodingSource) -> Self {
        self.raw.decoding_source = U32::new(source as u32);
        self
    }

    pub fn template_flags(mut self, flags: TemplateFlags) -> Self {
        self.raw.flags = U32::new(flags.bits());
        self
    }

    pub fn provider_name(mut self, name: &str) -> Self {
        self.names.provider = Some(name.to_string());
        self
    }

    pub fn level_name(mut self, name: &str) -> Self {
        self.names.level = Some(name.to_string());
        self
    }

    pub fn channel_name(mut self, name: &str) -> Self {
        self.names.channel = Some(name.to_string());
        self
    }

    pub fn keywords_name(mut self, name: &str) -> Self {
        self.names.keywords = Some(name.to_string());
        self
    }

    pub fn task_name(mut self, name: &str) -> Self {
        self.names.task = Some(name.to_string());
        self
    }

    pub fn opcode_name(mut self, name: &str) -> Self {
        self.names.opcode = Some(name.to_string());
        self
    }

    pub fn event_message(mut self, message: &str) -> Self {
        self.names.event_message = Some(message.to_string());
        self
    }

    pub fn provider_message(mut self, message: &str) -> Self {
        self.names.provider_message = Some(message.to_string());
        self
    }

    /// Only meaningful for TraceLogging schemas
    pub fn event_name(mut self, name: &str) -> Self {
        self.names.event_name = Some(name.to_string());
        self
    }

    pub fn property(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    pub fn top_level_property_count(mut self, count: u32) -> Self {
        self.top_level_count = Some(count);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut raw = self.raw;
        let properties_len = self.properties.len() * EventPropertyInfoRaw::SIZE;
        let strings_start = std::mem::size_of::<TraceEventInfoRaw>() + properties_len;
        let mut strings = StringTable {
            start: strings_start,
            bytes: Vec::new(),
        };

        raw.provider_name_offset = strings.offset_of(&self.names.provider);
        raw.level_name_offset = strings.offset_of(&self.names.level);
        raw.channel_name_offset = strings.offset_of(&self.names.channel);
        raw.keywords_name_offset = strings.offset_of(&self.names.keywords);
        raw.task_name_offset = strings.offset_of(&self.names.task);
        raw.opcode_name_offset = strings.offset_of(&self.names.opcode);
        raw.event_message_offset = strings.offset_of(&self.names.event_message);
        raw.provider_message_offset = strings.offset_of(&self.names.provider_message);
        raw.event_name_offset = strings.offset_of(&self.names.event_name);

        let property_count = self.properties.len() as u32;
        raw.property_count = U32::new(property_count);
        raw.top_level_property_count = U32::new(self.top_level_count.unwrap_or(property_count));

        let mut infos = Vec::with_capacity(properties_len);
        for property in &self.properties {
            let mut info = EventPropertyInfoRaw {
                flags: U32::new(property.flags.bits()),
                name_offset: strings.offset_of(&Some(property.name.clone())),
                count: U16::new(property.count),
                length: U16::new(property.length),
                tags: U32::new(property.tags),
                ..Default::default()
            };
            match &property.shape {
                PropertyShape::Scalar {
                    in_type,
                    out_type,
                    map_name,
                } => {
                    info.type_union[..2].copy_from_slice(&in_type.to_le_bytes());
                    info.type_union[2..4].copy_from_slice(&out_type.to_le_bytes());
                    let map_offset = strings.offset_of(map_name);
                    info.type_union[4..].copy_from_slice(map_offset.as_bytes());
                }
                PropertyShape::Struct {
                    start_index,
                    member_count,
                } => {
                    info.type_union[..2].copy_from_slice(&start_index.to_le_bytes());
                    info.type_union[2..4].copy_from_slice(&member_count.to_le_bytes());
                }
            }
            infos.extend_from_slice(info.as_bytes());
        }

        let mut buffer = Vec::with_capacity(strings_start + strings.bytes.len());
        buffer.extend_from_slice(raw.as_bytes());
        buffer.extend_from_slice(&infos);
        buffer.extend_from_slice(&strings.bytes);
        buffer
    }
}

/// UTF-16 strings appended after the property array; offset 0 means "no string"
struct StringTable {
    start: usize,
    bytes: Vec<u8>,
}

impl StringTable {
    fn offset_of(&mut self, s: &Option<String>) -> U32<LittleEndian> {
        match s {
            None => U32::new(0),
            Some(s) => {
                let offset = self.start + self.bytes.len();
                self.bytes.extend_from_slice(&s.as_str().into_utf16_bytes());
                U32::new(offset as u32)
            }
        }
    }
}
