//! ETW Event Schema handler
//!
//! This module contains the means needed to interact with the Schema of an ETW event, i.e. the
//! [TraceEventInfo](https://docs.microsoft.com/en-us/windows/win32/api/tdh/ns-tdh-trace_event_info)
//! that describes the properties of events of a given kind.
use std::ops::Range;

use zerocopy::FromBytes;

use crate::blob::{BlobReader, BoundedString};
use crate::native::etw_types::{DecodingSource, EventDescriptor};
use crate::native::guid::Guid;
use crate::native::tdh_types::{EventPropertyInfoRaw, TemplateFlags, TraceEventInfoRaw};
use crate::property::{PropertyDescriptor, PropertyError};
use crate::provider_names::ProviderNameCache;
use crate::schema_locator::SchemaKey;

/// Schema module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The buffer cannot hold a `TRACE_EVENT_INFO` header
    BufferTooSmall { len: usize },
    /// The declared properties do not fit in the buffer
    TruncatedPropertyArray { property_count: u32, len: usize },
    /// More top-level properties than properties
    InvalidTopLevelCount {
        top_level_property_count: u32,
        property_count: u32,
    },
    /// No property has this index
    IndexOutOfRange { index: u32, property_count: u32 },
    /// A struct whose members lie outside of the property array, or include the struct itself
    InvalidStructRange { index: u16, start: u16, count: u16 },
    /// Represents an internal [PropertyError]
    PropertyError(PropertyError),
}

impl From<PropertyError> for SchemaError {
    fn from(err: PropertyError) -> Self {
        SchemaError::PropertyError(err)
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferTooSmall { len } => write!(
                f,
                "schema buffer too small ({} bytes, need {})",
                len,
                Schema::HEADER_SIZE
            ),
            Self::TruncatedPropertyArray {
                property_count,
                len,
            } => write!(
                f,
                "{} properties do not fit in a {} bytes schema",
                property_count, len
            ),
            Self::InvalidTopLevelCount {
                top_level_property_count,
                property_count,
            } => write!(
                f,
                "{} top-level properties out of {} properties",
                top_level_property_count, property_count
            ),
            Self::IndexOutOfRange {
                index,
                property_count,
            } => write!(
                f,
                "property index {} out of range ({} properties)",
                index, property_count
            ),
            Self::InvalidStructRange {
                index,
                start,
                count,
            } => write!(
                f,
                "struct property {} has invalid members {}..{}",
                index,
                start,
                u32::from(*start) + u32::from(*count)
            ),
            Self::PropertyError(e) => write!(f, "property error {}", e),
        }
    }
}

impl std::error::Error for SchemaError {}

type SchemaResult<T> = Result<T, SchemaError>;

/// A view over a `TRACE_EVENT_INFO` buffer
///
/// Name offsets are relative to the start of the buffer. Names that are missing (offset 0) or
/// that do not fit in the buffer are returned as empty strings.
///
/// # Example
/// ```
/// # use ferrisetw_decode::builder::SchemaBuilder;
/// # use ferrisetw_decode::native::etw_types::EventDescriptor;
/// # use ferrisetw_decode::{Guid, Schema};
/// let buffer = SchemaBuilder::new(Guid::NULL, EventDescriptor::default())
///     .provider_name("MyProvider")
///     .build();
/// let schema = Schema::from_bytes(&buffer).unwrap();
/// assert_eq!(schema.provider_name().to_string(), "MyProvider");
/// assert!(schema.task_name().is_empty());
/// ```
#[derive(Clone, Copy)]
pub struct Schema<'a> {
    buffer: BlobReader<'a>,
    raw: TraceEventInfoRaw,
    properties: &'a [u8],
}

impl<'a> Schema<'a> {
    /// Size of the fixed part of a `TRACE_EVENT_INFO`
    pub const HEADER_SIZE: usize = std::mem::size_of::<TraceEventInfoRaw>();

    pub fn from_bytes(buffer: &'a [u8]) -> SchemaResult<Self> {
        let raw = TraceEventInfoRaw::read_from_prefix(buffer)
            .ok_or(SchemaError::BufferTooSmall { len: buffer.len() })?;

        let property_count = raw.property_count.get();
        let top_level_property_count = raw.top_level_property_count.get();
        if top_level_property_count > property_count {
            return Err(SchemaError::InvalidTopLevelCount {
                top_level_property_count,
                property_count,
            });
        }

        let truncated = SchemaError::TruncatedPropertyArray {
            property_count,
            len: buffer.len(),
        };
        let properties_len = usize::try_from(property_count)
            .ok()
            .and_then(|count| count.checked_mul(EventPropertyInfoRaw::SIZE))
            .ok_or_else(|| truncated.clone())?;
        let properties = Self::HEADER_SIZE
            .checked_add(properties_len)
            .and_then(|end| buffer.get(Self::HEADER_SIZE..end))
            .ok_or(truncated)?;

        Ok(Schema {
            buffer: BlobReader::new(buffer),
            raw,
            properties,
        })
    }

    /// The whole underlying buffer
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer.as_bytes()
    }

    pub fn provider_guid(&self) -> Guid {
        Guid::from_bytes(&self.raw.provider_guid)
    }

    /// The GUID of the event class, for MOF-based events
    pub fn event_guid(&self) -> Guid {
        Guid::from_bytes(&self.raw.event_guid)
    }

    pub fn event_descriptor(&self) -> EventDescriptor {
        EventDescriptor::from(&self.raw.event_descriptor)
    }

    pub fn event_id(&self) -> u16 {
        self.raw.event_descriptor.id.get()
    }

    pub fn event_version(&self) -> u8 {
        self.raw.event_descriptor.version
    }

    pub fn opcode(&self) -> u8 {
        self.raw.event_descriptor.opcode
    }

    pub fn level(&self) -> u8 {
        self.raw.event_descriptor.level
    }

    /// Use the `decoding_source` function to obtain the [DecodingSource] from the `TRACE_EVENT_INFO`
    ///
    /// This getter returns the DecodingSource from the event, this value identifies the source used
    /// parse the event data
    pub fn decoding_source(&self) -> DecodingSource {
        DecodingSource::from(self.raw.decoding_source.get())
    }

    pub fn template_flags(&self) -> TemplateFlags {
        TemplateFlags::from_bits_truncate(self.raw.flags.get())
    }

    /// Name of the provider, as stored in the schema
    ///
    /// Falls back to the provider message when the schema has no provider name.
    /// See [`Self::resolve_provider_name`] to also consult names known to the caller.
    pub fn provider_name(&self) -> BoundedString<'a> {
        let name = self.string_at(self.raw.provider_name_offset.get());
        if name.is_empty() {
            self.provider_message()
        } else {
            name
        }
    }

    /// Same as [`Self::provider_name`], with a last resort lookup of the provider GUID in `names`
    pub fn resolve_provider_name(&self, names: &dyn ProviderNameCache) -> Option<String> {
        let name = self.provider_name();
        if name.is_empty() {
            names.lookup(&self.provider_guid())
        } else {
            Some(name.to_string_lossy())
        }
    }

    pub fn level_name(&self) -> BoundedString<'a> {
        self.string_at(self.raw.level_name_offset.get())
    }

    pub fn channel_name(&self) -> BoundedString<'a> {
        self.string_at(self.raw.channel_name_offset.get())
    }

    pub fn keywords_name(&self) -> BoundedString<'a> {
        self.string_at(self.raw.keywords_name_offset.get())
    }

    /// Use the `task_name` function to obtain the Task name
    ///
    /// See: [TaskType](https://docs.microsoft.com/en-us/windows/win32/wes/eventmanifestschema-tasktype-complextype)
    pub fn task_name(&self) -> BoundedString<'a> {
        self.string_at(self.raw.task_name_offset.get())
    }

    /// Use the `opcode_name` function to obtain the Opcode name
    ///
    /// See: [OpcodeType](https://docs.microsoft.com/en-us/windows/win32/wes/eventmanifestschema-opcodetype-complextype)
    pub fn opcode_name(&self) -> BoundedString<'a> {
        self.string_at(self.raw.opcode_name_offset.get())
    }

    /// The event message, with `%1`-style placeholders for properties
    pub fn event_message(&self) -> BoundedString<'a> {
        self.string_at(self.raw.event_message_offset.get())
    }

    pub fn provider_message(&self) -> BoundedString<'a> {
        self.string_at(self.raw.provider_message_offset.get())
    }

    /// The event name, which TraceLogging events (and recent manifests) carry
    pub fn event_name(&self) -> BoundedString<'a> {
        self.string_at(self.raw.event_name_offset.get())
    }

    pub fn property_count(&self) -> u32 {
        self.raw.property_count.get()
    }

    /// Number of properties that are not struct members
    ///
    /// Top-level properties come first in the property array.
    pub fn top_level_property_count(&self) -> u32 {
        self.raw.top_level_property_count.get()
    }

    pub fn property(&self, index: u32) -> SchemaResult<PropertyDescriptor<'a>> {
        let out_of_range = || SchemaError::IndexOutOfRange {
            index,
            property_count: self.property_count(),
        };
        // references between properties are 16-bit, so are descriptor indices
        let short_index = u16::try_from(index).map_err(|_| out_of_range())?;
        let start = usize::from(short_index) * EventPropertyInfoRaw::SIZE;
        let raw = self
            .properties
            .get(start..start + EventPropertyInfoRaw::SIZE)
            .and_then(EventPropertyInfoRaw::read_from)
            .ok_or_else(out_of_range)?;
        Ok(PropertyDescriptor::new(short_index, raw, self.buffer))
    }

    /// All properties, struct members included, in index order
    pub fn properties(&self) -> impl Iterator<Item = PropertyDescriptor<'a>> + 'a {
        let schema = *self;
        (0..self.property_count()).map_while(move |i| schema.property(i).ok())
    }

    pub fn top_level_properties(&self) -> impl Iterator<Item = PropertyDescriptor<'a>> + 'a {
        self.properties()
            .take(self.top_level_property_count() as usize)
    }

    /// The first top-level property with this name
    pub fn find_property(&self, name: &str) -> Option<PropertyDescriptor<'a>> {
        self.top_level_properties().find(|p| p.name().eq_str(name))
    }

    /// Indices of the members of a struct property
    ///
    /// Fails if `property` is not a struct, or if its members are not all inside the property
    /// array. A struct cannot be one of its own members.
    pub fn struct_members(&self, property: &PropertyDescriptor<'_>) -> SchemaResult<Range<u32>> {
        let range = property.struct_range()?;
        let indices = range.indices();
        let own_index = u32::from(property.index());
        if indices.end > self.property_count() || indices.contains(&own_index) {
            log::warn!(
                "struct property {} of event {} has members {:?} out of {} properties",
                property.index(),
                self.event_id(),
                indices,
                self.property_count()
            );
            return Err(SchemaError::InvalidStructRange {
                index: property.index(),
                start: range.start_index,
                count: range.member_count,
            });
        }
        Ok(indices)
    }

    /// The key of the events this schema applies to
    pub fn key(&self) -> SchemaKey {
        SchemaKey::from_schema(self)
    }

    fn string_at(&self, offset: u32) -> BoundedString<'a> {
        self.buffer
            .read_wstr(offset as usize)
            .unwrap_or_default()
    }
}

impl PartialEq for Schema<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.event_id() == other.event_id()
            && self.provider_guid() == other.provider_guid()
            && self.event_version() == other.event_version()
    }
}

impl Eq for Schema<'_> {}

impl std::fmt::Debug for Schema<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("provider_guid", &self.provider_guid())
            .field("event_id", &self.event_id())
            .field("event_version", &self.event_version())
            .field("property_count", &self.property_count())
            .finish()
    }
}
