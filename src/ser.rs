//! Integrates with [serde](https://serde.rs/) enabling ['EventRecord`](crate::EventRecord) to be serialized to various formats.
//!
//! Requires the `serde` feature be enabled.
//!
//! If the `time_rs` feature is enabled, then time stamps are serialized per the serialization format
//! of the time crate. Otherwise, if `time_rs` is not enabled, then timestamps are serialized as 64bit
//! unix timestamps.
//!
//! ```
//! use ferrisetw_decode::schema_locator::SchemaLocator;
//! use ferrisetw_decode::{EventRecord, EventSerializer, Schema};
//! extern crate serde_json;
//!
//! fn event_callback(record_buffer: &[u8], schema_locator: &SchemaLocator) {
//!     let record = match EventRecord::from_bytes(record_buffer) {
//!         Err(err) => return println!("Error {:?}", err),
//!         Ok(record) => record,
//!     };
//!     match schema_locator.event_schema(&record) {
//!         None => println!("No schema for event {}", record.event_id()),
//!         Some(schema_buffer) => {
//!             let schema = match Schema::from_bytes(&schema_buffer) {
//!                 Err(err) => return println!("Error {:?}", err),
//!                 Ok(schema) => schema,
//!             };
//!             // Generate a serializer for the record using the schema
//!             let ser = EventSerializer::new(&record, &schema, Default::default());
//!             // Pass the serializer to any serde compatible serializer
//!             match serde_json::to_value(ser) {
//!                 Err(err) => println!("Error {:?}", err),
//!                 Ok(json) => println!("{}", json),
//!             }
//!         }
//!     }
//! }
//! ```
#![cfg(feature = "serde")]

use crate::native::etw_types::event_record::{CpuTime, EventRecord};
use crate::native::etw_types::extended_data::{EventHeaderExtendedDataItem, ExtendedDataItem};
use crate::native::etw_types::EventDescriptor;
use crate::native::time::FileTime;
use crate::parser::{Field, FieldValue, Parser};
use crate::schema::Schema;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, SerializeStruct};

/// Serialization options for EventSerializer
#[derive(Clone, Copy, Debug)]
pub struct EventSerializerOptions {
    /// Includes information from the schema in the serialized output such as the provider, opcode, and task names.
    pub include_schema: bool,
    /// Includes the [EVENT_HEADER](https://learn.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_header) in the serialized output.
    pub include_header: bool,
    /// Includes the set of [EVENT_HEADER_EXTENDED_DATA_ITEM](https://learn.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_header_extended_data_item) in the serialized output.
    pub include_extended_data: bool,
    /// When `true` properties that fail to decode (unsupported types, broken references) make the serialization fail,
    /// otherwise they are skipped and will not be present in the serialized output.
    pub fail_unimplemented: bool,
}

impl core::default::Default for EventSerializerOptions {
    fn default() -> Self {
        Self {
            include_schema: true,
            include_header: true,
            include_extended_data: false,
            fail_unimplemented: false,
        }
    }
}

/// Used to serialize ['EventRecord`](crate::EventRecord) using [serde](https://serde.rs/)
pub struct EventSerializer<'a> {
    pub(crate) record: EventRecord<'a>,
    pub(crate) schema: Schema<'a>,
    pub(crate) parser: Parser<'a>,
    pub(crate) options: EventSerializerOptions,
}

impl<'a> EventSerializer<'a> {
    /// Creates an event serializer object.
    pub fn new(
        record: &EventRecord<'a>,
        schema: &Schema<'a>,
        options: EventSerializerOptions,
    ) -> Self {
        Self {
            record: *record,
            schema: *schema,
            parser: Parser::create(record, schema),
            options,
        }
    }
}

impl serde::ser::Serialize for EventSerializer<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let mut state = serializer.serialize_struct("Record", 4)?;

        if self.options.include_schema {
            state.serialize_field("Schema", &SchemaSer::new(&self.schema))?;
        } else {
            state.skip_field("Schema")?;
        }

        if self.options.include_header {
            state.serialize_field("Header", &HeaderSer::new(&self.record))?;
        } else {
            state.skip_field("Header")?;
        }

        if self.options.include_extended_data {
            state.serialize_field("Extended", &ExtendedSer::new(&self.record))?;
        } else {
            state.skip_field("Extended")?;
        }

        let event = EventSer::new(&self.parser, &self.options);
        state.serialize_field("Event", &event)?;

        state.end()
    }
}

struct SchemaSer<'a, 'b> {
    schema: &'a Schema<'b>,
}

impl<'a, 'b> SchemaSer<'a, 'b> {
    fn new(schema: &'a Schema<'b>) -> Self {
        Self { schema }
    }
}

impl serde::ser::Serialize for SchemaSer<'_, '_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Schema", 4)?;
        state.serialize_field("Provider", self.schema.provider_name().to_string_lossy().trim())?;
        state.serialize_field("Event", self.schema.event_name().to_string_lossy().trim())?;
        state.serialize_field("Opcode", self.schema.opcode_name().to_string_lossy().trim())?;
        state.serialize_field("Task", self.schema.task_name().to_string_lossy().trim())?;
        state.end()
    }
}

struct HeaderSer<'a, 'b> {
    record: &'a EventRecord<'b>,
}

impl<'a, 'b> HeaderSer<'a, 'b> {
    fn new(record: &'a EventRecord<'b>) -> Self {
        Self { record }
    }
}

impl serde::ser::Serialize for HeaderSer<'_, '_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let mut state = serializer.serialize_struct("Header", 12)?;
        state.serialize_field("Size", &self.record.size())?;
        state.serialize_field("HeaderType", &self.record.header_type())?;
        state.serialize_field("Flags", &self.record.event_flags())?;
        state.serialize_field("EventProperty", &self.record.event_property())?;
        state.serialize_field("ThreadId", &self.record.thread_id())?;
        state.serialize_field("ProcessId", &self.record.process_id())?;
        state.serialize_field("TimeStamp", &FileTime::from_quad(self.record.timestamp()))?;
        state.serialize_field("ProviderId", &self.record.provider_id())?;
        state.serialize_field("ActivityId", &self.record.activity_id())?;
        state.serialize_field("Descriptor", &DescriptorSer(self.record.event_descriptor()))?;
        state.serialize_field("CpuTime", &CpuTimeSer(self.record.cpu_time()))?;
        state.serialize_field("ProcessorIndex", &self.record.processor_index())?;
        state.end()
    }
}

struct DescriptorSer(EventDescriptor);

impl serde::ser::Serialize for DescriptorSer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let mut state = serializer.serialize_struct("Descriptor", 7)?;
        state.serialize_field("Id", &self.0.id)?;
        state.serialize_field("Version", &self.0.version)?;
        state.serialize_field("Channel", &self.0.channel)?;
        state.serialize_field("Level", &self.0.level)?;
        state.serialize_field("Opcode", &self.0.opcode)?;
        state.serialize_field("Task", &self.0.task)?;
        state.serialize_field("Keyword", &self.0.keyword)?;
        state.end()
    }
}

struct CpuTimeSer(CpuTime);

impl serde::ser::Serialize for CpuTimeSer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        match self.0 {
            CpuTime::Split {
                kernel_time,
                user_time,
            } => {
                let mut state = serializer.serialize_struct("CpuTime", 2)?;
                state.serialize_field("KernelTime", &kernel_time)?;
                state.serialize_field("UserTime", &user_time)?;
                state.end()
            }
            CpuTime::Processor(ticks) => {
                let mut state = serializer.serialize_struct("CpuTime", 1)?;
                state.serialize_field("ProcessorTime", &ticks)?;
                state.end()
            }
            CpuTime::NotAvailable => serializer.serialize_none(),
        }
    }
}

struct ExtendedSer<'a, 'b> {
    record: &'a EventRecord<'b>,
}

impl<'a, 'b> ExtendedSer<'a, 'b> {
    fn new(record: &'a EventRecord<'b>) -> Self {
        Self { record }
    }
}

impl serde::ser::Serialize for ExtendedSer<'_, '_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let items = self.record.extended_data();
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items.iter() {
            seq.serialize_element(&ExtendedItemSer(item))?;
        }
        seq.end()
    }
}

struct ExtendedItemSer<'a>(EventHeaderExtendedDataItem<'a>);

impl serde::ser::Serialize for ExtendedItemSer<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        let mut state = serializer.serialize_struct("ExtendedData", 2)?;
        state.serialize_field("Type", &self.0.data_type())?;
        match self.0.to_extended_data_item() {
            ExtendedDataItem::Unsupported => match self.0.data() {
                Some(data) => state.serialize_field("Data", &BytesSer(data))?,
                None => state.serialize_field("Data", &Option::<u8>::None)?,
            },
            ExtendedDataItem::RelatedActivityId(guid) => state.serialize_field("Data", &guid)?,
            ExtendedDataItem::Sid(sid) => state.serialize_field("Data", &sid)?,
            ExtendedDataItem::TsId(session) => state.serialize_field("Data", &session)?,
            ExtendedDataItem::InstanceInfo(info) => state.serialize_field(
                "Data",
                &(info.instance_id, info.parent_instance_id, info.parent_guid),
            )?,
            ExtendedDataItem::StackTrace32(trace) => {
                state.serialize_field("Data", &(trace.match_id, trace.addresses))?
            }
            ExtendedDataItem::StackTrace64(trace) => {
                state.serialize_field("Data", &(trace.match_id, trace.addresses))?
            }
            ExtendedDataItem::TraceLogging(name) => state.serialize_field("Data", &name)?,
            ExtendedDataItem::EventKey(key) => state.serialize_field("Data", &key)?,
            ExtendedDataItem::ProcessStartKey(key) => state.serialize_field("Data", &key)?,
        }
        state.end()
    }
}

struct BytesSer<'a>(&'a [u8]);

impl serde::ser::Serialize for BytesSer<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

struct EventSer<'a, 'b> {
    parser: &'a Parser<'b>,
    options: &'a EventSerializerOptions,
}

impl<'a, 'b> EventSer<'a, 'b> {
    fn new(parser: &'a Parser<'b>, options: &'a EventSerializerOptions) -> Self {
        Self { parser, options }
    }
}

impl serde::ser::Serialize for EventSer<'_, '_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let fields = self.parser.project_all();

        let mut len: usize = 0;
        for field in fields.iter() {
            match &field.value {
                Ok(_) => len += 1,
                Err(e) if self.options.fail_unimplemented => {
                    return Err(serde::ser::Error::custom(format!(
                        "property {} could not be decoded: {}",
                        field.name, e
                    )));
                }
                Err(_) => (),
            }
        }

        let mut state = serializer.serialize_map(Some(len))?;
        for field in fields.iter() {
            if let Ok(value) = &field.value {
                state.serialize_entry(&field.name, value)?;
            }
        }
        state.end()
    }
}

/// Absent and null values are serialized as `None`, 8-bit strings lossily as UTF-8
impl serde::ser::Serialize for FieldValue<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            FieldValue::Absent | FieldValue::Null => serializer.serialize_none(),
            FieldValue::Int8(v) => serializer.serialize_i8(*v),
            FieldValue::UInt8(v) => serializer.serialize_u8(*v),
            FieldValue::Int16(v) => serializer.serialize_i16(*v),
            FieldValue::UInt16(v) => serializer.serialize_u16(*v),
            FieldValue::Int32(v) => serializer.serialize_i32(*v),
            FieldValue::UInt32(v) => serializer.serialize_u32(*v),
            FieldValue::Int64(v) => serializer.serialize_i64(*v),
            FieldValue::UInt64(v) | FieldValue::Pointer(v) => serializer.serialize_u64(*v),
            FieldValue::Float(v) => serializer.serialize_f32(*v),
            FieldValue::Double(v) => serializer.serialize_f64(*v),
            FieldValue::Boolean(v) => serializer.serialize_bool(*v),
            FieldValue::Guid(v) => v.serialize(serializer),
            FieldValue::String(v) => v.serialize(serializer),
            FieldValue::AnsiString(v) => serializer.serialize_str(&String::from_utf8_lossy(v)),
            FieldValue::Binary(v) => serializer.serialize_bytes(v),
            FieldValue::FileTime(v) => v.serialize(serializer),
            FieldValue::SystemTime(v) => v.serialize(serializer),
            FieldValue::Sid(v) => v.serialize(serializer),
            FieldValue::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            FieldValue::Struct(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for field in fields {
                    map.serialize_entry(&field.name, &field.value.as_ref().ok())?;
                }
                map.end()
            }
        }
    }
}

/// Serialized as a single-entry map, from the name of the field to its value
impl serde::ser::Serialize for Field<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.value.as_ref().ok())?;
        map.end()
    }
}
