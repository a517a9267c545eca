//! ETW Types Parser
//!
//! This module act as a helper to parse the user data of an ETW Event, given the [`Schema`] that
//! describes it.
//!
//! Properties may have variable lengths, and their lengths or element counts may be stored in other
//! properties. Decoding therefore always walks the properties in index order, from the start of
//! the user data, keeping track of the integer values decoded so far.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::blob::{BlobReader, BoundedString};
use crate::native::etw_types::EventRecord;
use crate::native::guid::Guid;
use crate::native::sddl::Sid;
use crate::native::tdh_types::{TdhInType, TdhOutType};
use crate::native::time::{FileTime, SystemTime};
use crate::property::{DecodedValues, PropertyDescriptor, PropertyError};
use crate::schema::{Schema, SchemaError};

/// Structs nested deeper than this are rejected
const MAX_STRUCT_DEPTH: usize = 32;

/// Elements (array items and struct instances) that consume no user data, allowed per property
const ZERO_SIZE_ELEMENTS_PER_PROPERTY: usize = 16;

/// Parser module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    /// No property has this name
    NotFound,
    /// The property was not decoded, because the user data ends before it (or before a property it comes after)
    Absent,
    /// An invalid type
    InvalidType,
    /// Length mismatch when parsing a type
    LengthMismatch,
    /// An input type this crate cannot decode
    UnsupportedType { index: u16, in_type: u16 },
    /// The property is a struct member, and can only be decoded as part of its struct
    NotTopLevel { index: u32 },
    /// Structs nested too deep (or recursively)
    StructTooDeep { index: u16 },
    /// An error while transforming an Utf-8 buffer into String
    Utf8Error(std::str::Utf8Error),
    /// Represents an internal [PropertyError]
    PropertyError(PropertyError),
    /// Represents an internal [SchemaError]
    SchemaError(SchemaError),
}

impl From<PropertyError> for ParserError {
    fn from(err: PropertyError) -> Self {
        ParserError::PropertyError(err)
    }
}

impl From<SchemaError> for ParserError {
    fn from(err: SchemaError) -> Self {
        ParserError::SchemaError(err)
    }
}

impl From<std::str::Utf8Error> for ParserError {
    fn from(err: std::str::Utf8Error) -> Self {
        ParserError::Utf8Error(err)
    }
}

impl std::fmt::Display for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Absent => write!(f, "absent from the user data"),
            Self::InvalidType => write!(f, "invalid type"),
            Self::LengthMismatch => write!(f, "length mismatch"),
            Self::UnsupportedType { index, in_type } => {
                write!(f, "unsupported in type {} for property {}", in_type, index)
            }
            Self::NotTopLevel { index } => write!(f, "property {} is a struct member", index),
            Self::StructTooDeep { index } => {
                write!(f, "struct property {} is nested too deep", index)
            }
            Self::Utf8Error(e) => write!(f, "utf-8 error {}", e),
            Self::PropertyError(e) => write!(f, "property error {}", e),
            Self::SchemaError(e) => write!(f, "schema error {}", e),
        }
    }
}

impl std::error::Error for ParserError {}

type ParserResult<T> = Result<T, ParserError>;

/// A decoded property value
///
/// Strings and binary values borrow from the record (or, for names, the schema) buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    /// The user data ends before this property
    Absent,
    /// `InTypeNull`, a property without a value
    Null,
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Guid(Guid),
    /// An address in the traced process, widened to 64 bits
    Pointer(u64),
    String(BoundedString<'a>),
    /// An 8-bit string, in an unspecified code page. The terminator is not included.
    AnsiString(&'a [u8]),
    Binary(&'a [u8]),
    FileTime(FileTime),
    SystemTime(SystemTime),
    Sid(Sid<'a>),
    Array(Vec<FieldValue<'a>>),
    /// The members of one struct instance
    Struct(Vec<Field<'a>>),
}

impl<'a> FieldValue<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// The value as an unsigned integer, if it is a non-negative integer
    ///
    /// This is how a property gets used as the length or count of another one.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::UInt8(v) => Some(u64::from(v)),
            FieldValue::UInt16(v) => Some(u64::from(v)),
            FieldValue::UInt32(v) => Some(u64::from(v)),
            FieldValue::UInt64(v) => Some(v),
            FieldValue::Int8(v) => u64::try_from(v).ok(),
            FieldValue::Int16(v) => u64::try_from(v).ok(),
            FieldValue::Int32(v) => u64::try_from(v).ok(),
            FieldValue::Int64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }
}

/// A named property value
#[derive(Debug, Clone, PartialEq)]
pub struct Field<'a> {
    /// Index of the property in the schema
    pub index: u16,
    pub name: BoundedString<'a>,
    /// The bytes of the user data this property was decoded from
    pub raw: &'a [u8],
    /// Decoding errors only affect the property they occur on: the ones after it are [`FieldValue::Absent`]
    pub value: ParserResult<FieldValue<'a>>,
}

/// Represents a Parser
///
/// This structure provides a way to parse an ETW event (= extract its properties).
/// It does not cache anything: every call decodes the user data from its start.
///
/// # Example
/// ```
/// # use ferrisetw_decode::builder::{EventRecordBuilder, PropertyDefinition, SchemaBuilder};
/// # use ferrisetw_decode::native::etw_types::EventDescriptor;
/// # use ferrisetw_decode::native::tdh_types::{TdhInType, TdhOutType};
/// # use ferrisetw_decode::parser::{FieldValue, Parser};
/// # use ferrisetw_decode::{EventRecord, Guid, Schema};
/// # let schema_buffer = SchemaBuilder::new(Guid::NULL, EventDescriptor::default())
/// #     .property(PropertyDefinition::scalar("PropertyName", TdhInType::InTypeUnicodeString, TdhOutType::OutTypeString))
/// #     .property(PropertyDefinition::scalar("OtherPropertyName", TdhInType::InTypeUInt32, TdhOutType::OutTypeNull))
/// #     .build();
/// # let mut user_data: Vec<u8> = "value".encode_utf16().chain(Some(0)).flat_map(u16::to_le_bytes).collect();
/// # user_data.extend_from_slice(&42u32.to_le_bytes());
/// # let record_buffer = EventRecordBuilder::new().user_data(&user_data).build();
/// let record = EventRecord::from_bytes(&record_buffer).unwrap();
/// let schema = Schema::from_bytes(&schema_buffer).unwrap();
/// let parser = Parser::create(&record, &schema);
///
/// // There are several ways to define the type requested for `try_parse`
/// // It is possible to use type inference...
/// let property1: Option<String> = parser.try_parse("PropertyName").ok();
///
/// // ...or to use the turbofish operator
/// match parser.try_parse::<u32>("OtherPropertyName") {
///     Ok(_) => println!("OtherPropertyName is a valid u32"),
///     Err(_) => println!("OtherPropertyName is invalid"),
/// }
///
/// // Properties can also be decoded by index, into dynamically typed values
/// assert_eq!(parser.project(1).unwrap(), FieldValue::UInt32(42));
/// ```
pub struct Parser<'a> {
    schema: Schema<'a>,
    record: EventRecord<'a>,
    pointer_size: usize,
}

impl<'a> Parser<'a> {
    /// Use the `create` function to create an instance of a Parser
    ///
    /// Pointer-sized properties of records that do not tell their bitness are assumed to come from
    /// a process with the same pointer size as the current one.
    pub fn create(event_record: &EventRecord<'a>, schema: &Schema<'a>) -> Self {
        Self::with_native_pointer_size(event_record, schema, std::mem::size_of::<usize>())
    }

    /// Same as [`Self::create`], for records logged on a machine with a different pointer size
    pub fn with_native_pointer_size(
        event_record: &EventRecord<'a>,
        schema: &Schema<'a>,
        native_pointer_size: usize,
    ) -> Self {
        Parser {
            schema: *schema,
            record: *event_record,
            pointer_size: event_record.pointer_size(native_pointer_size),
        }
    }

    /// Size of pointer-typed properties for this record
    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    /// Decode the top-level property at `index`
    ///
    /// Struct properties are decoded along with their members, into a [`FieldValue::Struct`] (or an
    /// array of those). Properties that lie past the end of the user data are [`FieldValue::Absent`].
    pub fn project(&self, index: u32) -> ParserResult<FieldValue<'a>> {
        let property_count = self.schema.property_count();
        if index >= property_count {
            return Err(SchemaError::IndexOutOfRange {
                index,
                property_count,
            }
            .into());
        }
        if index >= self.schema.top_level_property_count() {
            return Err(ParserError::NotTopLevel { index });
        }

        match self.decode_top_level(Some(index)).pop() {
            Some(field) => field.value,
            None => Ok(FieldValue::Absent),
        }
    }

    /// Decode every top-level property, in order
    pub fn project_all(&self) -> Vec<Field<'a>> {
        self.decode_top_level(None)
    }

    fn decode_top_level(&self, last: Option<u32>) -> Vec<Field<'a>> {
        let count = match last {
            Some(last) => last.saturating_add(1),
            None => self.schema.top_level_property_count(),
        };

        let data = self.record.user_buffer();
        let mut cursor = 0usize;
        let mut decoded = DecodedValues::new();
        // elements that consume data are bounded by its length, the others are counted here
        let mut budget =
            (self.schema.property_count() as usize).saturating_mul(ZERO_SIZE_ELEMENTS_PER_PROPERTY);
        // set once the position of the next property can no longer be known
        let mut lost = false;
        let mut fields = Vec::new();

        for property in self.schema.top_level_properties().take(count as usize) {
            if lost {
                fields.push(Field {
                    index: property.index(),
                    name: property.name(),
                    raw: &[],
                    value: Ok(FieldValue::Absent),
                });
                continue;
            }

            let start = cursor;
            let decoded_value =
                self.decode_property(&property, data, &mut cursor, &mut decoded, &mut budget, 0);
            let value = match decoded_value {
                Ok(Some(value)) => Ok(value),
                Ok(None) => {
                    log::debug!(
                        "user data of event {} ends before property {}",
                        self.schema.event_id(),
                        property.index()
                    );
                    lost = true;
                    Ok(FieldValue::Absent)
                }
                Err(e) => {
                    lost = true;
                    Err(e)
                }
            };
            fields.push(Field {
                index: property.index(),
                name: property.name(),
                raw: if lost { &[][..] } else { &data[start..cursor] },
                value,
            });
        }

        fields
    }

    /// Decodes one property at `cursor`, and moves `cursor` past it
    ///
    /// Returns `Ok(None)` if the user data ends before the end of the property.
    fn decode_property(
        &self,
        property: &PropertyDescriptor<'a>,
        data: &'a [u8],
        cursor: &mut usize,
        decoded: &mut DecodedValues<'_>,
        budget: &mut usize,
        depth: usize,
    ) -> ParserResult<Option<FieldValue<'a>>> {
        let count = if property.is_array() {
            property.resolved_count(decoded)?
        } else {
            1
        };
        let remaining = data.len().saturating_sub(*cursor);
        // every element takes at least a byte, except for zero-length ones which are rare enough
        if property.is_array() && count > remaining && count > 0 {
            return Ok(None);
        }

        if property.is_struct() {
            if depth >= MAX_STRUCT_DEPTH {
                return Err(ParserError::StructTooDeep {
                    index: property.index(),
                });
            }
            let members = self.schema.struct_members(property)?;

            let mut instances = Vec::with_capacity(count.min(remaining.max(1)));
            for _ in 0..count {
                let instance_start = *cursor;
                let mut scope = decoded.child();
                let mut fields = Vec::with_capacity(members.len());
                for member_index in members.clone() {
                    let member = self.schema.property(member_index)?;
                    let start = *cursor;
                    let value = match self.decode_property(
                        &member,
                        data,
                        cursor,
                        &mut scope,
                        budget,
                        depth + 1,
                    )? {
                        Some(value) => value,
                        None => return Ok(None),
                    };
                    fields.push(Field {
                        index: member.index(),
                        name: member.name(),
                        raw: &data[start..*cursor],
                        value: Ok(value),
                    });
                }
                if *cursor == instance_start && !take_one(budget) {
                    return Ok(None);
                }
                instances.push(FieldValue::Struct(fields));
            }
            return Ok(Some(Self::wrap(property, instances)));
        }

        let scalar = property.scalar_type()?;
        let in_type = scalar.in_type().ok_or(ParserError::UnsupportedType {
            index: property.index(),
            in_type: scalar.in_type,
        })?;
        let length = property.resolved_length(decoded)?;
        let reader = ElementReader {
            in_type,
            out_type: scalar.out_type(),
            length,
            pointer_size: self.pointer_size,
        };

        let mut values = Vec::with_capacity(count.min(remaining.max(1)));
        for _ in 0..count {
            let rest = data.get(*cursor..).unwrap_or_default();
            let (value, consumed) = match reader.read(rest) {
                Some(read) => read,
                None => return Ok(None),
            };
            if consumed == 0 && !take_one(budget) {
                return Ok(None);
            }
            *cursor += consumed;
            values.push(value);
        }

        if !property.is_array() {
            if let Some(v) = values.first().and_then(FieldValue::as_u64) {
                decoded.insert(property.index(), v);
            }
        }
        Ok(Some(Self::wrap(property, values)))
    }

    fn wrap(property: &PropertyDescriptor<'a>, mut values: Vec<FieldValue<'a>>) -> FieldValue<'a> {
        if property.is_array() {
            FieldValue::Array(values)
        } else {
            values.pop().unwrap_or(FieldValue::Absent)
        }
    }

    fn find_field(&self, name: &str) -> ParserResult<(PropertyDescriptor<'a>, Field<'a>)> {
        let property = self.schema.find_property(name).ok_or(ParserError::NotFound)?;
        let field = self
            .decode_top_level(Some(u32::from(property.index())))
            .pop()
            .ok_or(ParserError::NotFound)?;
        match field.value {
            Ok(FieldValue::Absent) => Err(ParserError::Absent),
            Ok(_) => Ok((property, field)),
            Err(e) => Err(e),
        }
    }

    /// Return a property from the event, or an error in case the parsing failed.
    ///
    /// You must explicitly define `T`, the type you want to parse the property into.<br/>
    /// In case this type is not compatible with the ETW type, [`ParserError::InvalidType`] is returned.
    pub fn try_parse<T>(&self, name: &str) -> ParserResult<T>
    where
        Parser<'a>: private::TryParse<T>,
    {
        use crate::parser::private::TryParse;
        self.try_parse_impl(name)
    }
}

fn take_one(budget: &mut usize) -> bool {
    match budget.checked_sub(1) {
        Some(left) => {
            *budget = left;
            true
        }
        None => false,
    }
}

/// Decodes single elements of a simple-typed property
struct ElementReader {
    in_type: TdhInType,
    out_type: TdhOutType,
    /// The resolved length, in characters for strings and bytes otherwise
    length: usize,
    pointer_size: usize,
}

impl ElementReader {
    /// Decode one element from the start of `data`, returning it along with its size
    fn read<'a>(&self, data: &'a [u8]) -> Option<(FieldValue<'a>, usize)> {
        let reader = BlobReader::new(data);
        let fixed = |size: usize| reader.bytes(0, size);

        if let Some(size) = self.in_type.fixed_size(self.pointer_size) {
            let element = BlobReader::new(fixed(size)?);
            return self.read_fixed(&element).map(|value| (value, size));
        }

        let read = match self.in_type {
            TdhInType::InTypeNull => (FieldValue::Null, self.length).check(data.len())?,
            TdhInType::InTypeUnicodeString => {
                if self.length > 0 {
                    let size = self.length.checked_mul(2)?;
                    (FieldValue::String(BoundedString::from_padded_units(fixed(size)?)), size)
                } else {
                    match BoundedString::from_terminated(data) {
                        Some((s, consumed)) => (FieldValue::String(s), consumed),
                        None => (FieldValue::String(BoundedString::from_units(data)), data.len()),
                    }
                }
            }
            TdhInType::InTypeAnsiString => {
                if self.length > 0 {
                    let bytes = fixed(self.length)?;
                    (FieldValue::AnsiString(trim_ansi(bytes)), self.length)
                } else {
                    let bytes = trim_ansi(data);
                    // the terminator, unless the string runs to the end of the user data
                    let consumed = (bytes.len() + 1).min(data.len());
                    (FieldValue::AnsiString(bytes), consumed)
                }
            }
            TdhInType::InTypeBinary => {
                let size = if self.length == 0 && self.out_type == TdhOutType::OutTypeIpv6 {
                    16
                } else {
                    self.length
                };
                (FieldValue::Binary(fixed(size).unwrap_or_default()), size)
                    .check(data.len())?
            }
            TdhInType::InTypeSid => {
                let sid = Sid::from_bytes(data)?;
                (FieldValue::Sid(sid), sid.len())
            }
            TdhInType::InTypeWbemSid => {
                // a TOKEN_USER (two pointers) precedes the SID
                let header = self.pointer_size.checked_mul(2)?;
                let sid = Sid::from_bytes(data.get(header..)?)?;
                (FieldValue::Sid(sid), header + sid.len())
            }
            TdhInType::InTypeCountedString | TdhInType::InTypeReversedCountedString => {
                let size = self.counted_size(&reader)?;
                let units = reader.bytes(2, size).or_else(|| (size == 0).then_some(&[][..]))?;
                (FieldValue::String(BoundedString::from_units(units)), 2 + size)
            }
            TdhInType::InTypeCountedAnsiString | TdhInType::InTypeReversedCountedAnsiString => {
                let size = self.counted_size(&reader)?;
                let bytes = reader.bytes(2, size).or_else(|| (size == 0).then_some(&[][..]))?;
                (FieldValue::AnsiString(bytes), 2 + size)
            }
            TdhInType::InTypeNonNullTerminatedString => {
                let size = if self.length > 0 {
                    self.length.checked_mul(2)?
                } else {
                    data.len()
                };
                let units = fixed(size).unwrap_or_default();
                (FieldValue::String(BoundedString::from_units(units)), size).check(data.len())?
            }
            TdhInType::InTypeNonNullTerminatedAnsiString => {
                let size = if self.length > 0 { self.length } else { data.len() };
                (FieldValue::AnsiString(fixed(size).unwrap_or_default()), size)
                    .check(data.len())?
            }
            TdhInType::InTypeHexDump => {
                let size = usize::try_from(reader.read_u32(0)?).ok()?;
                let bytes = reader.bytes(4, size).or_else(|| (size == 0).then_some(&[][..]))?;
                (FieldValue::Binary(bytes), 4 + size)
            }
            // fixed-size types, decoded above
            _ => return None,
        };
        Some(read)
    }

    /// Decode an element of a fixed-size type, `element` holding exactly its bytes
    fn read_fixed<'a>(&self, element: &BlobReader<'a>) -> Option<FieldValue<'a>> {
        let value = match self.in_type {
            TdhInType::InTypeInt8 => FieldValue::Int8(element.read_i8(0)?),
            TdhInType::InTypeUInt8 => {
                let v = element.read_u8(0)?;
                if self.out_type == TdhOutType::OutTypeBoolean {
                    FieldValue::Boolean(v != 0)
                } else {
                    FieldValue::UInt8(v)
                }
            }
            TdhInType::InTypeInt16 => FieldValue::Int16(element.read_i16(0)?),
            TdhInType::InTypeUInt16 => FieldValue::UInt16(element.read_u16(0)?),
            TdhInType::InTypeInt32 => FieldValue::Int32(element.read_i32(0)?),
            TdhInType::InTypeUInt32 | TdhInType::InTypeHexInt32 => {
                FieldValue::UInt32(element.read_u32(0)?)
            }
            TdhInType::InTypeInt64 => FieldValue::Int64(element.read_i64(0)?),
            TdhInType::InTypeUInt64 | TdhInType::InTypeHexInt64 => {
                FieldValue::UInt64(element.read_u64(0)?)
            }
            TdhInType::InTypeFloat => FieldValue::Float(element.read_f32(0)?),
            TdhInType::InTypeDouble => FieldValue::Double(element.read_f64(0)?),
            TdhInType::InTypeBoolean => FieldValue::Boolean(element.read_u32(0)? != 0),
            TdhInType::InTypeGuid => FieldValue::Guid(element.read_guid(0)?),
            TdhInType::InTypePointer => FieldValue::Pointer(self.read_pointer_sized(element)?),
            TdhInType::InTypeSizeT => FieldValue::UInt64(self.read_pointer_sized(element)?),
            TdhInType::InTypeFileTime => {
                let bytes: &[u8; FileTime::SIZE] = element.bytes(0, FileTime::SIZE)?.try_into().ok()?;
                FieldValue::FileTime(FileTime::from_bytes(bytes))
            }
            TdhInType::InTypeSystemTime => {
                let bytes: &[u8; SystemTime::SIZE] =
                    element.bytes(0, SystemTime::SIZE)?.try_into().ok()?;
                FieldValue::SystemTime(SystemTime::from_bytes(bytes))
            }
            TdhInType::InTypeUnicodeChar => {
                FieldValue::String(BoundedString::from_units(element.bytes(0, 2)?))
            }
            TdhInType::InTypeAnsiChar => FieldValue::AnsiString(element.bytes(0, 1)?),
            _ => return None,
        };
        Some(value)
    }

    fn read_pointer_sized(&self, reader: &BlobReader<'_>) -> Option<u64> {
        match self.pointer_size {
            4 => reader.read_u32(0).map(u64::from),
            _ => reader.read_u64(0),
        }
    }

    /// Byte count prefixing a counted string
    fn counted_size(&self, reader: &BlobReader<'_>) -> Option<usize> {
        let prefix = reader.bytes(0, 2)?;
        let size = match self.in_type {
            TdhInType::InTypeReversedCountedString | TdhInType::InTypeReversedCountedAnsiString => {
                u16::from_be_bytes([prefix[0], prefix[1]])
            }
            _ => u16::from_le_bytes([prefix[0], prefix[1]]),
        };
        Some(usize::from(size))
    }
}

/// Checks a value of a known size fits in the data left
trait CheckSize: Sized {
    fn check(self, available: usize) -> Option<Self>;
}

impl<'a> CheckSize for (FieldValue<'a>, usize) {
    fn check(self, available: usize) -> Option<Self> {
        if self.1 <= available {
            Some(self)
        } else {
            None
        }
    }
}

/// 8-bit strings end at their first null
fn trim_ansi(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|b| *b == 0) {
        Some(len) => &bytes[..len],
        None => bytes,
    }
}

mod private {
    use super::*;

    /// Trait to try and parse a type
    ///
    /// This trait has to be implemented in order to be able to parse a type we want to retrieve from
    /// within an Event.
    ///
    /// An implementation for most of the Primitive Types is created by using a Macro, any other needed type
    /// requires this trait to be implemented
    pub trait TryParse<T> {
        /// Implement the `try_parse` function to provide a way to Parse `T` from an ETW event or
        /// return an Error in case the type `T` can't be parsed
        ///
        /// # Arguments
        /// * `name` - Name of the property to be found in the Schema
        fn try_parse_impl(&self, name: &str) -> Result<T, ParserError>;
    }
}

macro_rules! impl_try_parse_primitive {
    ($T:ident, $($variant:ident),+) => {
        impl private::TryParse<$T> for Parser<'_> {
            fn try_parse_impl(&self, name: &str) -> ParserResult<$T> {
                let (_, field) = self.find_field(name)?;
                match field.value? {
                    $(FieldValue::$variant(v) => Ok(v),)+
                    _ => Err(ParserError::InvalidType),
                }
            }
        }
    };
}

macro_rules! impl_try_parse_primitive_array {
    ($T:ident, $variant:ident) => {
        impl private::TryParse<Vec<$T>> for Parser<'_> {
            fn try_parse_impl(&self, name: &str) -> ParserResult<Vec<$T>> {
                let (_, field) = self.find_field(name)?;
                match field.value? {
                    FieldValue::Array(values) => values
                        .into_iter()
                        .map(|v| match v {
                            FieldValue::$variant(v) => Ok(v),
                            _ => Err(ParserError::InvalidType),
                        })
                        .collect(),
                    _ => Err(ParserError::InvalidType),
                }
            }
        }
    };
}

impl_try_parse_primitive!(u8, UInt8);
impl_try_parse_primitive!(i8, Int8);
impl_try_parse_primitive!(u16, UInt16);
impl_try_parse_primitive!(i16, Int16);
impl_try_parse_primitive!(u32, UInt32);
impl_try_parse_primitive!(i32, Int32);
impl_try_parse_primitive!(u64, UInt64, Pointer);
impl_try_parse_primitive!(i64, Int64);
impl_try_parse_primitive!(f32, Float);
impl_try_parse_primitive!(f64, Double);
impl_try_parse_primitive!(bool, Boolean);
impl_try_parse_primitive!(Guid, Guid);
impl_try_parse_primitive!(FileTime, FileTime);
impl_try_parse_primitive!(SystemTime, SystemTime);

impl_try_parse_primitive_array!(u16, UInt16);
impl_try_parse_primitive_array!(i16, Int16);
impl_try_parse_primitive_array!(u32, UInt32);
impl_try_parse_primitive_array!(i32, Int32);
impl_try_parse_primitive_array!(u64, UInt64);
impl_try_parse_primitive_array!(i64, Int64);

/// The `String` impl of the `TryParse` trait should be used to retrieve the following [TdhInTypes]:
///
/// * InTypeUnicodeString, and the other UTF-16 string types
/// * InTypeAnsiString, and the other 8-bit string types, which must be valid UTF-8
/// * InTypeSid and InTypeWbemSid, as `S-1-...` strings
/// * InTypeGuid
///
/// [TdhInTypes]: TdhInType
impl private::TryParse<String> for Parser<'_> {
    fn try_parse_impl(&self, name: &str) -> ParserResult<String> {
        let (_, field) = self.find_field(name)?;
        match field.value? {
            FieldValue::String(s) => Ok(s.to_string_lossy()),
            FieldValue::AnsiString(bytes) => Ok(std::str::from_utf8(bytes)?.to_string()),
            FieldValue::Sid(sid) => Ok(sid.to_string()),
            FieldValue::Guid(guid) => Ok(guid.to_string()),
            _ => Err(ParserError::InvalidType),
        }
    }
}

impl private::TryParse<IpAddr> for Parser<'_> {
    fn try_parse_impl(&self, name: &str) -> ParserResult<IpAddr> {
        let (property, field) = self.find_field(name)?;
        let out_type = property.scalar_type()?.out_type();
        if out_type != TdhOutType::OutTypeIpv4 && out_type != TdhOutType::OutTypeIpv6 {
            return Err(ParserError::InvalidType);
        }

        let res = match field.value? {
            // IPv4 addresses are stored in network order
            FieldValue::UInt32(_) => {
                let tmp: [u8; 4] = field.raw.try_into().map_err(|_| ParserError::LengthMismatch)?;
                IpAddr::V4(Ipv4Addr::from(tmp))
            }
            FieldValue::Binary(bytes) => match bytes.len() {
                16 => {
                    let tmp: [u8; 16] = bytes.try_into().map_err(|_| ParserError::LengthMismatch)?;
                    IpAddr::V6(Ipv6Addr::from(tmp))
                }
                4 => {
                    let tmp: [u8; 4] = bytes.try_into().map_err(|_| ParserError::LengthMismatch)?;
                    IpAddr::V4(Ipv4Addr::from(tmp))
                }
                _ => return Err(ParserError::LengthMismatch),
            },
            _ => return Err(ParserError::InvalidType),
        };

        Ok(res)
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Pointer(u64);

impl std::ops::Deref for Pointer {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Pointer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl std::fmt::LowerHex for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val = self.0;

        std::fmt::LowerHex::fmt(&val, f) // delegate to u64 implementation
    }
}

impl std::fmt::UpperHex for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val = self.0;

        std::fmt::UpperHex::fmt(&val, f) // delegate to u64 implementation
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let val = self.0;

        std::fmt::Display::fmt(&val, f) // delegate to u64 implementation
    }
}

impl private::TryParse<Pointer> for Parser<'_> {
    fn try_parse_impl(&self, name: &str) -> ParserResult<Pointer> {
        let (_, field) = self.find_field(name)?;
        match field.value? {
            FieldValue::Pointer(p) => Ok(Pointer(p)),
            _ => Err(ParserError::InvalidType),
        }
    }
}

/// The raw bytes of any (non-absent) property
impl private::TryParse<Vec<u8>> for Parser<'_> {
    fn try_parse_impl(&self, name: &str) -> Result<Vec<u8>, ParserError> {
        let (_, field) = self.find_field(name)?;
        Ok(field.raw.to_vec())
    }
}
