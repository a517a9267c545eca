//! ETW Event Property information
//!
//! The `property` module exposes a view over one entry of a schema's property array
//! (`EVENT_PROPERTY_INFO`), based on its [`Schema`](crate::schema::Schema).
//!
//! Several fields of this entry are unions whose meaning depends on the property flags. Every
//! accessor here checks the flags before picking a side of a union, and refuses to read the
//! wrong one.
use std::collections::HashMap;
use std::ops::Range;

use crate::blob::{BlobReader, BoundedString};
use crate::native::tdh_types::{EventPropertyInfoRaw, PropertyFlags, TdhInType, TdhOutType};

/// Property module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The struct side of the type union was requested on a simple-typed property
    NotAStruct { index: u16 },
    /// The simple-type side of the type union was requested on a struct property
    IsAStruct { index: u16 },
    /// The length or count of `property` lives in `referenced`, whose value has not been decoded
    UnresolvedReference { property: u16, referenced: u16 },
}

impl std::fmt::Display for PropertyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAStruct { index } => write!(f, "property {} is not a struct", index),
            Self::IsAStruct { index } => write!(f, "property {} is a struct", index),
            Self::UnresolvedReference {
                property,
                referenced,
            } => write!(
                f,
                "property {} depends on property {}, which has not been decoded",
                property, referenced
            ),
        }
    }
}

impl std::error::Error for PropertyError {}

/// The length of a property: either given in the schema, or the value of another property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyLength {
    Length(u16),
    Index(u16),
}

/// The element count of a property: either given in the schema, or the value of another property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyCount {
    Count(u16),
    Index(u16),
}

/// The simple-type side of the type union
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarType {
    pub in_type: u16,
    pub out_type: u16,
    pub map_name_offset: u32,
}

impl ScalarType {
    /// `None` for input types this crate does not know how to decode
    pub fn in_type(&self) -> Option<TdhInType> {
        num_traits::FromPrimitive::from_u16(self.in_type)
    }

    /// Unknown output types are reported as [`TdhOutType::OutTypeNull`], i.e. "use the default for the input type"
    pub fn out_type(&self) -> TdhOutType {
        num_traits::FromPrimitive::from_u16(self.out_type).unwrap_or(TdhOutType::OutTypeNull)
    }
}

/// The struct side of the type union
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructRange {
    pub start_index: u16,
    pub member_count: u16,
}

impl StructRange {
    /// Indices of the struct members in the property array
    pub fn indices(&self) -> Range<u32> {
        let start = u32::from(self.start_index);
        start..start + u32::from(self.member_count)
    }
}

/// A view over one `EVENT_PROPERTY_INFO`
#[derive(Clone, Copy)]
pub struct PropertyDescriptor<'a> {
    index: u16,
    raw: EventPropertyInfoRaw,
    // the whole schema buffer, as name offsets are relative to it
    strings: BlobReader<'a>,
}

impl<'a> PropertyDescriptor<'a> {
    pub(crate) fn new(index: u16, raw: EventPropertyInfoRaw, strings: BlobReader<'a>) -> Self {
        PropertyDescriptor {
            index,
            raw,
            strings,
        }
    }

    /// Position of this property in the schema's property array
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn flags(&self) -> PropertyFlags {
        PropertyFlags::from(self.raw.flags.get())
    }

    /// Empty if the name is not a valid string of the schema
    pub fn name(&self) -> BoundedString<'a> {
        self.read_string(self.raw.name_offset.get())
    }

    pub fn is_struct(&self) -> bool {
        self.flags().contains(PropertyFlags::PROPERTY_STRUCT)
    }

    /// The struct members, only available on struct properties
    pub fn struct_range(&self) -> Result<StructRange, PropertyError> {
        if !self.is_struct() {
            return Err(PropertyError::NotAStruct { index: self.index });
        }
        Ok(StructRange {
            start_index: self.raw.union_u16(0),
            member_count: self.raw.union_u16(1),
        })
    }

    /// Input type, output type and map name offset, only available on non-struct properties
    pub fn scalar_type(&self) -> Result<ScalarType, PropertyError> {
        if self.is_struct() {
            return Err(PropertyError::IsAStruct { index: self.index });
        }
        Ok(ScalarType {
            in_type: self.raw.union_u16(0),
            out_type: self.raw.union_u16(1),
            map_name_offset: self.raw.union_u32_high(),
        })
    }

    /// Name of the value map (enumeration or bitmap) used to display this property, if any
    ///
    /// Structs have no map.
    pub fn map_name(&self) -> Option<BoundedString<'a>> {
        let scalar = self.scalar_type().ok()?;
        self.strings.read_wstr(scalar.map_name_offset as usize)
    }

    pub fn length(&self) -> PropertyLength {
        let value = self.raw.length.get();
        if self.flags().contains(PropertyFlags::PROPERTY_PARAM_LENGTH) {
            PropertyLength::Index(value)
        } else {
            PropertyLength::Length(value)
        }
    }

    pub fn count(&self) -> PropertyCount {
        let value = self.raw.count.get();
        if self.flags().contains(PropertyFlags::PROPERTY_PARAM_COUNT) {
            PropertyCount::Index(value)
        } else {
            PropertyCount::Count(value)
        }
    }

    /// The length of this property, looking up the value of the property it refers to if need be
    ///
    /// Properties must be decoded in order, so that a referenced property is in `decoded` before
    /// the ones that depend on it.
    pub fn resolved_length(&self, decoded: &DecodedValues<'_>) -> Result<usize, PropertyError> {
        match self.length() {
            PropertyLength::Length(l) => Ok(usize::from(l)),
            PropertyLength::Index(i) => self.lookup(decoded, i),
        }
    }

    /// Same as [`Self::resolved_length`], for the element count
    pub fn resolved_count(&self, decoded: &DecodedValues<'_>) -> Result<usize, PropertyError> {
        match self.count() {
            PropertyCount::Count(c) => Ok(usize::from(c)),
            PropertyCount::Index(i) => self.lookup(decoded, i),
        }
    }

    fn lookup(&self, decoded: &DecodedValues<'_>, referenced: u16) -> Result<usize, PropertyError> {
        let value = decoded
            .get(referenced)
            .ok_or(PropertyError::UnresolvedReference {
                property: self.index,
                referenced,
            })?;
        Ok(usize::try_from(value).unwrap_or(usize::MAX))
    }

    /// Whether this property holds several values, even if the actual count turns out to be 1
    pub fn is_array(&self) -> bool {
        let flags = self.flags();
        flags.intersects(PropertyFlags::PROPERTY_PARAM_COUNT | PropertyFlags::PROPERTY_PARAM_FIXED_COUNT)
            || self.raw.count.get() > 1
    }

    /// The 28-bit field tags, if the property has some
    pub fn tags(&self) -> Option<u32> {
        if self.flags().contains(PropertyFlags::PROPERTY_HAS_TAGS) {
            Some(self.raw.tags.get() & 0x0fff_ffff)
        } else {
            None
        }
    }

    fn read_string(&self, offset: u32) -> BoundedString<'a> {
        self.strings
            .read_wstr(offset as usize)
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for PropertyDescriptor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("flags", &self.flags())
            .finish()
    }
}

/// Integer values of the properties decoded so far, by property index
///
/// Each struct instance gets its own scope, so that members refer to siblings of the same instance.
/// Lookups fall back to the enclosing scopes.
#[derive(Debug, Default)]
pub struct DecodedValues<'p> {
    values: HashMap<u16, u64>,
    parent: Option<&'p DecodedValues<'p>>,
}

impl<'p> DecodedValues<'p> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A nested scope, e.g. for the members of one struct instance
    pub fn child(&self) -> DecodedValues<'_> {
        DecodedValues {
            values: HashMap::new(),
            parent: Some(self),
        }
    }

    pub fn insert(&mut self, index: u16, value: u64) {
        self.values.insert(index, value);
    }

    pub fn get(&self, index: u16) -> Option<u64> {
        match self.values.get(&index) {
            Some(v) => Some(*v),
            None => self.parent.and_then(|p| p.get(index)),
        }
    }
}
