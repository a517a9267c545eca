//! A way to cache and retrieve Schemas

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::native::etw_types::EventRecord;
use crate::native::guid::Guid;
use crate::schema::{Schema, SchemaError};

type SchemaResult<T> = Result<T, SchemaError>;

/// A way to group events that share the same [`Schema`]
///
/// From the [docs](https://docs.microsoft.com/en-us/windows/win32/api/evntprov/ns-evntprov-event_descriptor):
/// > For manifest-based ETW, the combination Provider.DecodeGuid + Event.Id + Event.Version should uniquely identify an event,
/// > i.e. all events with the same DecodeGuid, Id, and Version should have the same set of fields with no changes in field names, field types, or field ordering.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SchemaKey {
    provider: Guid,
    /// From the [docs](https://docs.microsoft.com/en-us/windows/win32/api/evntprov/ns-evntprov-event_descriptor): A 16-bit number used to identify manifest-based events
    id: u16,
    /// From the [docs](https://docs.microsoft.com/en-us/windows/win32/api/evntprov/ns-evntprov-event_descriptor): An 8-bit number used to specify the version of a manifest-based event.
    // The version indicates a revision to the definition of an event with a particular Id.
    // All events with a given Id should have similar semantics, but a change in version
    // can be used to indicate a minor modification of the event details, e.g. a change to
    // the type of a field or the addition of a new field.
    version: u8,

    // Classic (MOF) events share an id and tell their layouts apart with these.
    // Comparing schemas for equality does not use them.
    opcode: u8,
    level: u8,
}

impl SchemaKey {
    pub fn new(event: &EventRecord<'_>) -> Self {
        SchemaKey {
            provider: event.provider_id(),
            id: event.event_id(),
            opcode: event.opcode(),
            version: event.version(),
            level: event.level(),
        }
    }

    pub fn from_schema(schema: &Schema<'_>) -> Self {
        SchemaKey {
            provider: schema.provider_guid(),
            id: schema.event_id(),
            opcode: schema.opcode(),
            version: schema.event_version(),
            level: schema.level(),
        }
    }

    pub fn provider(&self) -> Guid {
        self.provider
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn version(&self) -> u8 {
        self.version
    }
}

/// Represents a store of the schema buffers known so far
///
/// This store is implemented as a [HashMap] where the key is a combination of the following elements
/// of an [Event Record](https://docs.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_record)
/// * EventHeader.ProviderId
/// * EventHeader.EventDescriptor.Id
/// * EventHeader.EventDescriptor.Opcode
/// * EventHeader.EventDescriptor.Version
/// * EventHeader.EventDescriptor.Level
///
/// Credits: [KrabsETW::schema_locator](https://github.com/microsoft/krabsetw/blob/master/krabs/krabs/schema_locator.hpp).
/// See also the code of `SchemaKey` for more info
///
/// # Example
/// ```
/// # use ferrisetw_decode::builder::{EventRecordBuilder, SchemaBuilder};
/// # use ferrisetw_decode::native::etw_types::EventDescriptor;
/// # use ferrisetw_decode::schema_locator::SchemaLocator;
/// # use ferrisetw_decode::{EventRecord, Guid, Schema};
/// let locator = SchemaLocator::new();
/// locator
///     .insert(SchemaBuilder::new(Guid::NULL, EventDescriptor::default()).build())
///     .unwrap();
///
/// let buffer = EventRecordBuilder::new().build();
/// let record = EventRecord::from_bytes(&buffer).unwrap();
/// let schema_buffer = locator.event_schema(&record).unwrap();
/// let schema = Schema::from_bytes(&schema_buffer).unwrap();
/// ```
#[derive(Default)]
pub struct SchemaLocator {
    schemas: Mutex<HashMap<SchemaKey, Arc<[u8]>>>,
}

impl std::fmt::Debug for SchemaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaLocator")
            .field("len", &self.schemas.try_lock().map(|guard| guard.len()))
            .finish()
    }
}

impl SchemaLocator {
    pub fn new() -> Self {
        SchemaLocator {
            schemas: Mutex::new(HashMap::new()),
        }
    }

    /// Store a schema buffer, replacing any schema previously stored for the same events
    ///
    /// The buffer is checked to be a valid schema first.
    pub fn insert(&self, schema_buffer: Vec<u8>) -> SchemaResult<SchemaKey> {
        let key = Schema::from_bytes(&schema_buffer)?.key();
        match self.schemas.lock() {
            Ok(mut schemas) => {
                schemas.insert(key, Arc::from(schema_buffer));
            }
            Err(_) => log::warn!("schema locator poisoned, not storing schema {:?}", key),
        }
        Ok(key)
    }

    /// Retrieve the schema buffer that applies to an event, if one has been stored
    ///
    /// # Arguments
    /// * `event` - The [EventRecord] to decode
    pub fn event_schema(&self, event: &EventRecord<'_>) -> Option<Arc<[u8]>> {
        let key = SchemaKey::new(event);
        let schemas = self.schemas.lock().ok()?;
        schemas.get(&key).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.schemas.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::{EventRecordBuilder, SchemaBuilder};
    use crate::native::etw_types::EventDescriptor;

    fn descriptor(id: u16, version: u8, opcode: u8) -> EventDescriptor {
        EventDescriptor {
            id,
            version,
            opcode,
            level: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_schema_key() {
        let provider: Guid = "22FB2CD6-0E7B-422B-A0C7-2FAD1FD0E716".parse().unwrap();
        let record_buffer = EventRecordBuilder::new()
            .provider_id(provider)
            .descriptor(descriptor(1, 2, 3))
            .build();
        let record = EventRecord::from_bytes(&record_buffer).unwrap();
        let schema_buffer = SchemaBuilder::new(provider, descriptor(1, 2, 3)).build();
        let schema = Schema::from_bytes(&schema_buffer).unwrap();

        assert_eq!(SchemaKey::new(&record), schema.key());
        assert_eq!(schema.key().provider(), provider);
        assert_eq!(schema.key().id(), 1);
        assert_eq!(schema.key().version(), 2);

        let other_opcode = SchemaBuilder::new(provider, descriptor(1, 2, 4)).build();
        let other_opcode = Schema::from_bytes(&other_opcode).unwrap();
        assert_ne!(SchemaKey::new(&record), other_opcode.key());
    }

    #[test]
    fn test_locate() {
        let provider: Guid = "22FB2CD6-0E7B-422B-A0C7-2FAD1FD0E716".parse().unwrap();
        let locator = SchemaLocator::new();
        assert!(locator.is_empty());

        let key = locator
            .insert(
                SchemaBuilder::new(provider, descriptor(1, 0, 0))
                    .task_name("ProcessStart")
                    .build(),
            )
            .unwrap();
        locator
            .insert(
                SchemaBuilder::new(provider, descriptor(2, 0, 0))
                    .task_name("ProcessStop")
                    .build(),
            )
            .unwrap();
        assert_eq!(locator.len(), 2);
        assert_eq!(key.id(), 1);

        let stop = EventRecordBuilder::new()
            .provider_id(provider)
            .descriptor(descriptor(2, 0, 0))
            .build();
        let stop = EventRecord::from_bytes(&stop).unwrap();
        let found = locator.event_schema(&stop).unwrap();
        assert_eq!(Schema::from_bytes(&found).unwrap().task_name(), "ProcessStop");

        let unknown = EventRecordBuilder::new()
            .provider_id(provider)
            .descriptor(descriptor(3, 0, 0))
            .build();
        let unknown = EventRecord::from_bytes(&unknown).unwrap();
        assert!(locator.event_schema(&unknown).is_none());
    }

    #[test]
    fn test_invalid_schemas_are_rejected() {
        let locator = SchemaLocator::new();
        assert!(locator.insert(vec![0u8; 12]).is_err());
        assert!(locator.is_empty());
    }
}
