//! A module to handle Extended Data from ETW traces
//!
//! Extended data items trail an event record. Each one is tagged with an `ExtType` and declares
//! the size of its payload; the typed accessors here check both before decoding anything.

use zerocopy::FromBytes;

use crate::blob::BlobReader;
use crate::native::etw_types::ExtendedDataItemRaw;
use crate::native::guid::Guid;
use crate::native::sddl::Sid;

/// Returned by [`ExtendedDataScanner::related_activity_id`] when a record carries no related activity
pub const NO_RELATED_ACTIVITY_ID: Guid = Guid::from_values(
    0xD733D8B0,
    0x7D18,
    0x4AEB,
    [0xA3, 0xFC, 0x8C, 0x46, 0x13, 0xBC, 0x2A, 0x40],
);

const ITEM_SIZE: usize = std::mem::size_of::<ExtendedDataItemRaw>();

/// Values of `EVENT_HEADER_EXTENDED_DATA_ITEM.ExtType`
///
/// See <https://docs.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_header_extended_data_item>
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
pub enum ExtendedDataType {
    RelatedActivityId = 1,
    Sid = 2,
    TsId = 3,
    InstanceInfo = 4,
    StackTrace32 = 5,
    StackTrace64 = 6,
    PebsIndex = 7,
    PmcCounters = 8,
    PsmKey = 9,
    EventKey = 10,
    EventSchemaTl = 11,
    ProvTraits = 12,
    ProcessStartKey = 13,
    ControlGuid = 14,
    QpcDelta = 15,
    ContainerId = 16,
    StackKey32 = 17,
    StackKey64 = 18,
}

/// Iterates over the extended data items of a record
///
/// Records carry very few items (usually 0 to 3), so lookups are linear scans.
#[derive(Clone, Copy)]
pub struct ExtendedDataScanner<'a> {
    record: &'a [u8],
    items: &'a [u8],
}

impl<'a> ExtendedDataScanner<'a> {
    /// `offset` and `count` are the `ExtendedData` and `ExtendedDataCount` fields of the record
    pub(crate) fn new(record: &'a [u8], offset: u64, count: u16) -> Self {
        let empty = ExtendedDataScanner { record, items: &[] };
        if count == 0 {
            return empty;
        }

        let reader = BlobReader::new(record);
        let wanted = usize::from(count) * ITEM_SIZE;
        let items = usize::try_from(offset).ok().and_then(|offset| {
            reader
                .bytes(offset, wanted)
                .or_else(|| reader.tail(offset))
        });

        match items {
            Some(items) => {
                if items.len() < wanted {
                    log::warn!(
                        "extended data array truncated: {} of {} items fit in the record",
                        items.len() / ITEM_SIZE,
                        count
                    );
                }
                let whole = items.len() - items.len() % ITEM_SIZE;
                ExtendedDataScanner {
                    record,
                    items: &items[..whole],
                }
            }
            None => {
                log::warn!("extended data array lies outside of its record buffer");
                empty
            }
        }
    }

    /// Number of items that actually fit in the record
    pub fn len(&self) -> usize {
        self.items.len() / ITEM_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EventHeaderExtendedDataItem<'a>> + 'a {
        let record = self.record;
        let items = self.items;
        items.chunks_exact(ITEM_SIZE).filter_map(move |chunk| {
            ExtendedDataItemRaw::read_from(chunk)
                .map(|raw| EventHeaderExtendedDataItem::new(record, raw))
        })
    }

    /// The first item with the given tag
    pub fn find(&self, ext_type: ExtendedDataType) -> Option<EventHeaderExtendedDataItem<'a>> {
        let wanted = ext_type as u16;
        self.iter().find(|item| item.data_type() == wanted)
    }

    /// The related activity id, or [`NO_RELATED_ACTIVITY_ID`] if there is none (or it is malformed)
    pub fn related_activity_id(&self) -> Guid {
        self.find(ExtendedDataType::RelatedActivityId)
            .and_then(|item| item.related_activity_id())
            .unwrap_or(NO_RELATED_ACTIVITY_ID)
    }

    /// The SID of the user that logged the event
    pub fn sid(&self) -> Option<Sid<'a>> {
        self.find(ExtendedDataType::Sid)?.sid()
    }

    /// The terminal session id
    pub fn session_id(&self) -> Option<u32> {
        self.find(ExtendedDataType::TsId)?.session_id()
    }

    /// The unique event key
    pub fn event_key(&self) -> Option<u64> {
        self.find(ExtendedDataType::EventKey)?.event_key()
    }

    /// The process start key (unique across the boot session)
    pub fn process_start_key(&self) -> Option<u64> {
        self.find(ExtendedDataType::ProcessStartKey)?.process_start_key()
    }
}

impl std::fmt::Debug for ExtendedDataScanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// One `EVENT_HEADER_EXTENDED_DATA_ITEM` of a record
#[derive(Clone, Copy)]
pub struct EventHeaderExtendedDataItem<'a> {
    ext_type: u16,
    linkage: bool,
    declared_size: u16,
    /// `None` when the payload lies outside of the record buffer
    data: Option<&'a [u8]>,
}

/// A safe representation of an ExtendedDataItem
///
/// See <https://docs.microsoft.com/en-us/windows/win32/api/relogger/ns-relogger-event_header_extended_data_item>
#[derive(Debug, Clone)]
pub enum ExtendedDataItem<'a> {
    /// Unexpected, invalid or not implemented yet
    Unsupported,
    /// Related activity identifier
    RelatedActivityId(Guid),
    /// Security identifier (SID) of the user that logged the event
    Sid(Sid<'a>),
    /// Terminal session identifier
    TsId(u32),
    InstanceInfo(InstanceInfo),
    /// Call stack (if the event is captured on a 32-bit computer)
    StackTrace32(StackTrace<u32>),
    /// Call stack (if the event is captured on a 64-bit computer)
    StackTrace64(StackTrace<u64>),
    /// TraceLogging event metadata information
    TraceLogging(String),
    /// Unique event identifier
    EventKey(u64),
    /// Unique process identifier (unique across the boot session)
    ProcessStartKey(u64),
}

/// Payload of an `EVENT_HEADER_EXT_TYPE_INSTANCE_INFO` item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceInfo {
    pub instance_id: u32,
    pub parent_instance_id: u32,
    pub parent_guid: Guid,
}

/// Payload of the `EVENT_HEADER_EXT_TYPE_STACK_TRACE32` and `EVENT_HEADER_EXT_TYPE_STACK_TRACE64` items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTrace<T> {
    pub match_id: u64,
    pub addresses: Vec<T>,
}

impl<'a> EventHeaderExtendedDataItem<'a> {
    fn new(record: &'a [u8], raw: ExtendedDataItemRaw) -> Self {
        let declared_size = raw.data_size.get();
        let data = usize::try_from(raw.data_ptr.get())
            .ok()
            .and_then(|offset| BlobReader::new(record).bytes(offset, usize::from(declared_size)));

        EventHeaderExtendedDataItem {
            ext_type: raw.ext_type.get(),
            linkage: raw.reserved2.get() & 1 != 0,
            declared_size,
            data,
        }
    }

    /// Returns the `ExtType` of this extended data.
    ///
    /// See <https://docs.microsoft.com/en-us/windows/win32/api/relogger/ns-relogger-event_header_extended_data_item> for possible values
    pub fn data_type(&self) -> u16 {
        self.ext_type
    }

    /// The `ExtType` as a known [`ExtendedDataType`], if it is one
    pub fn known_type(&self) -> Option<ExtendedDataType> {
        num_traits::FromPrimitive::from_u16(self.ext_type)
    }

    /// Whether another item of the same kind follows this one
    pub fn linkage(&self) -> bool {
        self.linkage
    }

    /// The `DataSize` declared by the item
    pub fn declared_size(&self) -> u16 {
        self.declared_size
    }

    /// The payload, if it lies within the record
    pub fn data(&self) -> Option<&'a [u8]> {
        self.data
    }

    pub fn is_tlg(&self) -> bool {
        self.ext_type == ExtendedDataType::EventSchemaTl as u16
    }

    /// The payload, but only if this item has the expected tag and declares at least `min_size` bytes
    fn payload(&self, ext_type: ExtendedDataType, min_size: usize) -> Option<&'a [u8]> {
        if self.ext_type != ext_type as u16 || usize::from(self.declared_size) < min_size {
            return None;
        }
        self.data
    }

    pub fn related_activity_id(&self) -> Option<Guid> {
        Guid::from_slice(self.payload(ExtendedDataType::RelatedActivityId, Guid::SIZE)?)
    }

    /// The SID payload
    ///
    /// The size of a SID depends on its own `SubAuthorityCount`, so the declared size is checked again once that count is known.
    pub fn sid(&self) -> Option<Sid<'a>> {
        let data = self.payload(ExtendedDataType::Sid, Sid::MIN_SIZE)?;
        let sid = Sid::from_bytes(data)?;
        if sid.len() > usize::from(self.declared_size) {
            return None;
        }
        Some(sid)
    }

    pub fn session_id(&self) -> Option<u32> {
        BlobReader::new(self.payload(ExtendedDataType::TsId, 4)?).read_u32(0)
    }

    pub fn event_key(&self) -> Option<u64> {
        BlobReader::new(self.payload(ExtendedDataType::EventKey, 8)?).read_u64(0)
    }

    pub fn process_start_key(&self) -> Option<u64> {
        BlobReader::new(self.payload(ExtendedDataType::ProcessStartKey, 8)?).read_u64(0)
    }

    pub fn instance_info(&self) -> Option<InstanceInfo> {
        let reader = BlobReader::new(self.payload(ExtendedDataType::InstanceInfo, 24)?);
        Some(InstanceInfo {
            instance_id: reader.read_u32(0)?,
            parent_instance_id: reader.read_u32(4)?,
            parent_guid: reader.read_guid(8)?,
        })
    }

    pub fn stack_trace32(&self) -> Option<StackTrace<u32>> {
        let data = self.payload(ExtendedDataType::StackTrace32, 8)?;
        let match_id = BlobReader::new(data).read_u64(0)?;
        let addresses = data[8..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(StackTrace {
            match_id,
            addresses,
        })
    }

    pub fn stack_trace64(&self) -> Option<StackTrace<u64>> {
        let data = self.payload(ExtendedDataType::StackTrace64, 8)?;
        let match_id = BlobReader::new(data).read_u64(0)?;
        let addresses = data[8..]
            .chunks_exact(8)
            .filter_map(|c| BlobReader::new(c).read_u64(0))
            .collect();
        Some(StackTrace {
            match_id,
            addresses,
        })
    }

    /// The event name carried by a TraceLogging schema item
    ///
    /// The payload is a `_tlgEventMetadata_t` (see `TraceLoggingProvider.h` in the Windows SDK):
    ///
    /// ```cpp
    /// struct _tlgEventMetadata_t
    /// {
    ///     UINT16 RemainingSize; // = sizeof(RemainingSize + Tags + EventName + Fields)
    ///     UINT8 Tags[]; // 1 or more bytes. Read until you hit a byte with high bit unset.
    ///     char EventName[sizeof("eventName")]; // UTF-8 nul-terminated event name
    ///     ...fields
    /// }
    /// ```
    ///
    /// As per the MS header 'This structure may change in future revisions of this header.'
    pub fn tracelogging_event_name(&self) -> Option<String> {
        let data = self.payload(ExtendedDataType::EventSchemaTl, 3)?;
        let remaining = usize::from(BlobReader::new(data).read_u16(0)?);
        let data = &data[..remaining.min(data.len())];

        let mut pos = 2;
        loop {
            let tag = *data.get(pos)?;
            pos += 1;
            if tag & 0b1000_0000 == 0 {
                break;
            }
        }

        let name = BlobReader::new(data).tail(pos)?;
        let len = name.iter().position(|b| *b == 0)?;
        Some(String::from_utf8_lossy(&name[..len]).into_owned())
    }

    /// Returns this extended data as a variant of a Rust enum.
    pub fn to_extended_data_item(&self) -> ExtendedDataItem<'a> {
        let item = match self.known_type() {
            Some(ExtendedDataType::RelatedActivityId) => {
                self.related_activity_id().map(ExtendedDataItem::RelatedActivityId)
            }
            Some(ExtendedDataType::Sid) => self.sid().map(ExtendedDataItem::Sid),
            Some(ExtendedDataType::TsId) => self.session_id().map(ExtendedDataItem::TsId),
            Some(ExtendedDataType::InstanceInfo) => {
                self.instance_info().map(ExtendedDataItem::InstanceInfo)
            }
            Some(ExtendedDataType::StackTrace32) => {
                self.stack_trace32().map(ExtendedDataItem::StackTrace32)
            }
            Some(ExtendedDataType::StackTrace64) => {
                self.stack_trace64().map(ExtendedDataItem::StackTrace64)
            }
            Some(ExtendedDataType::EventKey) => self.event_key().map(ExtendedDataItem::EventKey),
            Some(ExtendedDataType::ProcessStartKey) => {
                self.process_start_key().map(ExtendedDataItem::ProcessStartKey)
            }
            Some(ExtendedDataType::EventSchemaTl) => self
                .tracelogging_event_name()
                .map(ExtendedDataItem::TraceLogging),
            _ => None,
        };

        item.unwrap_or(ExtendedDataItem::Unsupported)
    }
}

impl std::fmt::Debug for EventHeaderExtendedDataItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHeaderExtendedDataItem")
            .field("ext_type", &self.ext_type)
            .field("declared_size", &self.declared_size)
            .field("in_bounds", &self.data.is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::EventRecordBuilder;
    use crate::EventRecord;

    fn sid_bytes(sub_authorities: &[u32]) -> Vec<u8> {
        let mut bytes = vec![1, sub_authorities.len() as u8, 0, 0, 0, 0, 0, 5];
        for s in sub_authorities {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_related_activity_id() {
        let related: Guid = "0C6B2A4E-91D3-4A7F-8E22-5B1C3D4E5F60".parse().unwrap();
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::RelatedActivityId as u16, &related.to_bytes())
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        assert_eq!(record.extended_data().related_activity_id(), related);

        let empty = EventRecordBuilder::new().build();
        let record = EventRecord::from_bytes(&empty).unwrap();
        assert_eq!(
            record.extended_data().related_activity_id(),
            NO_RELATED_ACTIVITY_ID
        );
        assert_eq!(
            NO_RELATED_ACTIVITY_ID.to_string(),
            "D733D8B0-7D18-4AEB-A3FC-8C4613BC2A40"
        );
    }

    #[test]
    fn test_short_related_activity_id_falls_back_to_sentinel() {
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::RelatedActivityId as u16, &[0xab; 15])
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        assert_eq!(
            record.extended_data().related_activity_id(),
            NO_RELATED_ACTIVITY_ID
        );
    }

    #[test]
    fn test_sid_size_gating() {
        let full = sid_bytes(&[32, 544]);
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::Sid as u16, &full)
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        let sid = record.extended_data().sid().unwrap();
        assert_eq!(sid.to_string(), "S-1-5-32-544");

        // The SID says it has 2 sub-authorities, but the item only declares room for one
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::Sid as u16, &full[..12])
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        assert!(record.extended_data().sid().is_none());
        assert!(matches!(
            record
                .extended_data()
                .find(ExtendedDataType::Sid)
                .unwrap()
                .to_extended_data_item(),
            ExtendedDataItem::Unsupported
        ));
    }

    #[test]
    fn test_scalars_need_enough_bytes() {
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::TsId as u16, &7u32.to_le_bytes())
            .extended_item(ExtendedDataType::EventKey as u16, &0x1122u64.to_le_bytes())
            .extended_item(ExtendedDataType::ProcessStartKey as u16, &[1, 2, 3])
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        let scanner = record.extended_data();
        assert_eq!(scanner.len(), 3);
        assert_eq!(scanner.session_id(), Some(7));
        assert_eq!(scanner.event_key(), Some(0x1122));
        assert_eq!(scanner.process_start_key(), None);
    }

    #[test]
    fn test_tag_is_checked() {
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::EventKey as u16, &0x1122u64.to_le_bytes())
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        let item = record.extended_data().iter().next().unwrap();
        assert_eq!(item.event_key(), Some(0x1122));
        assert_eq!(item.process_start_key(), None);
        assert_eq!(item.session_id(), None);
    }

    #[test]
    fn test_stack_trace_and_instance_info() {
        let mut stack = 99u64.to_le_bytes().to_vec();
        stack.extend_from_slice(&0x7ff0_0000_1000u64.to_le_bytes());
        stack.extend_from_slice(&0x7ff0_0000_2000u64.to_le_bytes());

        let parent: Guid = "0C6B2A4E-91D3-4A7F-8E22-5B1C3D4E5F60".parse().unwrap();
        let mut instance = 3u32.to_le_bytes().to_vec();
        instance.extend_from_slice(&1u32.to_le_bytes());
        instance.extend_from_slice(&parent.to_bytes());

        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::StackTrace64 as u16, &stack)
            .extended_item(ExtendedDataType::InstanceInfo as u16, &instance)
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        let items: Vec<_> = record
            .extended_data()
            .iter()
            .map(|i| i.to_extended_data_item())
            .collect();

        match &items[0] {
            ExtendedDataItem::StackTrace64(st) => {
                assert_eq!(st.match_id, 99);
                assert_eq!(st.addresses, vec![0x7ff0_0000_1000, 0x7ff0_0000_2000]);
            }
            other => panic!("unexpected item {:?}", other),
        }
        match &items[1] {
            ExtendedDataItem::InstanceInfo(info) => {
                assert_eq!(info.instance_id, 3);
                assert_eq!(info.parent_guid, parent);
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_tracelogging_event_name() {
        let mut meta = Vec::new();
        meta.extend_from_slice(&0u16.to_le_bytes());
        meta.push(0x80); // a tag byte with the high bit set, followed by one without
        meta.push(0x01);
        meta.extend_from_slice(b"Event1\0");
        meta.extend_from_slice(b"Field\0\x08\x00");
        let remaining = meta.len() as u16;
        meta[..2].copy_from_slice(&remaining.to_le_bytes());

        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::EventSchemaTl as u16, &meta)
            .build();
        let record = EventRecord::from_bytes(&buffer).unwrap();
        let item = record.extended_data().iter().next().unwrap();
        assert!(item.is_tlg());
        assert_eq!(item.tracelogging_event_name().as_deref(), Some("Event1"));
    }

    #[test]
    fn test_truncated_item_array() {
        let buffer = EventRecordBuilder::new()
            .extended_item(ExtendedDataType::TsId as u16, &7u32.to_le_bytes())
            .build();
        // claim 2 items while only one was written, then cut the buffer right after the item array
        let mut patched = buffer.clone();
        patched[84..86].copy_from_slice(&2u16.to_le_bytes());
        let record = EventRecord::from_bytes(&patched).unwrap();
        assert_eq!(record.extended_data_count(), 2);
        // only the 8-byte payload of the first item follows the array, not enough for a second item
        assert_eq!(record.extended_data().len(), 1);
        assert_eq!(record.extended_data().session_id(), Some(7));

        let cut = &buffer[..EventRecord::FIXED_SIZE + 8];
        let record = EventRecord::from_bytes(cut).unwrap();
        assert!(record.extended_data().is_empty());
    }
}
