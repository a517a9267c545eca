//! Safe view over an EVENT_RECORD buffer

use zerocopy::FromBytes;

use crate::blob::BlobReader;
use crate::native::etw_types::extended_data::ExtendedDataScanner;
use crate::native::etw_types::{
    EventDescriptor, EventRecordRaw, EVENT_HEADER_FLAG_32_BIT_HEADER,
    EVENT_HEADER_FLAG_64_BIT_HEADER, EVENT_HEADER_FLAG_NO_CPUTIME,
    EVENT_HEADER_FLAG_PRIVATE_SESSION, EVENT_HEADER_FLAG_PROCESSOR_INDEX,
};
use crate::native::guid::Guid;

/// Errors when wrapping a record buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The buffer cannot even hold the fixed-size part of an `EVENT_RECORD`
    BufferTooSmall { len: usize },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferTooSmall { len } => write!(
                f,
                "record buffer too small ({} bytes, need {})",
                len,
                EventRecord::FIXED_SIZE
            ),
        }
    }
}

impl std::error::Error for RecordError {}

/// The CPU time part of an `EVENT_HEADER`, whose meaning depends on the header flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuTime {
    /// Elapsed kernel and user mode time, in CPU ticks
    Split { kernel_time: u32, user_time: u32 },
    /// Elapsed processor time, for events logged to a private session
    Processor(u64),
    /// The session was created with `EVENT_TRACE_NO_CPUTIME`
    NotAvailable,
}

/// A read-only view over a buffer holding one event record
///
/// The buffer starts with the native 64-bit [`EVENT_RECORD`](https://docs.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_record)
/// layout. Its `UserData` and `ExtendedData` fields (and the `DataPtr` of every extended data item)
/// are byte offsets from the start of the buffer rather than addresses, which is what
/// [`EventRecordBuilder`](crate::builder::EventRecordBuilder) produces.
///
/// The view never owns the buffer, and anything borrowed from it (user data, extended data) lives as long as the buffer.
#[derive(Clone, Copy)]
pub struct EventRecord<'a> {
    buffer: &'a [u8],
    raw: EventRecordRaw,
}

impl<'a> EventRecord<'a> {
    /// Size of the fixed part of the record
    pub const FIXED_SIZE: usize = std::mem::size_of::<EventRecordRaw>();

    /// Wrap a record buffer.
    ///
    /// Only the fixed part is required to be present. Out-of-bounds user data or extended data are reported as empty by the accessors.
    pub fn from_bytes(buffer: &'a [u8]) -> Result<Self, RecordError> {
        let raw = EventRecordRaw::read_from_prefix(buffer)
            .ok_or(RecordError::BufferTooSmall { len: buffer.len() })?;
        Ok(EventRecord { buffer, raw })
    }

    /// The whole underlying buffer
    pub fn as_bytes(&self) -> &'a [u8] {
        self.buffer
    }

    /// The `Size` field of the header
    pub fn size(&self) -> u16 {
        self.raw.event_header.size.get()
    }

    /// The `HeaderType` field of the header
    pub fn header_type(&self) -> u16 {
        self.raw.event_header.header_type.get()
    }

    /// The `Flags` field of the header
    pub fn event_flags(&self) -> u16 {
        self.raw.event_header.flags.get()
    }

    /// The `EventProperty` field of the header
    pub fn event_property(&self) -> u16 {
        self.raw.event_header.event_property.get()
    }

    /// The `ProcessId` field of the header
    pub fn process_id(&self) -> u32 {
        self.raw.event_header.process_id.get()
    }

    /// The `ThreadId` field of the header
    pub fn thread_id(&self) -> u32 {
        self.raw.event_header.thread_id.get()
    }

    /// The `TimeStamp` field of the header
    ///
    /// As per [Microsoft's documentation](https://docs.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_header):
    /// > Contains the time that the event occurred.<br/>
    /// > The resolution is system time unless the `ProcessTraceMode member` of `EVENT_TRACE_LOGFILE`
    /// > contains the `PROCESS_TRACE_MODE_RAW_TIMESTAMP` flag, in which case the resolution depends
    /// > on the value of the `Wnode.ClientContext` member of `EVENT_TRACE_PROPERTIES` at the time
    /// > the controller created the session.
    pub fn timestamp(&self) -> i64 {
        self.raw.event_header.timestamp.get()
    }

    /// The `ProviderId` field of the header
    pub fn provider_id(&self) -> Guid {
        Guid::from_bytes(&self.raw.event_header.provider_id)
    }

    /// The `ActivityId` field of the header
    pub fn activity_id(&self) -> Guid {
        Guid::from_bytes(&self.raw.event_header.activity_id)
    }

    /// The whole `EventDescriptor` of the header
    pub fn event_descriptor(&self) -> EventDescriptor {
        EventDescriptor::from(&self.raw.event_header.event_descriptor)
    }

    /// The `Id` field of the event descriptor
    pub fn event_id(&self) -> u16 {
        self.raw.event_header.event_descriptor.id.get()
    }

    /// The `Version` field of the event descriptor
    pub fn version(&self) -> u8 {
        self.raw.event_header.event_descriptor.version
    }

    /// The `Channel` field of the event descriptor
    pub fn channel(&self) -> u8 {
        self.raw.event_header.event_descriptor.channel
    }

    /// The `Level` field of the event descriptor
    pub fn level(&self) -> u8 {
        self.raw.event_header.event_descriptor.level
    }

    /// The `Opcode` field of the event descriptor
    pub fn opcode(&self) -> u8 {
        self.raw.event_header.event_descriptor.opcode
    }

    /// The `Task` field of the event descriptor
    pub fn task(&self) -> u16 {
        self.raw.event_header.event_descriptor.task.get()
    }

    /// The `Keyword` field of the event descriptor
    pub fn keyword(&self) -> u64 {
        self.raw.event_header.event_descriptor.keyword.get()
    }

    /// The CPU time union of the header, interpreted according to the header flags
    pub fn cpu_time(&self) -> CpuTime {
        let flags = self.event_flags();
        let time = &self.raw.event_header.time;

        if flags & EVENT_HEADER_FLAG_NO_CPUTIME != 0 {
            CpuTime::NotAvailable
        } else if flags & EVENT_HEADER_FLAG_PRIVATE_SESSION != 0 {
            CpuTime::Processor(u64::from_le_bytes(*time))
        } else {
            CpuTime::Split {
                kernel_time: u32::from_le_bytes([time[0], time[1], time[2], time[3]]),
                user_time: u32::from_le_bytes([time[4], time[5], time[6], time[7]]),
            }
        }
    }

    /// The index of the CPU that logged the event
    ///
    /// This is the 16-bit `ProcessorIndex` when the header has `EVENT_HEADER_FLAG_PROCESSOR_INDEX`, and the 8-bit `ProcessorNumber` otherwise.
    pub fn processor_index(&self) -> u16 {
        let processor = self.raw.processor;
        if self.event_flags() & EVENT_HEADER_FLAG_PROCESSOR_INDEX != 0 {
            u16::from_le_bytes(processor)
        } else {
            u16::from(processor[0])
        }
    }

    /// The `LoggerId` of the buffer context
    pub fn logger_id(&self) -> u16 {
        self.raw.logger_id.get()
    }

    /// Whether the event was logged by a 32-bit process
    ///
    /// The header flags `EVENT_HEADER_FLAG_32_BIT_HEADER` and `EVENT_HEADER_FLAG_64_BIT_HEADER` win.
    /// Only when neither is set is `native_pointer_size` (in bytes, as seen by whoever captured the record) used.
    pub fn is_32bit(&self, native_pointer_size: usize) -> bool {
        let flags = self.event_flags();
        if flags & EVENT_HEADER_FLAG_32_BIT_HEADER != 0 {
            true
        } else if flags & EVENT_HEADER_FLAG_64_BIT_HEADER != 0 {
            false
        } else {
            native_pointer_size == 4
        }
    }

    /// Size in bytes of pointer-sized properties of this event
    pub fn pointer_size(&self, native_pointer_size: usize) -> usize {
        if self.is_32bit(native_pointer_size) {
            4
        } else {
            8
        }
    }

    /// The user data (a.k.a. event payload) of this record
    ///
    /// Empty if the declared user data does not fit in the buffer.
    pub fn user_buffer(&self) -> &'a [u8] {
        let len = usize::from(self.raw.user_data_length.get());
        if len == 0 {
            return &[];
        }

        let reader = BlobReader::new(self.buffer);
        match usize::try_from(self.raw.user_data.get())
            .ok()
            .and_then(|offset| reader.bytes(offset, len))
        {
            Some(data) => data,
            None => {
                log::warn!(
                    "user data of event {} from {} lies outside of its record buffer",
                    self.event_id(),
                    self.provider_id()
                );
                &[]
            }
        }
    }

    /// Number of extended data items declared by the record
    pub fn extended_data_count(&self) -> u16 {
        self.raw.extended_data_count.get()
    }

    /// Returns the extended data of this record
    ///
    /// # Example
    /// ```
    /// # use ferrisetw_decode::EventRecord;
    /// # use ferrisetw_decode::native::etw_types::ExtendedDataType;
    /// # let buffer = ferrisetw_decode::builder::EventRecordBuilder::new().build();
    /// let record = EventRecord::from_bytes(&buffer).unwrap();
    /// let related_activity = record
    ///     .extended_data()
    ///     .find(ExtendedDataType::RelatedActivityId)
    ///     .and_then(|item| item.related_activity_id());
    /// assert!(related_activity.is_none());
    /// ```
    pub fn extended_data(&self) -> ExtendedDataScanner<'a> {
        ExtendedDataScanner::new(
            self.buffer,
            self.raw.extended_data.get(),
            self.extended_data_count(),
        )
    }
}

impl std::fmt::Debug for EventRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("provider_id", &self.provider_id())
            .field("descriptor", &self.event_descriptor())
            .field("process_id", &self.process_id())
            .field("thread_id", &self.thread_id())
            .field("timestamp", &self.timestamp())
            .finish()
    }
}
