//! # Event Windows Tracing, decoded
//! This crate decodes ETW events that have already been captured, from plain byte buffers.
//!
//! It is a sibling of [ferrisetw](https://github.com/n4r1b/ferrisetw), which started as a
//! [KrabsETW](https://github.com/microsoft/krabsetw/) rip-off written in Rust. Where ferrisetw
//! drives live trace sessions through the Windows APIs, this crate only reads the binary
//! structures those sessions produce, so it builds and runs on any platform.
//!
//! # What's ETW
//! Event Tracing for Windows (ETW) is an efficient kernel-level tracing facility that lets you log
//! kernel or application-defined events to a log file. You can consume the events in real time or
//! from a log file and use them to debug an application or to determine where performance issues
//! are occurring in the application. [Source]
//!
//! Every event comes as an `EVENT_RECORD`: a fixed header, an optional array of extended data items,
//! and a blob of user data. The layout of the user data is described by a `TRACE_EVENT_INFO`
//! buffer (the event "schema"), that lists the event properties along with their types.
//!
//! # Buffers
//! Both structures are read from byte slices, and are never trusted: every offset and length is
//! checked against the buffer it points into. The pointers of an `EVENT_RECORD` (to the extended data
//! array, to each item data and to the user data) hold byte offsets from the start of the record buffer.
//! [`builder::EventRecordBuilder`] and [`builder::SchemaBuilder`] write buffers in that layout.
//!
//! # Getting started
//! ```
//! use ferrisetw_decode::builder::{EventRecordBuilder, PropertyDefinition, SchemaBuilder};
//! use ferrisetw_decode::native::etw_types::EventDescriptor;
//! use ferrisetw_decode::native::tdh_types::{TdhInType, TdhOutType};
//! use ferrisetw_decode::parser::Parser;
//! use ferrisetw_decode::schema_locator::SchemaLocator;
//! use ferrisetw_decode::{EventRecord, Guid, Schema};
//!
//! fn process_callback(record: &EventRecord, schema_locator: &SchemaLocator) {
//!     // Basic event scrutinizing can be done directly from the `EventRecord`
//!     if record.event_id() == 2 {
//!         // More advanced info can be retrieved from the event schema
//!         match schema_locator.event_schema(record) {
//!             None => println!("Unknown event"),
//!             Some(schema_buffer) => {
//!                 let schema = Schema::from_bytes(&schema_buffer).unwrap();
//!                 println!("Received an event from provider {}", schema.provider_name());
//!
//!                 // Finally, properties for a given event can be retrieved using a Parser
//!                 let parser = Parser::create(record, &schema);
//!
//!                 // You'll need type inference to tell ferrisetw_decode what type you want to parse into
//!                 // In actual code, be sure to correctly handle Err values!
//!                 let process_id: u32 = parser.try_parse("ProcessID").unwrap();
//!                 let image_name: String = parser.try_parse("ImageName").unwrap();
//!                 println!("PID: {} ImageName: {}", process_id, image_name);
//!             }
//!         }
//!     }
//! }
//!
//! fn main() {
//!     // Microsoft-Windows-Kernel-Process
//!     let provider: Guid = "22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716".parse().unwrap();
//!     let descriptor = EventDescriptor { id: 2, ..Default::default() };
//!
//!     let schema_locator = SchemaLocator::new();
//!     schema_locator
//!         .insert(
//!             SchemaBuilder::new(provider, descriptor)
//!                 .provider_name("Microsoft-Windows-Kernel-Process")
//!                 .property(PropertyDefinition::scalar("ProcessID", TdhInType::InTypeUInt32, TdhOutType::OutTypePid))
//!                 .property(PropertyDefinition::scalar("ImageName", TdhInType::InTypeUnicodeString, TdhOutType::OutTypeString))
//!                 .build(),
//!         )
//!         .unwrap();
//!
//!     let mut user_data = 4242u32.to_le_bytes().to_vec();
//!     user_data.extend("notepad.exe\0".encode_utf16().flat_map(u16::to_le_bytes));
//!     let buffer = EventRecordBuilder::new()
//!         .provider_id(provider)
//!         .descriptor(descriptor)
//!         .user_data(&user_data)
//!         .build();
//!
//!     process_callback(&EventRecord::from_bytes(&buffer).unwrap(), &schema_locator);
//! }
//! ```
//!
//! [Source]: https://docs.microsoft.com/en-us/windows/win32/etw/about-event-tracing
//!
//! # Log messages
//! ferrisetw_decode may (very) occasionally write log messages using the [`log`](https://docs.rs/log/latest/log/) crate,
//! when it meets malformed buffers.<br/>
//! In case you want them to be printed to the console, your binary should use one of the various logger implementations. [`env_logger`](https://docs.rs/env_logger/latest/env_logger/) is one of them.

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate num_derive;
extern crate num_traits;

pub mod blob;
pub mod builder;
pub mod native;
pub mod parser;
pub mod property;
pub mod provider_names;
pub mod schema;
pub mod schema_locator;
pub mod ser;
mod utils;

// Convenience re-exports.
pub use crate::native::etw_types::event_record::EventRecord;
pub use crate::native::guid::Guid;
pub use crate::parser::Parser;
pub use crate::schema::Schema;
pub use crate::schema_locator::SchemaLocator;
#[cfg(feature = "serde")]
pub use crate::ser::{EventSerializer, EventSerializerOptions};
