#![cfg(feature = "serde")]

use ferrisetw_decode::builder::PropertyDefinition;
use ferrisetw_decode::native::tdh_types::{TdhInType, TdhOutType};
use ferrisetw_decode::{EventRecord, EventSerializer, EventSerializerOptions, Guid, Schema};
use serde_json::json;

mod utils;
use utils::{init_logger, record_for, schema_for, utf16z, UserData, KERNEL_PROCESS_PROVIDER};

fn process_start_schema() -> Vec<u8> {
    schema_for(1)
        .provider_name("Microsoft-Windows-Kernel-Process")
        .event_name("ProcessStart")
        .task_name("ProcessStart ")
        .opcode_name("Start")
        .property(PropertyDefinition::scalar(
            "ProcessID",
            TdhInType::InTypeUInt32,
            TdhOutType::OutTypePid,
        ))
        .property(PropertyDefinition::scalar(
            "ImageName",
            TdhInType::InTypeUnicodeString,
            TdhOutType::OutTypeString,
        ))
        .property(
            PropertyDefinition::scalar("Flags", TdhInType::InTypeUInt8, TdhOutType::OutTypeNull)
                .with_fixed_count(2),
        )
        .property(PropertyDefinition::scalar(
            "Elevated",
            TdhInType::InTypeUInt8,
            TdhOutType::OutTypeBoolean,
        ))
        .property(PropertyDefinition::scalar(
            "ExitCode",
            TdhInType::InTypeUInt32,
            TdhOutType::OutTypeNull,
        ))
        .build()
}

fn process_start_user_data() -> Vec<u8> {
    UserData::new()
        .u32(4242)
        .raw(&utf16z("notepad.exe"))
        .u8(1)
        .u8(2)
        .u8(1)
        .build()
}

#[test]
fn serialize_event() {
    init_logger();

    let related: Guid = "6990501B-4484-4EF0-8793-84159B8D4728".parse().unwrap();
    let schema_buffer = process_start_schema();
    let record_buffer = record_for(1)
        .extended_item(1, &related.to_bytes())
        .user_data(&process_start_user_data())
        .build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();

    let options = EventSerializerOptions {
        include_extended_data: true,
        ..Default::default()
    };
    let json = serde_json::to_value(EventSerializer::new(&record, &schema, options)).unwrap();

    assert_eq!(
        json["Schema"],
        json!({
            "Provider": "Microsoft-Windows-Kernel-Process",
            "Event": "ProcessStart",
            "Opcode": "Start",
            "Task": "ProcessStart",
        })
    );
    assert_eq!(json["Header"]["ProcessId"], 4242);
    assert_eq!(json["Header"]["ThreadId"], 4243);
    assert_eq!(json["Header"]["ProviderId"], KERNEL_PROCESS_PROVIDER);
    assert_eq!(json["Header"]["Descriptor"]["Id"], 1);
    assert_eq!(json["Header"]["Descriptor"]["Level"], 4);

    assert_eq!(
        json["Extended"],
        json!([{ "Type": 1, "Data": "6990501B-4484-4EF0-8793-84159B8D4728" }])
    );

    assert_eq!(
        json["Event"],
        json!({
            "ProcessID": 4242,
            "ImageName": "notepad.exe",
            "Flags": [1, 2],
            "Elevated": true,
            // the user data ends before it
            "ExitCode": null,
        })
    );
}

#[test]
fn serialize_options() {
    let schema_buffer = process_start_schema();
    let record_buffer = record_for(1)
        .user_data(&process_start_user_data())
        .build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();

    let options = EventSerializerOptions {
        include_schema: false,
        include_header: false,
        include_extended_data: false,
        fail_unimplemented: false,
    };
    let json = serde_json::to_value(EventSerializer::new(&record, &schema, options)).unwrap();
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["Event"]);
}

#[test]
fn serialize_unsupported_types() {
    let schema_buffer = schema_for(2)
        .property(PropertyDefinition::scalar(
            "Known",
            TdhInType::InTypeUInt16,
            TdhOutType::OutTypeNull,
        ))
        .property(PropertyDefinition::raw_scalar("Mystery", 999, 0))
        .build();
    let record_buffer = record_for(2)
        .user_data(&UserData::new().u16(7).u32(0).build())
        .build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();

    // skipped by default
    let json = serde_json::to_value(EventSerializer::new(&record, &schema, Default::default()))
        .unwrap();
    assert_eq!(json["Event"], json!({ "Known": 7 }));

    let options = EventSerializerOptions {
        fail_unimplemented: true,
        ..Default::default()
    };
    assert!(serde_json::to_value(EventSerializer::new(&record, &schema, options)).is_err());
}

#[test]
fn serialize_structs() {
    let schema_buffer = schema_for(3)
        .property(PropertyDefinition::structure("Image", 1, 2))
        .property(PropertyDefinition::scalar(
            "Base",
            TdhInType::InTypeUInt64,
            TdhOutType::OutTypeHexInt64,
        ))
        .property(PropertyDefinition::scalar(
            "Name",
            TdhInType::InTypeAnsiString,
            TdhOutType::OutTypeString,
        ))
        .top_level_property_count(1)
        .build();
    let record_buffer = record_for(3)
        .user_data(&UserData::new().u64(0x1000).raw(b"ntdll.dll\0").build())
        .build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();

    let json = serde_json::to_value(EventSerializer::new(&record, &schema, Default::default()))
        .unwrap();
    assert_eq!(
        json["Event"],
        json!({ "Image": { "Base": 4096, "Name": "ntdll.dll" } })
    );
}
