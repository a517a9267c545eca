//! Decodes complete record and schema buffers, the way a consumer of captured events does

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ferrisetw_decode::builder::PropertyDefinition;
use ferrisetw_decode::native::etw_types::extended_data::NO_RELATED_ACTIVITY_ID;
use ferrisetw_decode::native::etw_types::{
    EVENT_HEADER_FLAG_32_BIT_HEADER, EVENT_HEADER_FLAG_PROCESSOR_INDEX,
};
use ferrisetw_decode::native::tdh_types::{TdhInType, TdhOutType};
use ferrisetw_decode::native::time::{FileTime, SystemTime};
use ferrisetw_decode::parser::{FieldValue, Parser, ParserError, Pointer};
use ferrisetw_decode::property::PropertyError;
use ferrisetw_decode::provider_names::ProviderNameMap;
use ferrisetw_decode::schema::SchemaError;
use ferrisetw_decode::{EventRecord, Guid, Schema, SchemaLocator};

mod utils;
use utils::{init_logger, record_for, schema_for, utf16, utf16z, UserData};

fn scalar(name: &str, in_type: TdhInType) -> PropertyDefinition {
    PropertyDefinition::scalar(name, in_type, TdhOutType::OutTypeNull)
}

#[test]
fn count_array_and_guid() {
    init_logger();

    let id: Guid = "6990501B-4484-4EF0-8793-84159B8D4728".parse().unwrap();
    let schema_buffer = schema_for(1)
        .property(scalar("count", TdhInType::InTypeUInt32))
        .property(scalar("values", TdhInType::InTypeUInt32).with_count_from(0))
        .property(scalar("id", TdhInType::InTypeGuid))
        .build();
    let user_data = UserData::new().u32(3).u32(1).u32(2).u32(3).guid(id).build();
    let record_buffer = record_for(1).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    assert_eq!(parser.project(0).unwrap(), FieldValue::UInt32(3));
    assert_eq!(
        parser.project(1).unwrap(),
        FieldValue::Array(vec![
            FieldValue::UInt32(1),
            FieldValue::UInt32(2),
            FieldValue::UInt32(3)
        ])
    );
    assert_eq!(parser.project(2).unwrap(), FieldValue::Guid(id));

    let count: u32 = parser.try_parse("count").unwrap();
    let values: Vec<u32> = parser.try_parse("values").unwrap();
    let guid: Guid = parser.try_parse("id").unwrap();
    assert_eq!(count, 3);
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(guid, id);

    let fields = parser.project_all();
    let names: Vec<String> = fields.iter().map(|f| f.name.to_string_lossy()).collect();
    assert_eq!(names, vec!["count", "values", "id"]);
    assert_eq!(fields[2].raw, &id.to_bytes()[..]);

    // the count of the array follows the value of property 0
    let shorter = UserData::new().u32(1).u32(7).guid(id).build();
    let record_buffer = record_for(1).user_data(&shorter).build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let parser = Parser::create(&record, &schema);
    assert_eq!(
        parser.project(1).unwrap(),
        FieldValue::Array(vec![FieldValue::UInt32(7)])
    );
    assert_eq!(parser.project(2).unwrap(), FieldValue::Guid(id));
}

#[test]
fn indirect_string_length() {
    let schema_buffer = schema_for(2)
        .property(scalar("Length", TdhInType::InTypeUInt16))
        .property(scalar("Text", TdhInType::InTypeUnicodeString).with_length_from(0))
        .property(scalar("Trailer", TdhInType::InTypeUInt8))
        .build();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();

    for text in ["abc", "ab", "abcdefgh"] {
        let user_data = UserData::new()
            .u16(text.len() as u16)
            .raw(&utf16(text))
            .u8(9)
            .build();
        let record_buffer = record_for(2).user_data(&user_data).build();
        let record = EventRecord::from_bytes(&record_buffer).unwrap();
        let parser = Parser::create(&record, &schema);

        let decoded: String = parser.try_parse("Text").unwrap();
        let trailer: u8 = parser.try_parse("Trailer").unwrap();
        assert_eq!(decoded, text);
        assert_eq!(trailer, 9);
    }
}

#[test]
fn struct_arrays() {
    let schema_buffer = schema_for(3)
        .property(scalar("Count", TdhInType::InTypeUInt16))
        .property(PropertyDefinition::structure("Entries", 2, 3).with_count_from(0))
        .property(scalar("Pid", TdhInType::InTypeUInt32))
        .property(scalar("Len", TdhInType::InTypeUInt16))
        .property(
            PropertyDefinition::scalar("Payload", TdhInType::InTypeBinary, TdhOutType::OutTypeHexBinary)
                .with_length_from(3),
        )
        .top_level_property_count(2)
        .build();
    let user_data = UserData::new()
        .u16(2)
        .u32(10)
        .u16(1)
        .u8(0xaa)
        .u32(20)
        .u16(3)
        .raw(&[1, 2, 3])
        .build();
    let record_buffer = record_for(3).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    let entries = match parser.project(1).unwrap() {
        FieldValue::Array(entries) => entries,
        other => panic!("unexpected value {:?}", other),
    };
    assert_eq!(entries.len(), 2);

    let expected: [(u32, &[u8]); 2] = [(10, &[0xaa][..]), (20, &[1, 2, 3][..])];
    for (entry, (pid, payload)) in entries.iter().zip(expected) {
        let members = match entry {
            FieldValue::Struct(members) => members,
            other => panic!("unexpected value {:?}", other),
        };
        let names: Vec<String> = members.iter().map(|m| m.name.to_string_lossy()).collect();
        assert_eq!(names, vec!["Pid", "Len", "Payload"]);
        assert_eq!(members[0].value, Ok(FieldValue::UInt32(pid)));
        assert_eq!(members[2].value, Ok(FieldValue::Binary(payload)));
    }

    // struct members are only decoded as part of their struct
    assert_eq!(parser.project(2), Err(ParserError::NotTopLevel { index: 2 }));
    assert!(matches!(
        parser.project(5),
        Err(ParserError::SchemaError(SchemaError::IndexOutOfRange { index: 5, .. }))
    ));
    assert_eq!(parser.try_parse::<u32>("Pid"), Err(ParserError::NotFound));
}

#[test]
fn large_struct_arrays() {
    let schema_buffer = schema_for(3)
        .property(scalar("Count", TdhInType::InTypeUInt16))
        .property(PropertyDefinition::structure("Entries", 2, 1).with_count_from(0))
        .property(scalar("B", TdhInType::InTypeUInt8))
        .top_level_property_count(2)
        .build();
    let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let user_data = UserData::new().u16(1000).raw(&bytes).build();
    let record_buffer = record_for(3).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    let entries = match parser.project(1).unwrap() {
        FieldValue::Array(entries) => entries,
        other => panic!("unexpected value {:?}", other),
    };
    assert_eq!(entries.len(), 1000);
    for (entry, byte) in entries.iter().zip(&bytes) {
        match entry {
            FieldValue::Struct(members) => {
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].value, Ok(FieldValue::UInt8(*byte)));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }
}

#[test]
fn time_properties() {
    let schema_buffer = schema_for(9)
        .property(scalar("Created", TdhInType::InTypeFileTime))
        .property(scalar("Logged", TdhInType::InTypeSystemTime))
        .build();
    let quad: i64 = 0x01D9_5690_1234_5678;
    let system_time: Vec<u8> = [2023u16, 3, 2, 14, 15, 9, 26, 535]
        .into_iter()
        .flat_map(u16::to_le_bytes)
        .collect();
    let user_data = UserData::new()
        .u64(quad as u64)
        .raw(&system_time)
        .build();
    let record_buffer = record_for(9).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    let created: FileTime = parser.try_parse("Created").unwrap();
    assert_eq!(created, FileTime::from_quad(quad));

    let logged: SystemTime = parser.try_parse("Logged").unwrap();
    assert_eq!((logged.year, logged.month, logged.day), (2023, 3, 14));
    // 2023-03-14T15:09:26.535Z
    assert_eq!(logged.as_unix_timestamp(), Some(1_678_806_566_535));

    assert_eq!(
        parser.try_parse::<u64>("Created"),
        Err(ParserError::InvalidType)
    );
    assert_eq!(
        parser.try_parse::<FileTime>("Logged"),
        Err(ParserError::InvalidType)
    );
}

#[test]
fn truncated_user_data() {
    init_logger();

    let schema_buffer = schema_for(4)
        .property(scalar("A", TdhInType::InTypeUInt32))
        .property(scalar("B", TdhInType::InTypeUInt32))
        .property(scalar("C", TdhInType::InTypeUnicodeString))
        .build();
    let user_data = UserData::new().u32(1).u16(2).build();
    let record_buffer = record_for(4).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    assert_eq!(parser.project(0).unwrap(), FieldValue::UInt32(1));
    assert_eq!(parser.project(1).unwrap(), FieldValue::Absent);
    assert_eq!(parser.project(2).unwrap(), FieldValue::Absent);
    assert_eq!(parser.try_parse::<u32>("B"), Err(ParserError::Absent));

    let values: Vec<_> = parser.project_all().into_iter().map(|f| f.value).collect();
    assert_eq!(
        values,
        vec![
            Ok(FieldValue::UInt32(1)),
            Ok(FieldValue::Absent),
            Ok(FieldValue::Absent)
        ]
    );
}

#[test]
fn user_data_outside_of_the_record() {
    init_logger();

    let schema_buffer = schema_for(4)
        .property(scalar("A", TdhInType::InTypeUInt32))
        .build();
    let mut record_buffer = record_for(4).user_data(&[1, 0, 0, 0]).build();
    // drop the last byte of the user data
    record_buffer.pop();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    assert!(record.user_buffer().is_empty());
    assert_eq!(
        Parser::create(&record, &schema).project(0).unwrap(),
        FieldValue::Absent
    );
}

#[test]
fn unsupported_types_only_affect_their_property() {
    let schema_buffer = schema_for(5)
        .property(scalar("Before", TdhInType::InTypeUInt32))
        .property(PropertyDefinition::raw_scalar("Mystery", 999, 0))
        .property(scalar("After", TdhInType::InTypeUInt32))
        .build();
    let user_data = UserData::new().u32(1).u32(2).u32(3).build();
    let record_buffer = record_for(5).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    let fields = parser.project_all();
    assert_eq!(fields[0].value, Ok(FieldValue::UInt32(1)));
    assert_eq!(
        fields[1].value,
        Err(ParserError::UnsupportedType {
            index: 1,
            in_type: 999
        })
    );
    // the size of "Mystery" is unknown, so is the position of "After"
    assert_eq!(fields[2].value, Ok(FieldValue::Absent));
    assert_eq!(parser.try_parse::<u32>("Before"), Ok(1));
}

#[test]
fn references_must_point_backwards() {
    let schema_buffer = schema_for(6)
        .property(scalar("Values", TdhInType::InTypeUInt8).with_count_from(1))
        .property(scalar("Count", TdhInType::InTypeUInt8))
        .build();
    let record_buffer = record_for(6).user_data(&[1, 2, 3]).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    assert_eq!(
        parser.project(0),
        Err(ParserError::PropertyError(
            PropertyError::UnresolvedReference {
                property: 0,
                referenced: 1
            }
        ))
    );
}

#[test]
fn pointer_size_depends_on_the_record() {
    let schema_buffer = schema_for(7)
        .property(scalar("Address", TdhInType::InTypePointer))
        .property(scalar("Tail", TdhInType::InTypeUInt32))
        .build();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let user_data = UserData::new().u32(0xdead_beef).u32(7).build();

    // no bitness flag: the native pointer size decides
    let record_buffer = record_for(7).user_data(&user_data).build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();

    let parser = Parser::with_native_pointer_size(&record, &schema, 4);
    assert_eq!(parser.pointer_size(), 4);
    assert_eq!(*parser.try_parse::<Pointer>("Address").unwrap(), 0xdead_beef);
    assert_eq!(parser.try_parse::<u32>("Tail"), Ok(7));

    let parser = Parser::with_native_pointer_size(&record, &schema, 8);
    assert_eq!(parser.project(0).unwrap(), FieldValue::Pointer(0x7_dead_beef));
    assert_eq!(parser.project(1).unwrap(), FieldValue::Absent);

    // the header flag wins over the native pointer size
    let record_buffer = record_for(7)
        .flags(EVENT_HEADER_FLAG_32_BIT_HEADER)
        .user_data(&user_data)
        .build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let parser = Parser::with_native_pointer_size(&record, &schema, 8);
    assert_eq!(format!("{:x}", parser.try_parse::<Pointer>("Address").unwrap()), "deadbeef");
    assert_eq!(parser.try_parse::<u32>("Tail"), Ok(7));
}

#[test]
fn ip_addresses() {
    let schema_buffer = schema_for(8)
        .property(PropertyDefinition::scalar(
            "LocalAddr",
            TdhInType::InTypeUInt32,
            TdhOutType::OutTypeIpv4,
        ))
        .property(PropertyDefinition::scalar(
            "RemoteAddr",
            TdhInType::InTypeBinary,
            TdhOutType::OutTypeIpv6,
        ))
        .property(PropertyDefinition::scalar(
            "Port",
            TdhInType::InTypeUInt16,
            TdhOutType::OutTypePort,
        ))
        .build();
    let user_data = UserData::new()
        .raw(&[192, 168, 1, 10])
        .raw(&Ipv6Addr::LOCALHOST.octets())
        .u16(443)
        .build();
    let record_buffer = record_for(8).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    assert_eq!(
        parser.try_parse::<IpAddr>("LocalAddr"),
        Ok(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)))
    );
    assert_eq!(
        parser.try_parse::<IpAddr>("RemoteAddr"),
        Ok(IpAddr::V6(Ipv6Addr::LOCALHOST))
    );
    assert_eq!(parser.try_parse::<u16>("Port"), Ok(443));
    assert_eq!(parser.try_parse::<IpAddr>("Port"), Err(ParserError::InvalidType));
    assert_eq!(parser.try_parse::<u16>("LocalAddr"), Err(ParserError::InvalidType));
    assert_eq!(parser.try_parse::<u16>("Nope"), Err(ParserError::NotFound));
    assert_eq!(
        parser.try_parse::<Vec<u8>>("Port"),
        Ok(443u16.to_le_bytes().to_vec())
    );
}

#[test]
fn strings_and_sids() {
    let schema_buffer = schema_for(9)
        .property(scalar("ImageName", TdhInType::InTypeUnicodeString))
        .property(scalar("Command", TdhInType::InTypeAnsiString))
        .property(scalar("UserSid", TdhInType::InTypeSid))
        .build();
    let sid = [1u8, 2, 0, 0, 0, 0, 0, 5, 32, 0, 0, 0, 0x20, 0x02, 0, 0];
    let user_data = UserData::new()
        .raw(&utf16z("C:\\Windows\\notepad.exe"))
        .raw(b"notepad.exe foo.txt\0")
        .raw(&sid)
        .build();
    let record_buffer = record_for(9).user_data(&user_data).build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    let parser = Parser::create(&record, &schema);

    let image: String = parser.try_parse("ImageName").unwrap();
    let command: String = parser.try_parse("Command").unwrap();
    let user: String = parser.try_parse("UserSid").unwrap();
    assert_eq!(image, "C:\\Windows\\notepad.exe");
    assert_eq!(command, "notepad.exe foo.txt");
    assert_eq!(user, "S-1-5-32-544");
}

#[test]
fn extended_data_items() {
    let related: Guid = "6990501B-4484-4EF0-8793-84159B8D4728".parse().unwrap();
    let sid = [1u8, 2, 0, 0, 0, 0, 0, 5, 32, 0, 0, 0, 0x20, 0x02, 0, 0];
    let record_buffer = record_for(10)
        .extended_item(1, &related.to_bytes())
        .extended_item(2, &sid)
        .extended_item(3, &7u32.to_le_bytes())
        .extended_item(10, &0x1234u64.to_le_bytes())
        .user_data(&[0; 4])
        .build();

    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let extended = record.extended_data();
    assert_eq!(extended.len(), 4);
    assert_eq!(extended.related_activity_id(), related);
    assert_eq!(extended.sid().unwrap().to_string(), "S-1-5-32-544");
    assert_eq!(extended.session_id(), Some(7));
    assert_eq!(extended.event_key(), Some(0x1234));
    assert_eq!(record.user_buffer(), &[0; 4]);

    // the SID claims two sub-authorities, the item only holds one
    let record_buffer = record_for(10).extended_item(2, &sid[..12]).build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    assert!(record.extended_data().sid().is_none());
    assert_eq!(
        record.extended_data().related_activity_id(),
        NO_RELATED_ACTIVITY_ID
    );
}

#[test]
fn processor_index() {
    let narrow = record_for(11).processor([7, 1]).build();
    let narrow = EventRecord::from_bytes(&narrow).unwrap();
    assert_eq!(narrow.processor_index(), 7);

    let wide = record_for(11)
        .processor([7, 1])
        .flags(EVENT_HEADER_FLAG_PROCESSOR_INDEX)
        .build();
    let wide = EventRecord::from_bytes(&wide).unwrap();
    assert_eq!(wide.processor_index(), 0x0107);
}

#[test]
fn locate_schemas_and_provider_names() {
    let locator = SchemaLocator::new();
    locator
        .insert(
            schema_for(12)
                .task_name("ProcessStart")
                .property(scalar("ProcessID", TdhInType::InTypeUInt32))
                .build(),
        )
        .unwrap();

    let record_buffer = record_for(12)
        .user_data(&UserData::new().u32(1234).build())
        .build();
    let record = EventRecord::from_bytes(&record_buffer).unwrap();
    let schema_buffer = locator.event_schema(&record).unwrap();
    let schema = Schema::from_bytes(&schema_buffer).unwrap();
    assert_eq!(schema.task_name(), "ProcessStart");
    assert_eq!(
        Parser::create(&record, &schema).try_parse::<u32>("ProcessID"),
        Ok(1234)
    );

    // the schema names no provider, the caller knows it
    let names = ProviderNameMap::new();
    assert_eq!(schema.resolve_provider_name(&names), None);
    names.insert(utils::provider_guid(), "Microsoft-Windows-Kernel-Process");
    assert_eq!(
        schema.resolve_provider_name(&names).as_deref(),
        Some("Microsoft-Windows-Kernel-Process")
    );
}

#[test]
fn decode_from_many_threads() {
    let schema_buffer = schema_for(13)
        .property(scalar("Count", TdhInType::InTypeUInt32))
        .property(scalar("Name", TdhInType::InTypeUnicodeString))
        .build();
    let user_data = UserData::new().u32(5).raw(&utf16z("shared")).build();
    let record_buffer = record_for(13).user_data(&user_data).build();

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let record = EventRecord::from_bytes(&record_buffer).unwrap();
                let schema = Schema::from_bytes(&schema_buffer).unwrap();
                let parser = Parser::create(&record, &schema);
                for _ in 0..100 {
                    assert_eq!(parser.try_parse::<u32>("Count"), Ok(5));
                    assert_eq!(parser.try_parse::<String>("Name").unwrap(), "shared");
                }
            });
        }
    });
}
