//! End-to-end codec coverage against a schema exercising every field
//! shape: scalars, packed and plain repeated fields, nested messages,
//! groups, enums, extensions, and type aliases.

use bytes::Bytes;
use protolith::descriptor::{
    EnumDecl, FieldDecl, Label, MessageDecl, MessageId, MessageKind, Parent, ScalarType, TypeAlias,
};
use protolith::{
    deserialize, deserialize_into, serialize, DecodeError, EncodeError, Record, Registry, Value,
};

struct Zoo {
    registry: Registry,
    outer: MessageId,
    inner: MessageId,
    gadget: MessageId,
    host: MessageId,
}

fn zoo() -> Zoo {
    let mut builder = Registry::builder();
    let file = builder.add_schema("zoo.proto", "zoo", "proto2");

    builder.add_enum(
        Parent::Schema(file),
        EnumDecl::new("Color")
            .value("RED", 0)
            .value("GREEN", 1)
            .value("BLUE", 2),
    );

    let inner = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("Inner")
            .field(FieldDecl::scalar("id", 1, Label::Required, ScalarType::Int32))
            .field(FieldDecl::scalar(
                "label",
                2,
                Label::Optional,
                ScalarType::String,
            )),
    );

    let gadget = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("Gadget")
            .kind(MessageKind::Group)
            .field(FieldDecl::scalar(
                "serial",
                1,
                Label::Optional,
                ScalarType::Uint32,
            )),
    );

    let outer = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("Outer")
            .field(FieldDecl::scalar("a", 1, Label::Optional, ScalarType::Int32))
            .field(FieldDecl::scalar("b", 2, Label::Optional, ScalarType::Sint32))
            .field(FieldDecl::scalar("c", 3, Label::Optional, ScalarType::Fixed32))
            .field(FieldDecl::scalar("d", 4, Label::Optional, ScalarType::Double))
            .field(FieldDecl::scalar(
                "name",
                5,
                Label::Optional,
                ScalarType::String,
            ))
            .field(FieldDecl::scalar("blob", 6, Label::Optional, ScalarType::Bytes))
            .field(FieldDecl::scalar("flag", 7, Label::Optional, ScalarType::Bool))
            .field(
                FieldDecl::scalar("packed_u", 8, Label::Repeated, ScalarType::Uint32).packed(),
            )
            .field(FieldDecl::scalar(
                "plain_u",
                9,
                Label::Repeated,
                ScalarType::Uint32,
            ))
            .field(FieldDecl::named("inner", 10, Label::Optional, "Inner"))
            .field(FieldDecl::named("inners", 11, Label::Repeated, "Inner"))
            .field(FieldDecl::named("color", 12, Label::Optional, "Color"))
            .field(FieldDecl::group("gadget", 13, Label::Optional, "Gadget"))
            .field(
                FieldDecl::scalar("packed_s", 14, Label::Repeated, ScalarType::Sfixed64).packed(),
            ),
    );

    let host = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("Host")
            .field(FieldDecl::scalar("base", 1, Label::Optional, ScalarType::Int32))
            .extension_range(100, 199),
    );
    builder.add_extension(
        "zoo.Host",
        FieldDecl::scalar("note", 100, Label::Optional, ScalarType::String),
    );
    builder.add_extension(
        "zoo.Host",
        FieldDecl::scalar("tags", 101, Label::Repeated, ScalarType::Uint32),
    );

    let registry = builder.build().unwrap();
    Zoo {
        registry,
        outer,
        inner,
        gadget,
        host,
    }
}

fn sample_inner(zoo: &Zoo, id: i32, label: &str) -> Record {
    let mut inner = Record::new(&zoo.registry, zoo.inner);
    inner.set(&zoo.registry, 1, id).unwrap();
    inner.set(&zoo.registry, 2, label).unwrap();
    inner
}

#[test]
fn every_field_shape_round_trips() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut gadget = Record::new(registry, zoo.gadget);
    gadget.set(registry, 1, 777u32).unwrap();

    let mut record = Record::new(registry, zoo.outer);
    record.set(registry, 1, -42i32).unwrap();
    record.set(registry, 2, -42i32).unwrap();
    record.set(registry, 3, 0xFEED_FACEu32).unwrap();
    record.set(registry, 4, 6.5f64).unwrap();
    record.set(registry, 5, "outer").unwrap();
    record
        .set(registry, 6, Bytes::from_static(b"\x00\x01\xFF"))
        .unwrap();
    record.set(registry, 7, true).unwrap();
    for v in [0u32, 1, 127, 128, 300_000] {
        record.push(registry, 8, v).unwrap();
    }
    for v in [9u32, 10] {
        record.push(registry, 9, v).unwrap();
    }
    record.set(registry, 10, sample_inner(&zoo, 1, "one")).unwrap();
    record.push(registry, 11, sample_inner(&zoo, 2, "two")).unwrap();
    record
        .push(registry, 11, sample_inner(&zoo, 3, "three"))
        .unwrap();
    record
        .set(registry, 12, Value::Enum("GREEN".to_owned()))
        .unwrap();
    record.set(registry, 13, gadget).unwrap();
    for v in [i64::MIN, -1, 0, i64::MAX] {
        record.push(registry, 14, v).unwrap();
    }

    let bytes = serialize(registry, &record).unwrap();
    let decoded = deserialize(registry, zoo.outer, &bytes).unwrap();
    assert_eq!(decoded, record);

    // Fields were emitted in ascending order with no unknowns, so the
    // second serialization is byte-identical.
    assert_eq!(serialize(registry, &decoded).unwrap(), bytes);
}

#[test]
fn explicit_false_bool_is_present_on_the_wire() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut record = Record::new(registry, zoo.outer);
    record.set(registry, 7, false).unwrap();

    let bytes = serialize(registry, &record).unwrap();
    // tag (7 << 3) | VARINT, value 0
    assert_eq!(bytes, &[0x38, 0x00]);

    let decoded = deserialize(registry, zoo.outer, &bytes).unwrap();
    assert!(decoded.has(registry, 7));
    assert_eq!(decoded.get(registry, 7), Some(Value::Bool(false)));
}

#[test]
fn packed_and_unpacked_decode_to_equal_records() {
    let zoo = zoo();
    let registry = &zoo.registry;

    // Both buffers carry field 8 = [3, 270].
    // Packed: one LEN tag for field 8 with the concatenated varints.
    let packed: &[u8] = &[0x42, 0x03, 0x03, 0x8E, 0x02];
    // Unpacked: one VARINT tag per element.
    let unpacked: &[u8] = &[0x40, 0x03, 0x40, 0x8E, 0x02];

    let from_packed = deserialize(registry, zoo.outer, packed).unwrap();
    let from_unpacked = deserialize(registry, zoo.outer, unpacked).unwrap();
    assert_eq!(from_packed, from_unpacked);
    assert_eq!(
        from_packed.get_repeated(registry, 8),
        Some(&[Value::U32(3), Value::U32(270)][..])
    );
}

#[test]
fn packed_fixed_width_payload_must_divide_evenly() {
    let zoo = zoo();
    // Field 14 is sfixed64: a 9-byte packed payload is torn.
    let mut bytes = vec![0x72, 0x09];
    bytes.extend_from_slice(&[0u8; 9]);
    assert!(matches!(
        deserialize(&zoo.registry, zoo.outer, &bytes),
        Err(DecodeError::InvalidPackedLength { element_size: 8, .. })
    ));
}

#[test]
fn group_round_trips_byte_for_byte() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut gadget = Record::new(registry, zoo.gadget);
    gadget.set(registry, 1, 41u32).unwrap();
    let mut record = Record::new(registry, zoo.outer);
    record.set(registry, 13, gadget).unwrap();

    let bytes = serialize(registry, &record).unwrap();
    // START_GROUP(13), serial = 41, END_GROUP(13)
    assert_eq!(bytes, &[0x6B, 0x08, 0x29, 0x6C]);

    let decoded = deserialize(registry, zoo.outer, &bytes).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(serialize(registry, &decoded).unwrap(), bytes);
}

#[test]
fn group_missing_its_end_tag_fails() {
    let zoo = zoo();
    // START_GROUP(13), serial = 41, then the buffer just ends.
    let bytes: &[u8] = &[0x6B, 0x08, 0x29];
    assert_eq!(
        deserialize(&zoo.registry, zoo.outer, bytes),
        Err(DecodeError::GroupMismatch {
            started: 13,
            ended: 0
        })
    );
}

#[test]
fn missing_required_field_fails_both_directions() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let empty_inner = Record::new(registry, zoo.inner);
    let mut record = Record::new(registry, zoo.outer);
    record.set(registry, 10, empty_inner).unwrap();
    assert!(matches!(
        serialize(registry, &record),
        Err(EncodeError::MissingRequired { .. })
    ));

    // An Inner payload carrying only the optional label.
    let bytes: &[u8] = &[0x52, 0x05, 0x12, 0x03, b'a', b'b', b'c'];
    assert!(matches!(
        deserialize(registry, zoo.outer, bytes),
        Err(DecodeError::MissingRequired { .. })
    ));
}

#[test]
fn truncated_submessage_fails_deterministically() {
    let zoo = zoo();
    // Field 10 declares 5 payload bytes but only 2 remain.
    let bytes: &[u8] = &[0x52, 0x05, 0x08, 0x01];
    for _ in 0..3 {
        assert!(matches!(
            deserialize(&zoo.registry, zoo.outer, bytes),
            Err(DecodeError::TruncatedSubmessage {
                declared: 5,
                available: 2
            })
        ));
    }
}

#[test]
fn wire_type_mismatch_is_rejected() {
    let zoo = zoo();
    // Field 1 is int32 (varint) but arrives as FIXED32.
    let bytes: &[u8] = &[0x0D, 1, 2, 3, 4];
    assert!(matches!(
        deserialize(&zoo.registry, zoo.outer, bytes),
        Err(DecodeError::WireTypeMismatch { field_number: 1, .. })
    ));
}

#[test]
fn enum_symbols_map_to_wire_indices() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut record = Record::new(registry, zoo.outer);
    record
        .set(registry, 12, Value::Enum("BLUE".to_owned()))
        .unwrap();
    let bytes = serialize(registry, &record).unwrap();
    assert_eq!(bytes, &[0x60, 0x02]);

    let decoded = deserialize(registry, zoo.outer, &bytes).unwrap();
    assert_eq!(decoded.get(registry, 12), Some(Value::Enum("BLUE".to_owned())));
}

#[test]
fn unknown_enum_symbol_fails_serialization() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut record = Record::new(registry, zoo.outer);
    record
        .set(registry, 12, Value::Enum("CHARTREUSE".to_owned()))
        .unwrap();
    assert!(matches!(
        serialize(registry, &record),
        Err(EncodeError::UnknownEnumValue { .. })
    ));
}

#[test]
fn unknown_enum_wire_index_is_retained_not_assigned() {
    let zoo = zoo();
    let registry = &zoo.registry;

    // color = 99, which no Color value declares
    let bytes: &[u8] = &[0x60, 0x63];
    let record = deserialize(registry, zoo.outer, bytes).unwrap();
    assert!(!record.has(registry, 12));
    assert_eq!(record.unknown_fields().len(), 1);

    // The raw bytes ride along on re-serialization.
    assert_eq!(serialize(registry, &record).unwrap(), bytes);
}

#[test]
fn open_enum_coerces_unknown_symbols_to_zero() {
    let mut builder = Registry::builder();
    let file = builder.add_schema("open.proto", "", "proto2");
    builder.add_enum(
        Parent::Schema(file),
        EnumDecl::new("Level").value("NONE", 0).value("HIGH", 3).open(),
    );
    let id = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("M").field(FieldDecl::named("level", 1, Label::Optional, "Level")),
    );
    let registry = builder.build().unwrap();

    let mut record = Record::new(&registry, id);
    record
        .set(&registry, 1, Value::Enum("FUTURE".to_owned()))
        .unwrap();
    assert_eq!(serialize(&registry, &record).unwrap(), &[0x08, 0x00]);
}

#[test]
fn aliased_enum_shares_the_target_values() {
    let mut builder = Registry::builder();
    let file = builder.add_schema("mirror.proto", "", "proto2");
    builder.add_enum(
        Parent::Schema(file),
        EnumDecl::new("Base").value("OFF", 0).value("ON", 1),
    );
    builder.add_enum(Parent::Schema(file), EnumDecl::new("Switch").alias_for("Base"));
    let id = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("M").field(FieldDecl::named("sw", 1, Label::Optional, "Switch")),
    );
    let registry = builder.build().unwrap();

    let mut record = Record::new(&registry, id);
    record.set(&registry, 1, Value::Enum("ON".to_owned())).unwrap();
    let bytes = serialize(&registry, &record).unwrap();
    assert_eq!(bytes, &[0x08, 0x01]);
    assert_eq!(deserialize(&registry, id, &bytes).unwrap(), record);
}

#[test]
fn extensions_round_trip_and_interleave_in_order() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut record = Record::new(registry, zoo.host);
    record.set(registry, 1, 5i32).unwrap();
    record.set_extension(registry, 100, "margin").unwrap();
    record.push_extension(registry, 101, 8u32).unwrap();
    record.push_extension(registry, 101, 9u32).unwrap();

    let bytes = serialize(registry, &record).unwrap();
    let decoded = deserialize(registry, zoo.host, &bytes).unwrap();
    assert_eq!(decoded, record);
    assert_eq!(
        decoded.get_extension(registry, 100).unwrap(),
        Some(Value::String("margin".to_owned()))
    );
    assert_eq!(serialize(registry, &decoded).unwrap(), bytes);

    // The base field (1) precedes both extensions on the wire.
    assert_eq!(bytes[0], 0x08);
}

#[test]
fn symbol_alias_round_trips() {
    let mut builder = Registry::builder();
    let file = builder.add_schema("sym.proto", "", "proto2");
    builder.add_type_alias(TypeAlias::symbol());
    let id = builder.add_message(
        Parent::Schema(file),
        MessageDecl::new("M").field(FieldDecl::named("name", 1, Label::Optional, "symbol")),
    );
    let registry = builder.build().unwrap();

    let mut record = Record::new(&registry, id);
    record.set(&registry, 1, "geometry:circle").unwrap();
    let bytes = serialize(&registry, &record).unwrap();
    assert_eq!(deserialize(&registry, id, &bytes).unwrap(), record);

    let mut empty = Record::new(&registry, id);
    empty.set(&registry, 1, "").unwrap();
    assert!(matches!(
        serialize(&registry, &empty),
        Err(EncodeError::AliasFailed { .. })
    ));
}

#[test]
fn deserialize_into_merges_with_last_one_wins() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let mut record = Record::new(registry, zoo.outer);
    // a = 1, plain_u = [7]
    deserialize_into(registry, zoo.outer, &[0x08, 0x01, 0x48, 0x07], &mut record).unwrap();
    // a = 2, plain_u = [8]
    deserialize_into(registry, zoo.outer, &[0x08, 0x02, 0x48, 0x08], &mut record).unwrap();

    assert_eq!(record.get(registry, 1), Some(Value::I32(2)));
    assert_eq!(
        record.get_repeated(registry, 9),
        Some(&[Value::U32(7), Value::U32(8)][..])
    );
}

#[test]
fn duplicate_singular_field_takes_the_last_value() {
    let zoo = zoo();
    let registry = &zoo.registry;

    let bytes: &[u8] = &[0x08, 0x01, 0x08, 0x63];
    let record = deserialize(registry, zoo.outer, bytes).unwrap();
    assert_eq!(record.get(registry, 1), Some(Value::I32(99)));
}
