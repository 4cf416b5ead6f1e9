//! Integration tests for required fields, duplicate access, enums, groups and packing.

use tagwire::{
    Config, EnumDescriptor, EnumMarshaller, Error, FieldDescriptor, MessageDescriptor, MessageMarshaller,
    Params, ReadContext, Registry, Result, UnknownFieldSet, WireType, WriteContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Green,
    Blue,
}

struct ColorMarshaller;

impl EnumMarshaller for ColorMarshaller {
    type Target = Color;

    fn type_name(&self) -> &str {
        "demo.Color"
    }

    fn decode(&self, number: i32) -> Option<Color> {
        match number {
            0 => Some(Color::Red),
            1 => Some(Color::Green),
            2 => Some(Color::Blue),
            _ => None,
        }
    }

    fn encode(&self, value: &Color) -> i32 {
        match value {
            Color::Red => 0,
            Color::Green => 1,
            Color::Blue => 2,
        }
    }
}

/// `demo.Person`: 1 name (required), 2 email, 3 favorite (enum), 4 palette
/// (repeated enum), 5 scores (repeated int32), 6 address (group).
#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    name: Option<String>,
    email: Option<String>,
    favorite: Option<Color>,
    palette: Vec<Color>,
    scores: Vec<i32>,
    address: Option<Address>,
    unknown: UnknownFieldSet,
}

struct PersonMarshaller;

impl MessageMarshaller for PersonMarshaller {
    type Target = Person;

    fn type_name(&self) -> &str {
        "demo.Person"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Person> {
        Ok(Person {
            name: ctx.read(1)?,
            email: ctx.read(2)?,
            favorite: ctx.read_enum(3)?,
            palette: ctx.read_repeated_enums(4)?,
            scores: ctx.read_repeated(5)?,
            address: ctx.read_group(6)?,
            unknown: ctx.take_unknown_fields()?,
        })
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &Person) -> Result<()> {
        ctx.write_opt(1, value.name.as_ref())?;
        ctx.write_opt(2, value.email.as_ref())?;
        ctx.write_enum_opt(3, value.favorite.as_ref())?;
        ctx.write_repeated_enums(4, &value.palette)?;
        ctx.write_packed(5, &value.scores)?;
        if let Some(address) = &value.address {
            ctx.write_group(6, address)?;
        }
        ctx.write_unknown_fields(&value.unknown);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Address {
    city: String,
    zip: u32,
}

struct AddressMarshaller;

impl MessageMarshaller for AddressMarshaller {
    type Target = Address;

    fn type_name(&self) -> &str {
        "demo.Person.Address"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Address> {
        Ok(Address {
            city: ctx.read(1)?.unwrap_or_default(),
            zip: ctx.read(2)?.unwrap_or_default(),
        })
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &Address) -> Result<()> {
        ctx.write(1, &value.city)?;
        ctx.write(2, &value.zip)
    }
}

/// Reads only the email, leaving the required name to the unknown set.
struct EmailOnly;

impl MessageMarshaller for EmailOnly {
    type Target = String;

    fn type_name(&self) -> &str {
        "demo.Person"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<String> {
        Ok(ctx.read(2)?.unwrap_or_default())
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &String) -> Result<()> {
        ctx.write(2, value)
    }
}

/// Misbehaving marshaller that reads and writes field 2 twice.
struct Twice;

impl MessageMarshaller for Twice {
    type Target = u32;

    fn type_name(&self) -> &str {
        "demo.Twice"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<u32> {
        let first: Option<u32> = ctx.read(2)?;
        let second: Option<u32> = ctx.read(2)?;
        Ok(first.or(second).unwrap_or_default())
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &u32) -> Result<()> {
        ctx.write(2, value)?;
        ctx.write(2, value)
    }
}

/// Misbehaving marshaller that touches an undeclared field.
struct Undeclared;

impl MessageMarshaller for Undeclared {
    type Target = u64;

    fn type_name(&self) -> &str {
        "demo.Undeclared"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<u64> {
        Ok(ctx.read(9)?.unwrap_or_default())
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &u64) -> Result<()> {
        ctx.write(9, value)
    }
}

/// Keeps every field as unknown and writes it back untouched.
struct Passthrough;

impl MessageMarshaller for Passthrough {
    type Target = UnknownFieldSet;

    fn type_name(&self) -> &str {
        "demo.Passthrough"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<UnknownFieldSet> {
        ctx.take_unknown_fields()
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &UnknownFieldSet) -> Result<()> {
        ctx.write_unknown_fields(value);
        Ok(())
    }
}

/// Accesses a required, non-repeated field through the repeated calls.
struct Counters;

impl MessageMarshaller for Counters {
    type Target = Vec<i32>;

    fn type_name(&self) -> &str {
        "demo.Counters"
    }

    fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Vec<i32>> {
        ctx.read_repeated(1)
    }

    fn write(&self, ctx: &mut WriteContext<'_>, value: &Vec<i32>) -> Result<()> {
        ctx.write_packed(1, value)
    }
}

fn person_descriptor() -> MessageDescriptor {
    MessageDescriptor::builder("demo.Person")
        .field(FieldDescriptor::new(1, "name", WireType::LengthDelimited).required())
        .field(FieldDescriptor::new(2, "email", WireType::LengthDelimited))
        .field(FieldDescriptor::new(3, "favorite", WireType::Varint))
        .field(FieldDescriptor::new(4, "palette", WireType::Varint).repeated())
        .field(FieldDescriptor::new(5, "scores", WireType::Varint).repeated())
        .field(FieldDescriptor::new(6, "address", WireType::StartGroup))
        .build()
        .unwrap()
}

fn registry() -> Registry {
    registry_with(Config::default())
}

fn registry_with(config: Config) -> Registry {
    let registry = Registry::new(config);
    registry.register_message_descriptor(person_descriptor());
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Person.Address")
            .field(FieldDescriptor::new(1, "city", WireType::LengthDelimited))
            .field(FieldDescriptor::new(2, "zip", WireType::Varint))
            .build()
            .unwrap(),
    );
    registry.register_enum_descriptor(
        EnumDescriptor::builder("demo.Color")
            .value(0, "RED")
            .value(1, "GREEN")
            .value(2, "BLUE")
            .build()
            .unwrap(),
    );
    registry.register_message_marshaller(PersonMarshaller).unwrap();
    registry.register_message_marshaller(AddressMarshaller).unwrap();
    registry.register_enum_marshaller(ColorMarshaller).unwrap();
    registry
}

fn alice() -> Person {
    Person {
        name: Some("alice".to_owned()),
        email: Some("alice@example.com".to_owned()),
        favorite: Some(Color::Blue),
        palette: vec![Color::Red, Color::Green],
        scores: vec![1, -2, 300],
        address: Some(Address {
            city: "Springfield".to_owned(),
            zip: 12345,
        }),
        unknown: UnknownFieldSet::new(),
    }
}

#[test]
fn test_roundtrip() {
    let registry = registry();
    let person = alice();
    let bytes = registry.to_bytes(&person).unwrap();
    assert_eq!(registry.compute_size(&person).unwrap(), bytes.len() as u64);
    assert_eq!(registry.from_slice::<Person>(&bytes).unwrap(), person);
}

#[test]
fn test_required_field_missing_on_read() {
    let registry = registry();
    // Only the email.
    let data = [0x12, 0x01, b'x'];
    let err = registry.from_slice::<Person>(&data).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldMissing { field: 1, .. }));
    assert!(err.is_schema_violation());
}

#[test]
fn test_required_field_null_on_write() {
    let registry = registry();
    let person = Person {
        name: None,
        ..alice()
    };
    let err = registry.to_bytes(&person).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldNull { field: 1, .. }));
}

#[test]
fn test_required_field_satisfied_by_unknown() {
    let registry = Registry::default();
    registry.register_message_descriptor(person_descriptor());
    registry.register_message_marshaller(EmailOnly).unwrap();

    // {1: "n", 2: "e"}
    let data = [0x0A, 0x01, b'n', 0x12, 0x01, b'e'];
    assert_eq!(registry.from_slice::<String>(&data).unwrap(), "e");

    let missing = [0x12, 0x01, b'e'];
    let err = registry.from_slice::<String>(&missing).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldMissing { field: 1, .. }));

    let err = registry.to_bytes(&"e".to_owned()).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldNull { field: 1, .. }));
}

#[test]
fn test_required_field_kept_as_unknown() {
    let registry = Registry::default();
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Passthrough")
            .field(FieldDescriptor::new(1, "id", WireType::Varint).required())
            .build()
            .unwrap(),
    );
    registry.register_message_marshaller(Passthrough).unwrap();

    let data = [0x08, 0x01, 0x12, 0x01, b'z'];
    let kept = registry.from_slice::<UnknownFieldSet>(&data).unwrap();
    assert_eq!(kept.field_numbers(), [1, 2]);
    assert_eq!(registry.to_bytes(&kept).unwrap(), data);

    let err = registry.from_slice::<UnknownFieldSet>(&[0x12, 0x01, b'z']).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldMissing { field: 1, .. }));
}

#[test]
fn test_required_field_through_repeated_calls() {
    let registry = Registry::default();
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Counters")
            .field(FieldDescriptor::new(1, "count", WireType::Varint).required())
            .build()
            .unwrap(),
    );
    registry.register_message_marshaller(Counters).unwrap();

    let err = registry.to_bytes(&Vec::<i32>::new()).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldNull { field: 1, .. }));
    let err = registry.from_slice::<Vec<i32>>(&[]).unwrap_err();
    assert!(matches!(err, Error::RequiredFieldMissing { field: 1, .. }));

    let bytes = registry.to_bytes(&vec![3, 4]).unwrap();
    assert_eq!(bytes, [0x0A, 0x02, 0x03, 0x04]);
    assert_eq!(registry.from_slice::<Vec<i32>>(&bytes).unwrap(), [3, 4]);
}

#[test]
fn test_duplicate_and_undeclared_access() {
    let registry = Registry::default();
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Twice")
            .field(FieldDescriptor::new(2, "value", WireType::Varint))
            .build()
            .unwrap(),
    );
    registry.register_message_descriptor(
        MessageDescriptor::builder("demo.Undeclared").build().unwrap(),
    );
    registry.register_message_marshaller(Twice).unwrap();
    registry.register_message_marshaller(Undeclared).unwrap();

    let err = registry.to_bytes(&5u32).unwrap_err();
    assert!(matches!(err, Error::DuplicateField { field: 2, .. }));
    let err = registry.from_slice::<u32>(&[0x10, 0x05]).unwrap_err();
    assert!(matches!(err, Error::DuplicateField { field: 2, .. }));

    let err = registry.to_bytes(&5u64).unwrap_err();
    assert!(matches!(err, Error::UnknownField { field: 9, .. }));
    let err = registry.from_slice::<u64>(&[]).unwrap_err();
    assert!(matches!(err, Error::UnknownField { field: 9, .. }));
}

#[test]
fn test_undefined_enum_values_are_preserved() {
    let registry = registry();
    let data = [
        0x0A, 0x01, b'n', // 1: "n"
        0x18, 0x07, // 3: 7
        0x22, 0x03, 0x00, 0x09, 0x01, // 4: packed [0, 9, 1]
        0x20, 0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, // 4: -2
    ];
    let person: Person = registry.from_slice(&data).unwrap();
    assert_eq!(person.favorite, None);
    assert_eq!(person.palette, [Color::Red, Color::Green]);
    assert_eq!(person.unknown.field_numbers(), [3, 4]);

    let reread: Person = registry
        .from_slice(&registry.to_bytes(&person).unwrap())
        .unwrap();
    assert_eq!(reread, person);
}

#[test]
fn test_undefined_enum_value_is_not_written() {
    struct Loose;

    impl EnumMarshaller for Loose {
        type Target = Color;

        fn type_name(&self) -> &str {
            "demo.Color"
        }

        fn decode(&self, number: i32) -> Option<Color> {
            ColorMarshaller.decode(number)
        }

        fn encode(&self, _value: &Color) -> i32 {
            42
        }
    }

    let registry = registry();
    registry.register_enum_marshaller(Loose).unwrap();
    let err = registry.to_bytes(&alice()).unwrap_err();
    assert!(matches!(err, Error::UndefinedEnumValue { number: 42, .. }));
}

#[test]
fn test_packed_and_unpacked_mix() {
    let registry = registry();
    let data = [
        0x0A, 0x01, b'n', // 1: "n"
        0x28, 0x01, // 5: 1
        0x2A, 0x02, 0x02, 0x03, // 5: packed [2, 3]
        0x28, 0x04, // 5: 4
    ];
    let person: Person = registry.from_slice(&data).unwrap();
    assert_eq!(person.scores, [1, 2, 3, 4]);

    let bytes = registry.to_bytes(&person).unwrap();
    assert_eq!(bytes, [0x0A, 0x01, b'n', 0x2A, 0x04, 0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn test_group_encoding() {
    let registry = registry();
    let person = Person {
        name: Some("n".to_owned()),
        address: Some(Address {
            city: "x".to_owned(),
            zip: 5,
        }),
        ..Person::default()
    };
    let bytes = registry.to_bytes(&person).unwrap();
    assert_eq!(
        bytes,
        [0x0A, 0x01, b'n', 0x33, 0x0A, 0x01, b'x', 0x10, 0x05, 0x34]
    );
    assert_eq!(registry.from_slice::<Person>(&bytes).unwrap(), person);
}

#[test]
fn test_group_before_scanned_fields() {
    let registry = registry();
    // The group comes first and gets captured while looking for field 1.
    let data = [0x33, 0x10, 0x05, 0x34, 0x0A, 0x01, b'n'];
    let person: Person = registry.from_slice(&data).unwrap();
    assert_eq!(person.name.as_deref(), Some("n"));
    assert_eq!(
        person.address,
        Some(Address {
            city: String::new(),
            zip: 5
        })
    );
}

#[test]
fn test_unterminated_group() {
    let registry = registry();
    let data = [0x0A, 0x01, b'n', 0x33, 0x10, 0x05];
    let err = registry.from_slice::<Person>(&data).unwrap_err();
    assert!(matches!(err, Error::TagMismatch { expected: 0x34, .. }));
}

#[test]
fn test_params_reach_nested_marshallers() {
    struct Scaled;

    impl MessageMarshaller for Scaled {
        type Target = Address;

        fn type_name(&self) -> &str {
            "demo.Person.Address"
        }

        fn read(&self, ctx: &mut ReadContext<'_>) -> Result<Address> {
            let scale = ctx.param::<u32>("scale").copied().unwrap_or(1);
            Ok(Address {
                city: ctx.read(1)?.unwrap_or_default(),
                zip: ctx.read::<u32>(2)?.unwrap_or_default() * scale,
            })
        }

        fn write(&self, ctx: &mut WriteContext<'_>, value: &Address) -> Result<()> {
            AddressMarshaller.write(ctx, value)
        }
    }

    let registry = registry();
    registry.register_message_marshaller(Scaled).unwrap();
    let bytes = registry.to_bytes(&alice()).unwrap();

    let mut params = Params::new();
    params.set("scale", 10u32);
    let mut decoder = tagwire::decoder::ArrayDecoder::new(&bytes);
    let person: Person = registry.read_from(&mut decoder, Some(&params)).unwrap();
    assert_eq!(person.address.map(|address| address.zip), Some(123450));
}

#[test]
fn test_nesting_depth_limit() {
    let mut config = Config::new();
    config.max_nesting_depth(1);
    let registry = registry_with(config);

    // One level of nesting is allowed.
    let data = [0x0A, 0x01, b'n', 0x33, 0x10, 0x05, 0x34];
    assert!(registry.from_slice::<Person>(&data).is_ok());

    // A group nested inside the captured address exceeds it while skipping.
    let data = [0x0A, 0x01, b'n', 0x33, 0x1B, 0x1C, 0x34];
    let err = registry.from_slice::<Person>(&data).unwrap_err();
    assert!(matches!(err, Error::NestingTooDeep { limit: 1 }));
}
