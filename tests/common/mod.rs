// Shared metadata and documents for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeDelta};
use rust_decimal::Decimal;
use sdata_core::{
    Atom, ClassId, DataObject, EnumId, FullName, ProgramMetadata, TypeKind, TypeMetadata, Value,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub const CATALOG_URI: &str = "urn:example:catalog";
pub const PRODUCT_ID: u128 = 0x5f0e_2b1c_8a4d_4c3e_9f60_7a1b_2c3d_4e5f;
pub const CATALOG_ID: u128 = 0x7c9e_6679_7425_40de_944b_e07f_c1f9_0ae7;
pub const PEOPLE_URI: &str = "urn:example:people";

pub struct Fixture {
    pub program: Arc<ProgramMetadata>,
    pub entity: ClassId,
    pub product: ClassId,
    pub catalog: ClassId,
    pub person: ClassId,
    pub specimen: ClassId,
    pub category: EnumId,
}

fn atom(kind: TypeKind) -> TypeMetadata {
    TypeMetadata::atom(kind, false)
}

fn nullable(kind: TypeKind) -> TypeMetadata {
    TypeMetadata::atom(kind, true)
}

pub fn fixture() -> Fixture {
    let mut b = ProgramMetadata::builder();
    let entity = b.declare_class(FullName::new(CATALOG_URI, "Entity"));
    let product = b.declare_class(FullName::new(CATALOG_URI, "Product"));
    let catalog = b.declare_class(FullName::new(CATALOG_URI, "Catalog"));
    let specimen = b.declare_class(FullName::new(CATALOG_URI, "Specimen"));
    let person = b.declare_class(FullName::new(PEOPLE_URI, "Person"));
    let category = b.declare_enum(FullName::new(CATALOG_URI, "Category"), TypeKind::Int32);

    b.enumeration(category)
        .add_member("Tools", Atom::Int32(1))
        .add_member("Garden", Atom::Int32(2))
        .add_member("Kitchen", Atom::Int32(3));

    b.class(entity)
        .set_abstract(true)
        .track_span()
        .property("Id", atom(TypeKind::Guid));

    b.class(product)
        .extends(entity)
        .property("Name", atom(TypeKind::String))
        .property("Price", atom(TypeKind::Decimal))
        .property("Weight", atom(TypeKind::Double))
        .property("Category", TypeMetadata::enumeration(category, false))
        .property("Tags", TypeMetadata::atom_set(atom(TypeKind::String), false))
        .property("Sku", nullable(TypeKind::IgnoreCaseString))
        .property(
            "Stock",
            TypeMetadata::map(atom(TypeKind::String), atom(TypeKind::Int32), false),
        )
        .property("Image", nullable(TypeKind::Binary));

    b.class(catalog)
        .extends(entity)
        .property("Title", atom(TypeKind::String))
        .property("Published", atom(TypeKind::DateTimeOffset))
        .property("Ttl", atom(TypeKind::TimeSpan))
        .property(
            "Products",
            TypeMetadata::object_set(TypeMetadata::object(product, false), false),
        )
        .property("Featured", TypeMetadata::object(product, true))
        .property("Owner", TypeMetadata::object(person, true))
        .property("Editor", TypeMetadata::object(person, true))
        .property("Notes", TypeMetadata::list(nullable(TypeKind::String), true));

    b.class(person)
        .property("Name", atom(TypeKind::String))
        .property("Manager", TypeMetadata::object(person, true));

    b.class(specimen)
        .property("Text", atom(TypeKind::String))
        .property("Folded", atom(TypeKind::IgnoreCaseString))
        .property("Amount", atom(TypeKind::Decimal))
        .property("I64", atom(TypeKind::Int64))
        .property("I32", atom(TypeKind::Int32))
        .property("I16", atom(TypeKind::Int16))
        .property("I8", atom(TypeKind::SByte))
        .property("U64", atom(TypeKind::UInt64))
        .property("U32", atom(TypeKind::UInt32))
        .property("U16", atom(TypeKind::UInt16))
        .property("U8", atom(TypeKind::Byte))
        .property("F64", atom(TypeKind::Double))
        .property("F32", atom(TypeKind::Single))
        .property("Flag", atom(TypeKind::Boolean))
        .property("Blob", atom(TypeKind::Binary))
        .property("Key", atom(TypeKind::Guid))
        .property("Span", atom(TypeKind::TimeSpan))
        .property("At", atom(TypeKind::DateTimeOffset));

    Fixture {
        program: b.build().expect("fixture metadata is valid"),
        entity,
        product,
        catalog,
        person,
        specimen,
        category,
    }
}

pub fn fixture_path(subdir: &str, filename: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(subdir)
        .join(filename)
}

pub fn read_fixture(subdir: &str, filename: &str) -> String {
    let path = fixture_path(subdir, filename);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read fixture: {path:?}"))
}

const PRODUCT_FIELDS: [(&str, &str); 9] = [
    ("Id", r#""7c9e6679-7425-40de-944b-e07fc1f90ae7""#),
    ("Name", r#""Hammer""#),
    ("Price", "12.50"),
    ("Weight", "0.75"),
    ("Category", "$a0:Category.Tools"),
    ("Tags", r#"["steel"]"#),
    ("Sku", r#""HAM-001""#),
    ("Stock", r#"#["north" = 4]"#),
    ("Image", "null"),
];

/// A product document. Each override replaces a field's text, or omits the field
/// when its value is `None`.
pub fn product_doc(overrides: &[(&str, Option<&str>)]) -> String {
    let mut body = String::new();
    for (name, default) in PRODUCT_FIELDS {
        let value = match overrides.iter().find(|(n, _)| *n == name) {
            Some((_, Some(v))) => *v,
            Some((_, None)) => continue,
            None => default,
        };
        body.push_str(&format!("    {name} = {value}\n"));
    }
    format!("a0:Product <a0 = \"{CATALOG_URI}\"> {{\n{body}}}\n")
}

pub fn new_object(fixture: &Fixture, class: ClassId) -> DataObject {
    fixture
        .program
        .class(class)
        .create_instance()
        .expect("class is concrete")
}

pub fn person(fixture: &Fixture, name: &str, manager: Option<DataObject>) -> DataObject {
    new_object(fixture, fixture.person)
        .with("Name", name)
        .with("Manager", manager)
}

pub fn product(fixture: &Fixture, name: &str, price: &str) -> DataObject {
    let price: Decimal = price.parse().expect("valid decimal");
    new_object(fixture, fixture.product)
        .with("Id", Atom::Guid(Uuid::from_u128(PRODUCT_ID)))
        .with("Name", name)
        .with("Price", Atom::Decimal(price))
        .with("Weight", 1.25)
        .with("Category", 3)
        .with(
            "Tags",
            Value::AtomSet(
                ["new", "sale"]
                    .into_iter()
                    .map(|t| Atom::String(t.to_string()))
                    .collect(),
            ),
        )
        .with("Sku", Atom::IgnoreCaseString(format!("SKU-{name}")))
        .with(
            "Stock",
            Value::Map(
                [("north", 3), ("south", -1)]
                    .into_iter()
                    .map(|(k, v)| (Atom::String(k.to_string()), Value::from(v)))
                    .collect(),
            ),
        )
        .with("Image", Atom::Binary(vec![0x89, 0x50, 0x4e, 0x47]))
}

pub fn catalog(fixture: &Fixture) -> DataObject {
    let boss = person(fixture, "Grace", None);
    new_object(fixture, fixture.catalog)
        .with("Id", Atom::Guid(Uuid::from_u128(CATALOG_ID)))
        .with("Title", "Spring \"Sale\"\n2024")
        .with(
            "Published",
            Atom::DateTimeOffset(
                DateTime::parse_from_rfc3339("2024-03-01T09:30:00.25+01:00").expect("valid"),
            ),
        )
        .with(
            "Ttl",
            Atom::TimeSpan(TimeDelta::days(7) + TimeDelta::milliseconds(1500)),
        )
        .with(
            "Products",
            Value::ObjectSet(vec![
                product(fixture, "Hammer", "12.50"),
                product(fixture, "Rake", "-0.99"),
            ]),
        )
        .with("Featured", product(fixture, "Kettle", "30"))
        .with("Owner", person(fixture, "Ada", Some(boss)))
        .with("Editor", Value::Null)
        .with(
            "Notes",
            Value::List(vec![Value::from("first"), Value::Null, Value::from("")]),
        )
}

pub fn specimen(fixture: &Fixture, f64_value: f64, f32_value: f32) -> DataObject {
    new_object(fixture, fixture.specimen)
        .with("Text", "\u{2028}tab\tquote\"")
        .with("Folded", Atom::IgnoreCaseString("MiXeD".to_string()))
        .with("Amount", Atom::Decimal("-79228162514264337593543950335".parse().expect("valid")))
        .with("I64", Atom::Int64(i64::MIN))
        .with("I32", Atom::Int32(-7))
        .with("I16", Atom::Int16(i16::MAX))
        .with("I8", Atom::SByte(-128))
        .with("U64", Atom::UInt64(u64::MAX))
        .with("U32", Atom::UInt32(0))
        .with("U16", Atom::UInt16(65535))
        .with("U8", Atom::Byte(255))
        .with("F64", Atom::Double(f64_value))
        .with("F32", Atom::Single(f32_value))
        .with("Flag", true)
        .with("Blob", Atom::Binary(Vec::new()))
        .with("Key", Atom::Guid(Uuid::nil()))
        .with("Span", Atom::TimeSpan(-TimeDelta::nanoseconds(1)))
        .with(
            "At",
            Atom::DateTimeOffset(
                DateTime::parse_from_rfc3339("1999-12-31T23:59:59.123456789-05:30").expect("valid"),
            ),
        )
}

/// A class handle issued by a larger, unrelated program.
pub fn foreign_class() -> ClassId {
    let mut b = ProgramMetadata::builder();
    let ids: Vec<ClassId> = (0..16)
        .map(|i| b.declare_class(FullName::new("urn:example:other", format!("C{i}"))))
        .collect();
    ids[15]
}
