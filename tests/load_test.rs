// Loading well-formed documents through the public API.
mod common;

use common::{fixture, fixture_path, read_fixture, CATALOG_URI};
use rust_decimal::Decimal;
use sdata_core::{load, load_file, Atom, DataObject, SdataError, Value};
use std::io::Write;
use tempfile::NamedTempFile;

fn load_catalog() -> (common::Fixture, DataObject) {
    let fx = fixture();
    let text = read_fixture("ok", "catalog.sds");
    let obj = load("catalog.sds", &text, &fx.program, fx.catalog)
        .unwrap_or_else(|e| panic!("catalog.sds should load: {:?}", e.diagnostics()));
    (fx, obj)
}

fn atom<'a>(obj: &'a DataObject, name: &str) -> &'a Atom {
    obj.field(name)
        .and_then(Value::as_atom)
        .unwrap_or_else(|| panic!("'{name}' should hold an atom"))
}

#[test]
fn test_catalog_root_fields() {
    let (fx, catalog) = load_catalog();
    assert_eq!(catalog.class(), fx.catalog);
    assert_eq!(atom(&catalog, "Title"), &Atom::String("Spring".to_string()));
    assert_eq!(
        atom(&catalog, "Ttl").to_literal(),
        "\"7.00:00:00\"",
        "TimeSpan should keep its day component"
    );
    assert_eq!(
        atom(&catalog, "Published").to_literal(),
        "\"2024-03-01T09:30:00+01:00\""
    );
    assert!(catalog.field("Featured").is_some_and(Value::is_null));
}

#[test]
fn test_catalog_products() {
    let (fx, catalog) = load_catalog();
    let Some(Value::ObjectSet(products)) = catalog.field("Products") else {
        panic!("Products should be an object set");
    };
    assert_eq!(products.len(), 2);

    let hammer = &products[0];
    assert_eq!(hammer.class(), fx.product);
    assert_eq!(
        atom(hammer, "Price"),
        &Atom::Decimal(Decimal::new(1250, 2))
    );
    assert_eq!(atom(hammer, "Weight"), &Atom::Double(0.75));
    assert_eq!(atom(hammer, "Category"), &Atom::Int32(1));
    assert_eq!(
        atom(hammer, "Sku"),
        &Atom::IgnoreCaseString("ham-001".to_string()),
        "IgnoreCaseString compares without case"
    );
    let Some(Value::AtomSet(tags)) = hammer.field("Tags") else {
        panic!("Tags should be an atom set");
    };
    assert_eq!(tags.len(), 2);
    assert!(tags.contains(&Atom::String("hand tool".to_string())));
    let Some(Value::Map(stock)) = hammer.field("Stock") else {
        panic!("Stock should be a map");
    };
    assert_eq!(
        stock.get(&Atom::String("south".to_string())),
        Some(&Value::Atom(Atom::Int32(0)))
    );

    let can = &products[1];
    assert_eq!(
        atom(can, "Name"),
        &Atom::String("Watering \"Can\"".to_string())
    );
    assert_eq!(atom(can, "Price"), &Atom::Decimal(Decimal::from(8)));
    assert_eq!(atom(can, "Weight"), &Atom::Double(0.1));
    assert_eq!(atom(can, "Category"), &Atom::Int32(2));
    assert_eq!(atom(can, "Image"), &Atom::Binary(vec![0, 1, 2]));
    assert!(can.field("Sku").is_some_and(Value::is_null));
}

#[test]
fn test_object_in_second_namespace() {
    let (fx, catalog) = load_catalog();
    let owner = catalog
        .field("Owner")
        .and_then(Value::as_object)
        .expect("Owner should be an object");
    assert_eq!(owner.class(), fx.person);
    assert_eq!(atom(owner, "Name"), &Atom::String("Ada".to_string()));
    assert_eq!(
        catalog.field("Notes").and_then(Value::as_list),
        Some(&[Value::from("first"), Value::Null][..])
    );
}

#[test]
fn test_spans_are_tracked_for_entities_only() {
    let (_, catalog) = load_catalog();
    let span = catalog.span().expect("Catalog derives from a span-tracking root");
    assert_eq!(span.file.as_deref(), Some("catalog.sds"));
    assert_eq!(span.start.line, 2, "the head follows a comment line");
    assert_eq!(span.end.line, 36);

    let Some(Value::ObjectSet(products)) = catalog.field("Products") else {
        panic!("Products should be an object set");
    };
    assert_eq!(products[0].span().map(|s| s.start.line), Some(8));

    let owner = catalog.field("Owner").and_then(Value::as_object).unwrap();
    assert!(owner.span().is_none(), "Person does not track spans");
}

#[test]
fn test_nested_alias_visible_to_descendants() {
    let fx = fixture();
    let text = read_fixture("ok", "nested_aliases.sds");
    let catalog = load("nested_aliases.sds", &text, &fx.program, fx.catalog)
        .unwrap_or_else(|e| panic!("nested_aliases.sds should load: {:?}", e.diagnostics()));
    let manager = catalog
        .field("Owner")
        .and_then(Value::as_object)
        .and_then(|owner| owner.field("Manager"))
        .and_then(Value::as_object)
        .expect("the inner Person should resolve its outer alias");
    assert_eq!(atom(manager, "Name"), &Atom::String("Grace".to_string()));
}

#[test]
fn test_derived_class_through_base_declaration() {
    let fx = fixture();
    let text = common::product_doc(&[]);
    let obj = load("product.sds", &text, &fx.program, fx.entity).unwrap();
    assert_eq!(obj.class(), fx.product);
}

#[test]
fn test_load_file() {
    let fx = fixture();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(common::product_doc(&[]).as_bytes()).unwrap();

    let obj = load_file(file.path(), &fx.program, fx.product).unwrap();
    assert_eq!(atom(&obj, "Name"), &Atom::String("Hammer".to_string()));
    let span = obj.span().unwrap();
    assert_eq!(
        span.file.as_deref(),
        Some(file.path().display().to_string().as_str())
    );
}

#[test]
fn test_load_file_reports_missing_file() {
    let fx = fixture();
    let path = fixture_path("ok", "does_not_exist.sds");
    let result = load_file(&path, &fx.program, fx.product);
    assert!(matches!(result, Err(SdataError::Io { .. })));
}

#[test]
fn test_load_file_reports_invalid_document() {
    let fx = fixture();
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "a0:Product <a0 = \"{CATALOG_URI}\"> {{ }}").unwrap();

    match load_file(file.path(), &fx.program, fx.product) {
        Err(SdataError::Load(err)) => assert_eq!(err.error_count(), 9),
        other => panic!("expected a load error, got {other:?}"),
    }
}
