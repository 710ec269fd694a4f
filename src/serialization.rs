//! Export of a loaded graph to a plain serde tree, for JSON and YAML tooling.

use crate::metadata::{ProgramMetadata, TypeMetadata};
use crate::value::{Atom, DataObject, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Key holding an object's class name in its exported map.
pub const TYPE_KEY: &str = "$type";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    String(String),
    Integer(i64),
    Unsigned(u64),
    Number(f64),
    Boolean(bool),
    Null,
    Array(Vec<ExportValue>),
    Object(BTreeMap<String, ExportValue>),
}

impl ExportValue {
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Converts an object into an [`ExportValue`] map keyed by property name.
///
/// Values are reached through each property's accessor. Enum values export as their
/// member name when one matches.
#[must_use]
pub fn to_value(obj: &DataObject, program: &ProgramMetadata) -> ExportValue {
    let mut map = BTreeMap::new();
    let Some(class) = program.try_class(obj.class()) else {
        return ExportValue::Object(map);
    };
    map.insert(
        TYPE_KEY.to_string(),
        ExportValue::String(class.full_name().to_string()),
    );
    for prop in class.all_properties() {
        let value = prop
            .get(obj)
            .map_or(ExportValue::Null, |v| export(v, Some(prop.ty()), program));
        map.insert(prop.name().to_string(), value);
    }
    ExportValue::Object(map)
}

fn export(value: &Value, ty: Option<&TypeMetadata>, program: &ProgramMetadata) -> ExportValue {
    let item_type = match ty {
        Some(TypeMetadata::Collection(coll)) => Some(coll.item()),
        _ => None,
    };
    match value {
        Value::Null => ExportValue::Null,
        Value::Atom(atom) => export_atom(atom, ty, program),
        Value::Object(obj) => to_value(obj, program),
        Value::List(items) => {
            ExportValue::Array(items.iter().map(|v| export(v, item_type, program)).collect())
        }
        Value::AtomSet(items) => ExportValue::Array(
            items
                .iter()
                .map(|a| export_atom(a, item_type, program))
                .collect(),
        ),
        Value::ObjectSet(items) => {
            ExportValue::Array(items.iter().map(|o| to_value(o, program)).collect())
        }
        Value::Map(entries) => {
            let key_type = match ty {
                Some(TypeMetadata::Collection(coll)) => coll.key(),
                _ => None,
            };
            let map = entries
                .iter()
                .map(|(k, v)| {
                    let key = match export_atom(k, key_type, program) {
                        ExportValue::String(s) => s,
                        _ => k.to_literal(),
                    };
                    (key, export(v, item_type, program))
                })
                .collect();
            ExportValue::Object(map)
        }
    }
}

fn export_atom(atom: &Atom, ty: Option<&TypeMetadata>, program: &ProgramMetadata) -> ExportValue {
    if let Some(TypeMetadata::Enum { id, .. }) = ty {
        if let Some(member) = program
            .try_enum_type(*id)
            .and_then(|e| e.member_by_value(atom))
        {
            return ExportValue::String(member.name.clone());
        }
    }
    match atom {
        Atom::String(s) | Atom::IgnoreCaseString(s) => ExportValue::String(s.clone()),
        Atom::Int64(n) => ExportValue::Integer(*n),
        Atom::Int32(n) => ExportValue::Integer(i64::from(*n)),
        Atom::Int16(n) => ExportValue::Integer(i64::from(*n)),
        Atom::SByte(n) => ExportValue::Integer(i64::from(*n)),
        Atom::UInt64(n) => ExportValue::Unsigned(*n),
        Atom::UInt32(n) => ExportValue::Unsigned(u64::from(*n)),
        Atom::UInt16(n) => ExportValue::Unsigned(u64::from(*n)),
        Atom::Byte(n) => ExportValue::Unsigned(u64::from(*n)),
        Atom::Double(v) => ExportValue::Number(*v),
        Atom::Single(v) => ExportValue::Number(f64::from(*v)),
        Atom::Boolean(b) => ExportValue::Boolean(*b),
        // the remaining kinds export as their canonical literal text
        other => {
            let literal = other.to_literal();
            let text = literal
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .map_or_else(|| literal.clone(), str::to_string);
            ExportValue::String(text)
        }
    }
}
