//! The save path: reflects over an object graph and writes canonical text.

use crate::error::SaveError;
use crate::metadata::{
    ClassId, ClassRef, CollectionType, ProgramMetadata, TypeKind, TypeMetadata,
};
use crate::options::SaveOptions;
use crate::utils::{is_keyword, push_string_literal};
use crate::value::{Atom, DataObject, Value};
use indexmap::IndexMap;

/// A text buffer that indents each line lazily, on its first non-empty write.
#[derive(Debug)]
pub struct IndentedWriter<'o> {
    buf: String,
    options: &'o SaveOptions,
    level: usize,
    at_line_start: bool,
}

impl<'o> IndentedWriter<'o> {
    pub fn new(options: &'o SaveOptions) -> Self {
        Self {
            buf: String::new(),
            options,
            level: 0,
            at_line_start: true,
        }
    }

    pub fn push(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if self.at_line_start {
            for _ in 0..self.level {
                self.buf.push_str(&self.options.indent);
            }
            self.at_line_start = false;
        }
        self.buf.push_str(s);
    }

    pub fn newline(&mut self) {
        self.buf.push_str(&self.options.newline);
        self.at_line_start = true;
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Byte position of the next write.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn insert(&mut self, position: usize, s: &str) {
        self.buf.insert_str(position, s);
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// Namespace URI to short alias, allocated `a0`, `a1`, ... in first-use order.
#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    aliases: IndexMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias_for(&mut self, uri: &str) -> &str {
        let next = self.aliases.len();
        self.aliases.entry(uri.to_string()).or_insert_with(|| {
            let alias = format!("a{next}");
            log::trace!("alias {alias} allocated for {uri}");
            alias
        })
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// `(alias, uri)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(uri, alias)| (alias.as_str(), uri.as_str()))
    }

    /// ` <a0 = "uri0" a1 = "uri1">`
    fn block(&self) -> String {
        let mut out = String::from(" <");
        for (i, (alias, uri)) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(alias);
            out.push_str(" = ");
            push_string_literal(&mut out, uri);
        }
        out.push('>');
        out
    }
}

/// Writes one document.
///
/// The alias block is only complete once the whole body has been written, so the
/// document is buffered and the block is inserted after the root head at the end.
pub struct Serializer<'p, 'o> {
    program: &'p ProgramMetadata,
    out: IndentedWriter<'o>,
    aliases: AliasTable,
}

impl<'p, 'o> Serializer<'p, 'o> {
    pub fn new(program: &'p ProgramMetadata, options: &'o SaveOptions) -> Self {
        Self {
            program,
            out: IndentedWriter::new(options),
            aliases: AliasTable::new(),
        }
    }

    pub fn serialize(mut self, root: &DataObject, declared: ClassId) -> Result<String, SaveError> {
        let (block_position, class) = self.write_head(root, declared)?;
        self.write_body(root, class)?;
        let block = self.aliases.block();
        self.out.insert(block_position, &block);
        Ok(self.out.into_string())
    }

    /// Writes `alias:Name`, returning the position just after it and the object's class.
    fn write_head(
        &mut self,
        obj: &DataObject,
        declared: ClassId,
    ) -> Result<(usize, ClassRef<'p>), SaveError> {
        let program = self.program;
        let Some(class) = program.try_class(obj.class()) else {
            return Err(SaveError::TypeMismatch {
                context: "object".to_string(),
                expected: program.class_name(declared),
            });
        };
        if !class.is_equal_or_derives_from(declared) {
            return Err(SaveError::ClassNotDerived {
                class: class.full_name().to_string(),
                declared: program.class_name(declared),
            });
        }
        if class.is_abstract() {
            return Err(SaveError::AbstractClass {
                class: class.full_name().to_string(),
            });
        }

        let full_name = class.full_name();
        let alias = self.aliases.alias_for(&full_name.uri).to_string();
        self.out.push(&alias);
        self.out.push(":");
        self.push_name(&full_name.name);
        Ok((self.out.position(), class))
    }

    fn write_body(&mut self, obj: &DataObject, class: ClassRef<'p>) -> Result<(), SaveError> {
        self.out.push(" {");
        self.out.newline();
        self.out.indent();
        for prop in class.all_properties() {
            let context = format!("{}.{}", class.full_name(), prop.name());
            let value = match prop.get(obj) {
                Some(value) => value,
                None if prop.ty().is_nullable() => &Value::Null,
                None => {
                    return Err(SaveError::ValueMissing {
                        class: class.full_name().to_string(),
                        property: prop.name().to_string(),
                    })
                }
            };
            if value.is_null() && !prop.ty().is_nullable() {
                return Err(SaveError::NullNotAllowed {
                    class: class.full_name().to_string(),
                    property: prop.name().to_string(),
                });
            }
            self.push_name(prop.name());
            self.out.push(" = ");
            self.write_value(value, prop.ty(), &context)?;
            self.out.newline();
        }
        self.out.dedent();
        self.out.push("}");
        Ok(())
    }

    fn write_object(&mut self, obj: &DataObject, declared: ClassId) -> Result<(), SaveError> {
        let (_, class) = self.write_head(obj, declared)?;
        self.write_body(obj, class)
    }

    fn write_value(&mut self, value: &Value, ty: &TypeMetadata, context: &str) -> Result<(), SaveError> {
        let program = self.program;
        let mismatch = || SaveError::TypeMismatch {
            context: context.to_string(),
            expected: ty.display_name(program),
        };
        match (value, ty) {
            (Value::Null, _) if ty.is_nullable() => {
                self.out.push("null");
                Ok(())
            }
            (Value::Atom(atom), TypeMetadata::Atom(_) | TypeMetadata::Enum { .. }) => {
                self.write_atom(atom, ty).ok_or_else(mismatch)
            }
            (Value::Object(obj), TypeMetadata::Object { class, .. }) => {
                self.write_object(obj, *class)
            }
            (_, TypeMetadata::Collection(coll)) => {
                if !self.write_collection(value, coll, context)? {
                    return Err(mismatch());
                }
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    /// `None` when the atom's kind does not match `ty`.
    fn write_atom(&mut self, atom: &Atom, ty: &TypeMetadata) -> Option<()> {
        if atom.kind() != ty.kind() {
            return None;
        }
        if let TypeMetadata::Enum { id, .. } = ty {
            let member = self
                .program
                .try_enum_type(*id)
                .and_then(|e| Some((e, e.member_by_value(atom)?)));
            if let Some((enum_type, member)) = member {
                let full_name = enum_type.full_name();
                let alias = self.aliases.alias_for(&full_name.uri).to_string();
                self.out.push("$");
                self.out.push(&alias);
                self.out.push(":");
                self.push_name(&full_name.name);
                self.out.push(".");
                self.push_name(&member.name);
                return Some(());
            }
        }
        self.out.push(&atom.to_literal());
        Some(())
    }

    /// `Ok(false)` when `value` is not the collection shape `coll` describes.
    fn write_collection(
        &mut self,
        value: &Value,
        coll: &CollectionType,
        context: &str,
    ) -> Result<bool, SaveError> {
        let program = self.program;
        let item_type = coll.item();
        let len = match (coll.kind(), value) {
            (TypeKind::List, Value::List(items)) => items.len(),
            (TypeKind::AtomSet, Value::AtomSet(items)) => items.len(),
            (TypeKind::ObjectSet, Value::ObjectSet(items)) => items.len(),
            (TypeKind::Map, Value::Map(entries)) => entries.len(),
            _ => return Ok(false),
        };
        self.out
            .push(if coll.kind() == TypeKind::Map { "#[" } else { "[" });
        if len == 0 {
            self.out.push("]");
            return Ok(true);
        }
        self.out.newline();
        self.out.indent();

        match value {
            Value::List(items) => {
                for item in items {
                    self.write_value(item, item_type, context)?;
                    self.out.newline();
                }
            }
            Value::AtomSet(items) => {
                for item in items {
                    self.write_atom(item, item_type)
                        .ok_or_else(|| SaveError::TypeMismatch {
                            context: context.to_string(),
                            expected: item_type.display_name(program),
                        })?;
                    self.out.newline();
                }
            }
            Value::ObjectSet(items) => {
                let TypeMetadata::Object { class, .. } = item_type else {
                    return Ok(false);
                };
                for item in items {
                    self.write_object(item, *class)?;
                    self.out.newline();
                }
            }
            Value::Map(entries) => {
                let Some(key_type) = coll.key() else {
                    return Ok(false);
                };
                for (key, item) in entries {
                    self.write_atom(key, key_type)
                        .ok_or_else(|| SaveError::TypeMismatch {
                            context: context.to_string(),
                            expected: key_type.display_name(program),
                        })?;
                    self.out.push(" = ");
                    self.write_value(item, item_type, context)?;
                    self.out.newline();
                }
            }
            _ => return Ok(false),
        }

        self.out.dedent();
        self.out.push("]");
        Ok(true)
    }

    /// Keywords are written as verbatim identifiers so they read back as names.
    fn push_name(&mut self, name: &str) {
        if is_keyword(name) {
            self.out.push("@");
        }
        self.out.push(name);
    }
}
