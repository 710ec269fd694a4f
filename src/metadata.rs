//! Type metadata describing the shape of a program's data.
//!
//! Classes and enums live in an arena owned by [`ProgramMetadata`] and are
//! addressed by [`ClassId`] / [`EnumId`] handles, so cyclic and self-referencing
//! class graphs need no shared pointers. Everything is assembled through a
//! [`ProgramMetadataBuilder`] and is read-only once built.

use crate::diag::DiagContext;
use crate::error::MetadataError;
use crate::utils::is_identifier;
use crate::value::{Atom, DataObject, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Discriminates every type the format can describe.
///
/// The atomic kinds form one contiguous range, starting at [`TypeKind::String`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeKind {
    Object = 1,
    List,
    AtomSet,
    ObjectSet,
    Map,

    String = 50,
    IgnoreCaseString,
    Decimal,
    Int64,
    Int32,
    Int16,
    SByte,
    UInt64,
    UInt32,
    UInt16,
    Byte,
    Double,
    Single,
    Boolean,
    Binary,
    Guid,
    TimeSpan,
    DateTimeOffset,
}

const ATOM_KIND_COUNT: usize = 18;

impl TypeKind {
    pub const FIRST_ATOM: TypeKind = TypeKind::String;
    pub const LAST_ATOM: TypeKind = TypeKind::DateTimeOffset;

    pub const ATOMS: [TypeKind; ATOM_KIND_COUNT] = [
        TypeKind::String,
        TypeKind::IgnoreCaseString,
        TypeKind::Decimal,
        TypeKind::Int64,
        TypeKind::Int32,
        TypeKind::Int16,
        TypeKind::SByte,
        TypeKind::UInt64,
        TypeKind::UInt32,
        TypeKind::UInt16,
        TypeKind::Byte,
        TypeKind::Double,
        TypeKind::Single,
        TypeKind::Boolean,
        TypeKind::Binary,
        TypeKind::Guid,
        TypeKind::TimeSpan,
        TypeKind::DateTimeOffset,
    ];

    pub const fn is_atom(self) -> bool {
        self as u8 >= Self::FIRST_ATOM as u8 && self as u8 <= Self::LAST_ATOM as u8
    }

    pub const fn is_collection(self) -> bool {
        matches!(
            self,
            TypeKind::List | TypeKind::AtomSet | TypeKind::ObjectSet | TypeKind::Map
        )
    }

    const fn atom_index(self) -> usize {
        (self as u8 - Self::FIRST_ATOM as u8) as usize
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The interned description of one atomic kind, nullable or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomType {
    kind: TypeKind,
    nullable: bool,
    native_type: &'static str,
}

const fn native_type_name(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::String | TypeKind::IgnoreCaseString => "String",
        TypeKind::Decimal => "rust_decimal::Decimal",
        TypeKind::Int64 => "i64",
        TypeKind::Int32 => "i32",
        TypeKind::Int16 => "i16",
        TypeKind::SByte => "i8",
        TypeKind::UInt64 => "u64",
        TypeKind::UInt32 => "u32",
        TypeKind::UInt16 => "u16",
        TypeKind::Byte => "u8",
        TypeKind::Double => "f64",
        TypeKind::Single => "f32",
        TypeKind::Boolean => "bool",
        TypeKind::Binary => "Vec<u8>",
        TypeKind::Guid => "uuid::Uuid",
        TypeKind::TimeSpan => "chrono::TimeDelta",
        TypeKind::DateTimeOffset => "chrono::DateTime<FixedOffset>",
        _ => "",
    }
}

const fn build_atom_table() -> [AtomType; ATOM_KIND_COUNT * 2] {
    let placeholder = AtomType {
        kind: TypeKind::String,
        nullable: false,
        native_type: "",
    };
    let mut table = [placeholder; ATOM_KIND_COUNT * 2];
    let mut i = 0;
    while i < ATOM_KIND_COUNT {
        let kind = TypeKind::ATOMS[i];
        table[i * 2] = AtomType {
            kind,
            nullable: false,
            native_type: native_type_name(kind),
        };
        table[i * 2 + 1] = AtomType {
            kind,
            nullable: true,
            native_type: native_type_name(kind),
        };
        i += 1;
    }
    table
}

static ATOM_TYPES: [AtomType; ATOM_KIND_COUNT * 2] = build_atom_table();

impl AtomType {
    /// Looks up the shared instance for `(kind, nullable)`; `None` when `kind` is not atomic.
    pub fn get(kind: TypeKind, nullable: bool) -> Option<&'static AtomType> {
        if !kind.is_atom() {
            return None;
        }
        Some(&ATOM_TYPES[kind.atom_index() * 2 + usize::from(nullable)])
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The Rust type values of this kind are held as.
    pub fn native_type(&self) -> &'static str {
        self.native_type
    }
}

/// A namespace-qualified name, displayed in Clark notation: `{uri}Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FullName {
    pub uri: String,
    pub name: String,
}

impl FullName {
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.uri, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an enum type. Carries the enum's underlying atomic kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumId {
    index: u32,
    underlying: TypeKind,
}

impl EnumId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn underlying(self) -> TypeKind {
        self.underlying
    }
}

/// Either kind of named global type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalType {
    Class(ClassId),
    Enum(EnumId),
}

#[derive(Debug, Clone)]
pub struct EnumMember {
    pub name: String,
    pub value: Atom,
}

#[derive(Debug, Clone)]
pub struct EnumType {
    full_name: FullName,
    underlying: TypeKind,
    members: Vec<EnumMember>,
}

impl EnumType {
    pub fn full_name(&self) -> &FullName {
        &self.full_name
    }

    pub fn underlying(&self) -> TypeKind {
        self.underlying
    }

    pub fn members(&self) -> &[EnumMember] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The first member whose value equals `value`.
    pub fn member_by_value(&self, value: &Atom) -> Option<&EnumMember> {
        self.members.iter().find(|m| &m.value == value)
    }

    /// Adds a member. Builder use only: kinds and name uniqueness are checked at build.
    pub fn add_member(&mut self, name: impl Into<String>, value: Atom) -> &mut Self {
        self.members.push(EnumMember {
            name: name.into(),
            value,
        });
        self
    }
}

/// Reads and writes one property's value on a host instance.
pub trait PropertyAccessor: fmt::Debug + Send + Sync {
    fn get<'o>(&self, obj: &'o DataObject) -> Option<&'o Value>;
    fn set(&self, obj: &mut DataObject, value: Value);
}

/// Stores the value in the instance field named `storage_name`.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    storage_name: String,
}

impl FieldAccessor {
    pub fn new(storage_name: impl Into<String>) -> Self {
        Self {
            storage_name: storage_name.into(),
        }
    }
}

impl PropertyAccessor for FieldAccessor {
    fn get<'o>(&self, obj: &'o DataObject) -> Option<&'o Value> {
        obj.field(&self.storage_name)
    }

    fn set(&self, obj: &mut DataObject, value: Value) {
        obj.set_field(self.storage_name.clone(), value);
    }
}

#[derive(Debug, Clone)]
pub struct PropertyMetadata {
    name: String,
    ty: TypeMetadata,
    storage_name: String,
    accessor: Arc<dyn PropertyAccessor>,
}

impl PropertyMetadata {
    /// A property stored in the instance field of the same name.
    pub fn new(name: impl Into<String>, ty: TypeMetadata) -> Self {
        let name = name.into();
        Self {
            accessor: Arc::new(FieldAccessor::new(name.clone())),
            storage_name: name.clone(),
            name,
            ty,
        }
    }

    #[must_use]
    pub fn with_storage_name(mut self, storage_name: impl Into<String>) -> Self {
        self.storage_name = storage_name.into();
        self.accessor = Arc::new(FieldAccessor::new(self.storage_name.clone()));
        self
    }

    #[must_use]
    pub fn with_accessor(mut self, accessor: Arc<dyn PropertyAccessor>) -> Self {
        self.accessor = accessor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeMetadata {
        &self.ty
    }

    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub fn get<'o>(&self, obj: &'o DataObject) -> Option<&'o Value> {
        self.accessor.get(obj)
    }

    pub fn set(&self, obj: &mut DataObject, value: Value) {
        self.accessor.set(obj, value);
    }
}

type HookFn = dyn Fn(&mut DataObject, &mut DiagContext) -> bool + Send + Sync;

/// A callback run around population of an instance.
///
/// Returning `false` rejects the object. A hook that rejects without recording
/// an error gets a generic "object rejected" error recorded on its behalf.
#[derive(Clone)]
pub struct LoadHook(Arc<HookFn>);

impl LoadHook {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut DataObject, &mut DiagContext) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, obj: &mut DataObject, ctx: &mut DiagContext) -> bool {
        (self.0)(obj, ctx)
    }
}

impl fmt::Debug for LoadHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoadHook")
    }
}

/// One class in the arena. Configured through the builder, read-only afterwards.
#[derive(Debug, Clone)]
pub struct ObjectType {
    full_name: FullName,
    is_abstract: bool,
    base: Option<ClassId>,
    properties: Vec<PropertyMetadata>,
    tracks_span: bool,
    on_loading: Option<LoadHook>,
    on_loaded: Option<LoadHook>,
}

impl ObjectType {
    fn new(full_name: FullName) -> Self {
        Self {
            full_name,
            is_abstract: false,
            base: None,
            properties: Vec::new(),
            tracks_span: false,
            on_loading: None,
            on_loaded: None,
        }
    }

    pub fn full_name(&self) -> &FullName {
        &self.full_name
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn base(&self) -> Option<ClassId> {
        self.base
    }

    /// Properties declared by this class, base classes excluded.
    pub fn properties(&self) -> &[PropertyMetadata] {
        &self.properties
    }

    pub fn set_abstract(&mut self, is_abstract: bool) -> &mut Self {
        self.is_abstract = is_abstract;
        self
    }

    pub fn extends(&mut self, base: ClassId) -> &mut Self {
        self.base = Some(base);
        self
    }

    pub fn property(&mut self, name: impl Into<String>, ty: TypeMetadata) -> &mut Self {
        self.add_property(PropertyMetadata::new(name, ty))
    }

    pub fn add_property(&mut self, property: PropertyMetadata) -> &mut Self {
        self.properties.push(property);
        self
    }

    /// Record each instance's source span. Only valid on a hierarchy root.
    pub fn track_span(&mut self) -> &mut Self {
        self.tracks_span = true;
        self
    }

    pub fn on_loading(&mut self, hook: LoadHook) -> &mut Self {
        self.on_loading = Some(hook);
        self
    }

    pub fn on_loaded(&mut self, hook: LoadHook) -> &mut Self {
        self.on_loaded = Some(hook);
        self
    }
}

/// A list, set or map type.
///
/// Set items and map keys are never nullable; the constructors enforce it.
#[derive(Debug, Clone)]
pub struct CollectionType {
    kind: TypeKind,
    item: TypeMetadata,
    key: Option<TypeMetadata>,
    nullable: bool,
}

impl CollectionType {
    pub fn list(item: TypeMetadata, nullable: bool) -> Self {
        Self {
            kind: TypeKind::List,
            item,
            key: None,
            nullable,
        }
    }

    pub fn atom_set(item: TypeMetadata, nullable: bool) -> Self {
        Self {
            kind: TypeKind::AtomSet,
            item: item.non_nullable(),
            key: None,
            nullable,
        }
    }

    pub fn object_set(item: TypeMetadata, nullable: bool) -> Self {
        Self {
            kind: TypeKind::ObjectSet,
            item: item.non_nullable(),
            key: None,
            nullable,
        }
    }

    pub fn map(key: TypeMetadata, value: TypeMetadata, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Map,
            item: value,
            key: Some(key.non_nullable()),
            nullable,
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// The element type, or the value type of a map.
    pub fn item(&self) -> &TypeMetadata {
        &self.item
    }

    pub fn key(&self) -> Option<&TypeMetadata> {
        self.key.as_ref()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn create_instance(&self) -> Value {
        match self.kind {
            TypeKind::List => Value::List(Vec::new()),
            TypeKind::AtomSet => Value::AtomSet(IndexSet::new()),
            TypeKind::ObjectSet => Value::ObjectSet(Vec::new()),
            _ => Value::Map(IndexMap::new()),
        }
    }

    /// Appends to a list.
    pub fn add_item(&self, collection: &mut Value, item: Value) {
        if let Value::List(items) = collection {
            items.push(item);
        }
    }

    /// Adds to a set; `false` if an equal item is already present.
    pub fn try_add_item(&self, collection: &mut Value, item: Value) -> bool {
        match (collection, item) {
            (Value::AtomSet(items), Value::Atom(atom)) => items.insert(atom),
            (Value::ObjectSet(items), Value::Object(obj)) => {
                if items.contains(&obj) {
                    false
                } else {
                    items.push(*obj);
                    true
                }
            }
            _ => false,
        }
    }

    pub fn contains_key(&self, collection: &Value, key: &Atom) -> bool {
        matches!(collection, Value::Map(entries) if entries.contains_key(key))
    }

    pub fn add_entry(&self, collection: &mut Value, key: Atom, value: Value) {
        if let Value::Map(entries) = collection {
            entries.insert(key, value);
        }
    }
}

/// The declared type of a property, collection item or map key.
#[derive(Debug, Clone)]
pub enum TypeMetadata {
    Atom(&'static AtomType),
    Enum { id: EnumId, nullable: bool },
    Object { class: ClassId, nullable: bool },
    Collection(Arc<CollectionType>),
}

impl TypeMetadata {
    /// # Panics
    ///
    /// If `kind` is not an atomic kind.
    pub fn atom(kind: TypeKind, nullable: bool) -> Self {
        match AtomType::get(kind, nullable) {
            Some(atom) => TypeMetadata::Atom(atom),
            None => panic!("{kind} is not an atomic kind"),
        }
    }

    pub fn enumeration(id: EnumId, nullable: bool) -> Self {
        TypeMetadata::Enum { id, nullable }
    }

    pub fn object(class: ClassId, nullable: bool) -> Self {
        TypeMetadata::Object { class, nullable }
    }

    pub fn list(item: TypeMetadata, nullable: bool) -> Self {
        TypeMetadata::Collection(Arc::new(CollectionType::list(item, nullable)))
    }

    pub fn atom_set(item: TypeMetadata, nullable: bool) -> Self {
        TypeMetadata::Collection(Arc::new(CollectionType::atom_set(item, nullable)))
    }

    pub fn object_set(item: TypeMetadata, nullable: bool) -> Self {
        TypeMetadata::Collection(Arc::new(CollectionType::object_set(item, nullable)))
    }

    pub fn map(key: TypeMetadata, value: TypeMetadata, nullable: bool) -> Self {
        TypeMetadata::Collection(Arc::new(CollectionType::map(key, value, nullable)))
    }

    /// The kind; for enums, the underlying atomic kind.
    pub fn kind(&self) -> TypeKind {
        match self {
            TypeMetadata::Atom(atom) => atom.kind(),
            TypeMetadata::Enum { id, .. } => id.underlying(),
            TypeMetadata::Object { .. } => TypeKind::Object,
            TypeMetadata::Collection(coll) => coll.kind(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            TypeMetadata::Atom(atom) => atom.is_nullable(),
            TypeMetadata::Enum { nullable, .. } | TypeMetadata::Object { nullable, .. } => {
                *nullable
            }
            TypeMetadata::Collection(coll) => coll.is_nullable(),
        }
    }

    /// Atoms and enums: the types usable as set items and map keys.
    pub fn is_atom_like(&self) -> bool {
        matches!(self, TypeMetadata::Atom(_) | TypeMetadata::Enum { .. })
    }

    #[must_use]
    pub fn non_nullable(self) -> Self {
        match self {
            TypeMetadata::Atom(atom) => TypeMetadata::atom(atom.kind(), false),
            TypeMetadata::Enum { id, .. } => TypeMetadata::Enum {
                id,
                nullable: false,
            },
            TypeMetadata::Object { class, .. } => TypeMetadata::Object {
                class,
                nullable: false,
            },
            TypeMetadata::Collection(coll) if coll.nullable => {
                let mut coll = (*coll).clone();
                coll.nullable = false;
                TypeMetadata::Collection(Arc::new(coll))
            }
            other => other,
        }
    }

    /// A readable name for messages, e.g. `list of {urn:x}Person`.
    pub fn display_name(&self, program: &ProgramMetadata) -> String {
        let base = match self {
            TypeMetadata::Atom(atom) => atom.kind().to_string(),
            TypeMetadata::Enum { id, .. } => program.enum_name(*id),
            TypeMetadata::Object { class, .. } => program.class_name(*class),
            TypeMetadata::Collection(coll) => match coll.key() {
                Some(key) => format!(
                    "map of {} to {}",
                    key.display_name(program),
                    coll.item().display_name(program)
                ),
                None => {
                    let label = match coll.kind() {
                        TypeKind::List => "list",
                        TypeKind::AtomSet => "atom set",
                        _ => "object set",
                    };
                    format!("{label} of {}", coll.item().display_name(program))
                }
            },
        };
        if self.is_nullable() {
            format!("{base}?")
        } else {
            base
        }
    }
}

/// All classes and enums of a program.
#[derive(Debug)]
pub struct ProgramMetadata {
    classes: Vec<ObjectType>,
    enums: Vec<EnumType>,
    names: HashMap<FullName, GlobalType>,
}

impl ProgramMetadata {
    pub fn builder() -> ProgramMetadataBuilder {
        ProgramMetadataBuilder::default()
    }

    /// # Panics
    ///
    /// If `id` was not issued by the builder of this program.
    pub fn class(&self, id: ClassId) -> ClassRef<'_> {
        self.try_class(id)
            .unwrap_or_else(|| panic!("{id:?} does not belong to this program"))
    }

    pub fn try_class(&self, id: ClassId) -> Option<ClassRef<'_>> {
        self.classes.get(id.index()).map(|_| ClassRef { program: self, id })
    }

    /// # Panics
    ///
    /// If `id` was not issued by the builder of this program.
    pub fn enum_type(&self, id: EnumId) -> &EnumType {
        self.try_enum_type(id)
            .unwrap_or_else(|| panic!("{id:?} does not belong to this program"))
    }

    pub fn try_enum_type(&self, id: EnumId) -> Option<&EnumType> {
        self.enums.get(id.index())
    }

    /// The full name of `id` for messages, tolerating foreign handles.
    pub fn class_name(&self, id: ClassId) -> String {
        self.try_class(id)
            .map_or_else(|| "<unknown class>".to_string(), |c| c.full_name().to_string())
    }

    pub fn enum_name(&self, id: EnumId) -> String {
        self.try_enum_type(id)
            .map_or_else(|| "<unknown enum>".to_string(), |e| e.full_name().to_string())
    }

    pub fn resolve(&self, name: &FullName) -> Option<GlobalType> {
        self.names.get(name).copied()
    }

    pub fn resolve_class(&self, name: &FullName) -> Option<ClassRef<'_>> {
        match self.resolve(name)? {
            GlobalType::Class(id) => self.try_class(id),
            GlobalType::Enum(_) => None,
        }
    }

    pub fn resolve_enum(&self, name: &FullName) -> Option<EnumId> {
        match self.resolve(name)? {
            GlobalType::Enum(id) => Some(id),
            GlobalType::Class(_) => None,
        }
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassRef<'_>> {
        (0..self.classes.len()).map(move |i| ClassRef {
            program: self,
            id: ClassId::from_index(i),
        })
    }

    pub fn enums(&self) -> &[EnumType] {
        &self.enums
    }

    /// True when `class` is `ancestor` or transitively derives from it.
    pub fn is_equal_or_derives_from(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.classes.get(id.index()).and_then(|c| c.base);
        }
        false
    }
}

/// A class together with the program that owns it.
#[derive(Debug, Clone, Copy)]
pub struct ClassRef<'p> {
    program: &'p ProgramMetadata,
    id: ClassId,
}

impl<'p> ClassRef<'p> {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn program(&self) -> &'p ProgramMetadata {
        self.program
    }

    pub fn ty(&self) -> &'p ObjectType {
        &self.program.classes[self.id.index()]
    }

    pub fn full_name(&self) -> &'p FullName {
        &self.ty().full_name
    }

    pub fn is_abstract(&self) -> bool {
        self.ty().is_abstract
    }

    pub fn base(&self) -> Option<ClassRef<'p>> {
        self.ty().base.and_then(|b| self.program.try_class(b))
    }

    /// Self, then each base class up to the root.
    pub fn ancestry(&self) -> impl Iterator<Item = ClassRef<'p>> {
        std::iter::successors(Some(*self), |c| c.base())
    }

    pub fn root(&self) -> ClassRef<'p> {
        self.ancestry().last().unwrap_or(*self)
    }

    pub fn is_equal_or_derives_from(&self, ancestor: ClassId) -> bool {
        self.program.is_equal_or_derives_from(self.id, ancestor)
    }

    /// Every property of the hierarchy, base-class properties first.
    pub fn all_properties(&self) -> Vec<&'p PropertyMetadata> {
        let chain: Vec<ClassRef<'p>> = self.ancestry().collect();
        chain
            .into_iter()
            .rev()
            .flat_map(|c| c.ty().properties.iter())
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<&'p PropertyMetadata> {
        self.ancestry()
            .flat_map(|c| c.ty().properties.iter())
            .find(|p| p.name == name)
    }

    /// Whether instances record their source span; decided by the hierarchy root.
    pub fn tracks_span(&self) -> bool {
        self.root().ty().tracks_span
    }

    /// The most-derived before-populate hook.
    pub fn on_loading(&self) -> Option<&'p LoadHook> {
        self.ancestry().find_map(|c| c.ty().on_loading.as_ref())
    }

    /// The most-derived after-populate hook.
    pub fn on_loaded(&self) -> Option<&'p LoadHook> {
        self.ancestry().find_map(|c| c.ty().on_loaded.as_ref())
    }

    /// A fresh, unpopulated instance; `None` for abstract classes.
    pub fn create_instance(&self) -> Option<DataObject> {
        if self.is_abstract() {
            None
        } else {
            Some(DataObject::new(self.id))
        }
    }
}

impl PartialEq for ClassRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.program, other.program) && self.id == other.id
    }
}

impl Eq for ClassRef<'_> {}

/// Declares and defines the types of a program.
///
/// Types are declared first, which hands out their handles, so definitions can
/// reference any type regardless of order.
#[derive(Debug, Default)]
pub struct ProgramMetadataBuilder {
    classes: Vec<ObjectType>,
    enums: Vec<EnumType>,
}

impl ProgramMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_class(&mut self, full_name: FullName) -> ClassId {
        self.classes.push(ObjectType::new(full_name));
        ClassId::from_index(self.classes.len() - 1)
    }

    pub fn declare_enum(&mut self, full_name: FullName, underlying: TypeKind) -> EnumId {
        self.enums.push(EnumType {
            full_name,
            underlying,
            members: Vec::new(),
        });
        EnumId {
            index: (self.enums.len() - 1) as u32,
            underlying,
        }
    }

    /// # Panics
    ///
    /// If `id` was not issued by this builder.
    pub fn class(&mut self, id: ClassId) -> &mut ObjectType {
        &mut self.classes[id.index()]
    }

    /// # Panics
    ///
    /// If `id` was not issued by this builder.
    pub fn enumeration(&mut self, id: EnumId) -> &mut EnumType {
        &mut self.enums[id.index()]
    }

    /// Validates the definitions and freezes them into a program.
    pub fn build(self) -> Result<Arc<ProgramMetadata>, MetadataError> {
        let mut names = HashMap::new();
        for (i, class) in self.classes.iter().enumerate() {
            let id = GlobalType::Class(ClassId::from_index(i));
            if names.insert(class.full_name.clone(), id).is_some() {
                return Err(MetadataError::DuplicateTypeName {
                    name: class.full_name.to_string(),
                });
            }
        }
        for (i, e) in self.enums.iter().enumerate() {
            let id = GlobalType::Enum(EnumId {
                index: i as u32,
                underlying: e.underlying,
            });
            if names.insert(e.full_name.clone(), id).is_some() {
                return Err(MetadataError::DuplicateTypeName {
                    name: e.full_name.to_string(),
                });
            }
        }

        for e in &self.enums {
            self.validate_enum(e)?;
        }
        for (i, class) in self.classes.iter().enumerate() {
            self.validate_class(ClassId::from_index(i), class)?;
        }

        log::debug!(
            "Built program metadata: {} classes, {} enums",
            self.classes.len(),
            self.enums.len()
        );
        Ok(Arc::new(ProgramMetadata {
            classes: self.classes,
            enums: self.enums,
            names,
        }))
    }

    fn validate_enum(&self, e: &EnumType) -> Result<(), MetadataError> {
        if !e.underlying.is_atom() {
            return Err(MetadataError::InvalidEnumUnderlyingType {
                name: e.full_name.to_string(),
                kind: e.underlying,
            });
        }
        let mut seen = HashSet::new();
        for member in &e.members {
            if !seen.insert(member.name.as_str()) || !is_identifier(&member.name) {
                return Err(MetadataError::InvalidEnumMember {
                    name: e.full_name.to_string(),
                    member: member.name.clone(),
                });
            }
            if member.value.kind() != e.underlying {
                return Err(MetadataError::EnumMemberKindMismatch {
                    name: e.full_name.to_string(),
                    member: member.name.clone(),
                    expected: e.underlying,
                    found: member.value.kind(),
                });
            }
        }
        Ok(())
    }

    fn validate_class(&self, id: ClassId, class: &ObjectType) -> Result<(), MetadataError> {
        let class_name = || class.full_name.to_string();
        let mut visited = HashSet::from([id]);
        let mut current = class.base;
        while let Some(base) = current {
            let Some(base_type) = self.classes.get(base.index()) else {
                return Err(MetadataError::UnknownClass { id: base.index() });
            };
            if !visited.insert(base) {
                return Err(MetadataError::CircularInheritance { name: class_name() });
            }
            current = base_type.base;
        }

        if class.tracks_span && class.base.is_some() {
            return Err(MetadataError::SpanOnDerivedClass { name: class_name() });
        }

        let mut seen = HashSet::new();
        let mut ancestor = Some(id);
        while let Some(a) = ancestor {
            let a_type = &self.classes[a.index()];
            for property in &a_type.properties {
                if !seen.insert(property.name.as_str()) {
                    return Err(MetadataError::DuplicateProperty {
                        class: class_name(),
                        property: property.name.clone(),
                    });
                }
            }
            ancestor = a_type.base;
        }

        for property in &class.properties {
            if !is_identifier(&property.name) {
                return Err(MetadataError::InvalidPropertyName {
                    class: class_name(),
                    property: property.name.clone(),
                });
            }
            self.validate_type(&property.ty).map_err(|reason| {
                MetadataError::InvalidPropertyType {
                    class: class_name(),
                    property: property.name.clone(),
                    reason,
                }
            })?;
        }
        Ok(())
    }

    fn validate_type(&self, ty: &TypeMetadata) -> Result<(), String> {
        match ty {
            TypeMetadata::Atom(_) => Ok(()),
            TypeMetadata::Enum { id, .. } => match self.enums.get(id.index()) {
                Some(e) if e.underlying == id.underlying => Ok(()),
                _ => Err(format!("unknown enum handle {}", id.index())),
            },
            TypeMetadata::Object { class, .. } => {
                if self.classes.get(class.index()).is_some() {
                    Ok(())
                } else {
                    Err(format!("unknown class handle {}", class.index()))
                }
            }
            TypeMetadata::Collection(coll) => {
                match coll.kind() {
                    TypeKind::AtomSet if !coll.item().is_atom_like() => {
                        return Err("atom set items must be atoms or enums".to_string())
                    }
                    TypeKind::ObjectSet if !matches!(coll.item(), TypeMetadata::Object { .. }) => {
                        return Err("object set items must be objects".to_string())
                    }
                    _ => {}
                }
                if let Some(key) = coll.key() {
                    if !key.is_atom_like() {
                        return Err("map keys must be atoms or enums".to_string());
                    }
                    self.validate_type(key)?;
                }
                self.validate_type(coll.item())
            }
        }
    }
}
