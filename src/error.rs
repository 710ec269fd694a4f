use crate::diag::Diag;
use crate::metadata::TypeKind;
use miette::{Diagnostic, NamedSource};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum SdataError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Save(#[from] SaveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Failed to read '{path}'")]
    #[diagnostic(code(sdata::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A document failed to load. Carries every diagnostic the load produced.
#[derive(Error, Debug, Diagnostic)]
#[error("Failed to load '{name}': {} error(s)", .diagnostics.iter().filter(|d| d.is_error()).count())]
#[diagnostic(
    code(sdata::load_failed),
    help("Each related diagnostic points at the offending text.")
)]
pub struct LoadError {
    pub name: String,
    #[source_code]
    pub src: NamedSource<String>,
    #[related]
    pub diagnostics: Vec<Diag>,
}

impl LoadError {
    pub fn new(source_name: &str, text: &str, diagnostics: Vec<Diag>) -> Self {
        Self {
            name: source_name.to_string(),
            src: NamedSource::new(source_name, text.to_string()),
            diagnostics,
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn diagnostics(&self) -> &[Diag] {
        &self.diagnostics
    }
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum SaveError {
    #[error("Class '{class}' does not equal or derive from the declared class '{declared}'")]
    #[diagnostic(code(sdata::save::class_not_derived))]
    ClassNotDerived { class: String, declared: String },

    #[error("Class '{class}' is abstract and cannot be saved")]
    #[diagnostic(code(sdata::save::abstract_class))]
    AbstractClass { class: String },

    #[error("Property '{class}.{property}' is missing a value")]
    #[diagnostic(
        code(sdata::save::value_missing),
        help("Set the property, or declare it nullable and set it to null.")
    )]
    ValueMissing { class: String, property: String },

    #[error("Property '{class}.{property}' is not nullable but holds null")]
    #[diagnostic(code(sdata::save::null_not_allowed))]
    NullNotAllowed { class: String, property: String },

    #[error("Value of '{context}' does not match its declared type {expected}")]
    #[diagnostic(code(sdata::save::type_mismatch))]
    TypeMismatch { context: String, expected: String },

    #[error("Failed to write output")]
    #[diagnostic(code(sdata::save::write))]
    Write,
}

impl From<std::fmt::Error> for SaveError {
    fn from(_: std::fmt::Error) -> Self {
        SaveError::Write
    }
}

/// Raised while building a [`ProgramMetadata`](crate::metadata::ProgramMetadata).
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Type name '{name}' is declared more than once")]
    #[diagnostic(code(sdata::metadata::duplicate_type_name))]
    DuplicateTypeName { name: String },

    #[error("Class handle {id} is not declared in this builder")]
    #[diagnostic(code(sdata::metadata::unknown_class))]
    UnknownClass { id: usize },

    #[error("Class '{name}' inherits from itself")]
    #[diagnostic(code(sdata::metadata::circular_inheritance))]
    CircularInheritance { name: String },

    #[error("Class '{name}' tracks spans but is not a hierarchy root")]
    #[diagnostic(
        code(sdata::metadata::span_on_derived_class),
        help("Enable span tracking on the root class; derived classes inherit it.")
    )]
    SpanOnDerivedClass { name: String },

    #[error("Property '{property}' is declared more than once in the hierarchy of '{class}'")]
    #[diagnostic(code(sdata::metadata::duplicate_property))]
    DuplicateProperty { class: String, property: String },

    #[error("Property name '{property}' of '{class}' is not a valid identifier")]
    #[diagnostic(code(sdata::metadata::invalid_property_name))]
    InvalidPropertyName { class: String, property: String },

    #[error("Property '{class}.{property}' has an invalid type: {reason}")]
    #[diagnostic(code(sdata::metadata::invalid_property_type))]
    InvalidPropertyType {
        class: String,
        property: String,
        reason: String,
    },

    #[error("Enum '{name}' has non-atomic underlying kind {kind}")]
    #[diagnostic(code(sdata::metadata::invalid_enum_underlying_type))]
    InvalidEnumUnderlyingType { name: String, kind: TypeKind },

    #[error("Enum '{name}' has an invalid or duplicate member '{member}'")]
    #[diagnostic(code(sdata::metadata::invalid_enum_member))]
    InvalidEnumMember { name: String, member: String },

    #[error("Member '{member}' of enum '{name}' is {found}, expected {expected}")]
    #[diagnostic(code(sdata::metadata::enum_member_kind_mismatch))]
    EnumMemberKindMismatch {
        name: String,
        member: String,
        expected: TypeKind,
        found: TypeKind,
    },
}
