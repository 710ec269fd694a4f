//! Structured diagnostics and source spans.
//!
//! Every problem found while loading a document is recorded as a [`Diag`] in a
//! caller-supplied [`DiagContext`]. Parsing code returns [`Halt`] once an error has
//! been recorded; the halt itself carries nothing because the context already does.

use miette::{Diagnostic, LabeledSpan, SourceSpan};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A 1-based line/column pair. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TextPosition {
    pub line: u32,
    pub column: u32,
}

impl TextPosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for TextPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A region of a named source text.
///
/// The default value (no file name) is the invalid span.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TextSpan {
    pub file: Option<Arc<str>>,
    /// Byte offset of the first character.
    pub start_offset: usize,
    /// Length in bytes.
    pub length: usize,
    pub start: TextPosition,
    pub end: TextPosition,
}

impl TextSpan {
    pub fn new(
        file: Arc<str>,
        start_offset: usize,
        length: usize,
        start: TextPosition,
        end: TextPosition,
    ) -> Self {
        Self {
            file: Some(file),
            start_offset,
            length,
            start,
            end,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.file.is_some()
    }

    /// Joins two spans of the same file into one covering both.
    #[must_use]
    pub fn to(&self, other: &TextSpan) -> TextSpan {
        let end_offset = other.start_offset + other.length;
        TextSpan {
            file: self.file.clone(),
            start_offset: self.start_offset,
            length: end_offset.saturating_sub(self.start_offset),
            start: self.start,
            end: other.end,
        }
    }

    pub fn to_source_span(&self) -> SourceSpan {
        (self.start_offset, self.length).into()
    }
}

impl From<&TextSpan> for SourceSpan {
    fn from(span: &TextSpan) -> Self {
        span.to_source_span()
    }
}

impl fmt::Display for TextSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", file, self.start),
            None => write!(f, "<unknown>"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// Stable diagnostic codes. The numeric values are part of the public contract
/// and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum DiagCode {
    SourceReadFailed = 1,

    // lexical
    UnterminatedString = 101,
    UnterminatedChar = 102,
    UnterminatedComment = 103,
    InvalidEscapeSequence = 104,
    ExponentDigitExpected = 105,
    InvalidCharLiteral = 106,

    // syntax
    SpecificTokenExpected = 201,
    AliasExpected = 202,
    NameExpected = 203,
    EndOfFileExpected = 204,
    DuplicateAlias = 205,
    ValueExpected = 206,
    NestingTooDeep = 207,

    // references
    InvalidAliasReference = 301,
    InvalidClassReference = 302,
    ClassNotEqualToOrDeriveFromDeclared = 303,
    ClassIsAbstract = 304,
    InvalidEnumReference = 305,
    EnumNotEqualToDeclared = 306,
    InvalidEnumMemberName = 307,

    // properties
    InvalidPropertyName = 401,
    PropertyMissing = 402,
    NullNotAllowed = 403,
    SpecificValueExpected = 404,
    DuplicatePropertyName = 405,

    // collections
    DuplicateSetItem = 501,
    DuplicateMapKey = 502,

    // atoms
    InvalidAtomValue = 601,

    ObjectRejected = 701,
}

impl DiagCode {
    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            DiagCode::SourceReadFailed => "source_read_failed",
            DiagCode::UnterminatedString => "unterminated_string",
            DiagCode::UnterminatedChar => "unterminated_char",
            DiagCode::UnterminatedComment => "unterminated_comment",
            DiagCode::InvalidEscapeSequence => "invalid_escape_sequence",
            DiagCode::ExponentDigitExpected => "exponent_digit_expected",
            DiagCode::InvalidCharLiteral => "invalid_char_literal",
            DiagCode::SpecificTokenExpected => "specific_token_expected",
            DiagCode::AliasExpected => "alias_expected",
            DiagCode::NameExpected => "name_expected",
            DiagCode::EndOfFileExpected => "end_of_file_expected",
            DiagCode::DuplicateAlias => "duplicate_alias",
            DiagCode::ValueExpected => "value_expected",
            DiagCode::NestingTooDeep => "nesting_too_deep",
            DiagCode::InvalidAliasReference => "invalid_alias_reference",
            DiagCode::InvalidClassReference => "invalid_class_reference",
            DiagCode::ClassNotEqualToOrDeriveFromDeclared => {
                "class_not_equal_to_or_derive_from_declared"
            }
            DiagCode::ClassIsAbstract => "class_is_abstract",
            DiagCode::InvalidEnumReference => "invalid_enum_reference",
            DiagCode::EnumNotEqualToDeclared => "enum_not_equal_to_declared",
            DiagCode::InvalidEnumMemberName => "invalid_enum_member_name",
            DiagCode::InvalidPropertyName => "invalid_property_name",
            DiagCode::PropertyMissing => "property_missing",
            DiagCode::NullNotAllowed => "null_not_allowed",
            DiagCode::SpecificValueExpected => "specific_value_expected",
            DiagCode::DuplicatePropertyName => "duplicate_property_name",
            DiagCode::DuplicateSetItem => "duplicate_set_item",
            DiagCode::DuplicateMapKey => "duplicate_map_key",
            DiagCode::InvalidAtomValue => "invalid_atom_value",
            DiagCode::ObjectRejected => "object_rejected",
        }
    }
}

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SD{:04}", self.value())
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct Diag {
    pub severity: Severity,
    pub code: DiagCode,
    pub message: String,
    pub span: Option<TextSpan>,
}

impl Diag {
    pub fn error(code: DiagCode, message: impl Into<String>, span: Option<TextSpan>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn warning(code: DiagCode, message: impl Into<String>, span: Option<TextSpan>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Diagnostic for Diag {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("sdata::{}", self.code.name())))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Info => miette::Severity::Advice,
        })
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span.as_ref().filter(|s| s.is_valid())?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some(self.code.to_string()),
            span.to_source_span(),
        ))))
    }
}

/// Control signal meaning "an error was recorded, abandon this parse".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halt;

pub type ParseResult<T> = Result<T, Halt>;

/// A snapshot of a [`DiagContext`]'s length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagMark(usize);

/// An ordered, append-only (except for [`DiagContext::restore`]) list of diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagContext {
    diags: Vec<Diag>,
}

impl DiagContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diag: Diag) {
        self.diags.push(diag);
    }

    pub fn add_error(&mut self, code: DiagCode, message: impl Into<String>, span: Option<TextSpan>) {
        self.add(Diag::error(code, message, span));
    }

    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(Diag::is_error)
    }

    pub fn has_errors_since(&self, mark: DiagMark) -> bool {
        self.since(mark).iter().any(Diag::is_error)
    }

    pub fn mark(&self) -> DiagMark {
        DiagMark(self.diags.len())
    }

    /// Drops every diagnostic recorded after `mark`.
    pub fn restore(&mut self, mark: DiagMark) {
        self.diags.truncate(mark.0);
    }

    pub fn since(&self, mark: DiagMark) -> &[Diag] {
        self.diags.get(mark.0..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.diags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diag> {
        self.diags.iter()
    }

    pub fn as_slice(&self) -> &[Diag] {
        &self.diags
    }

    pub fn clear(&mut self) {
        self.diags.clear();
    }

    pub fn into_vec(self) -> Vec<Diag> {
        self.diags
    }
}

impl<'a> IntoIterator for &'a DiagContext {
    type Item = &'a Diag;
    type IntoIter = std::slice::Iter<'a, Diag>;

    fn into_iter(self) -> Self::IntoIter {
        self.diags.iter()
    }
}

/// One line per diagnostic: `file:line:col: severity[code]: message`.
impl fmt::Display for DiagContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.diags {
            match &diag.span {
                Some(span) if span.is_valid() => write!(f, "{span}: ")?,
                _ => {}
            }
            writeln!(f, "{}[{}]: {}", diag.severity, diag.code, diag.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_at(line: u32, column: u32) -> TextSpan {
        TextSpan::new(
            Arc::from("a.sds"),
            10,
            3,
            TextPosition::new(line, column),
            TextPosition::new(line, column + 3),
        )
    }

    #[test]
    fn test_default_span_is_invalid() {
        assert!(!TextSpan::default().is_valid());
        assert!(span_at(1, 1).is_valid());
    }

    #[test]
    fn test_mark_and_restore() {
        let mut ctx = DiagContext::new();
        ctx.add_error(DiagCode::NullNotAllowed, "first", None);
        let mark = ctx.mark();
        ctx.add_error(DiagCode::DuplicateSetItem, "second", None);
        ctx.add(Diag::warning(DiagCode::InvalidAtomValue, "third", None));
        assert_eq!(ctx.since(mark).len(), 2);
        assert!(ctx.has_errors_since(mark));

        ctx.restore(mark);
        assert_eq!(ctx.len(), 1);
        assert!(ctx.since(mark).is_empty());
        assert!(!ctx.has_errors_since(mark));
        assert_eq!(ctx.as_slice()[0].message, "first");
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let mut ctx = DiagContext::new();
        ctx.add(Diag::warning(DiagCode::InvalidAtomValue, "careful", None));
        assert!(!ctx.has_errors());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(DiagCode::DuplicateSetItem.value(), 501);
        assert_eq!(DiagCode::DuplicateMapKey.value(), 502);
        assert_eq!(DiagCode::ClassIsAbstract.value(), 304);
        assert_eq!(DiagCode::PropertyMissing.to_string(), "SD0402");
    }

    #[test]
    fn test_display_lists_every_diagnostic() {
        let mut ctx = DiagContext::new();
        ctx.add_error(DiagCode::PropertyMissing, "Property 'a' missing.", Some(span_at(2, 5)));
        ctx.add_error(DiagCode::PropertyMissing, "Property 'b' missing.", None);
        let text = ctx.to_string();
        assert_eq!(
            text,
            "a.sds:2:5: error[SD0402]: Property 'a' missing.\nerror[SD0402]: Property 'b' missing.\n"
        );
    }

    #[test]
    fn test_miette_metadata() {
        let diag = Diag::error(DiagCode::DuplicateMapKey, "dup", Some(span_at(1, 4)));
        let code = Diagnostic::code(&diag).map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("sdata::duplicate_map_key"));
        let labels: Vec<_> = diag.labels().into_iter().flatten().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 10);
        assert_eq!(labels[0].len(), 3);
    }

    #[test]
    fn test_span_join() {
        let a = span_at(1, 1);
        let mut b = span_at(3, 2);
        b.start_offset = 40;
        b.length = 1;
        let joined = a.to(&b);
        assert_eq!(joined.start_offset, 10);
        assert_eq!(joined.length, 31);
        assert_eq!(joined.end, b.end);
    }
}
