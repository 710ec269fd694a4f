use crate::diag::{DiagCode, DiagContext, Halt, ParseResult, TextSpan};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::metadata::{
    ClassId, ClassRef, CollectionType, EnumId, FullName, GlobalType, LoadHook, ProgramMetadata,
    PropertyMetadata, TypeKind, TypeMetadata,
};
use crate::value::{Atom, DataObject, LiteralForm, Value};
use std::io::{self, Read};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// How many objects and collections may be open at once.
pub const MAX_NESTING_DEPTH: usize = 128;

#[derive(Debug, Clone)]
struct AliasDef {
    alias: String,
    uri: String,
}

/// Reusable working state for loading documents.
///
/// Holds the source text buffer and the alias-scope stack between loads so
/// their allocations are kept. [`Loader::begin`] is the only way to get a
/// [`Parser`], and it clears everything left over from the previous load.
#[derive(Debug, Default)]
pub struct Loader {
    text: String,
    aliases: Vec<AliasDef>,
    scope_starts: Vec<usize>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the loader, reads all of `reader` into its text buffer and returns
    /// a parser over it.
    pub fn begin<'l, R: Read>(
        &'l mut self,
        source_name: &str,
        mut reader: R,
        program: &'l ProgramMetadata,
        ctx: &'l mut DiagContext,
    ) -> io::Result<Parser<'l>> {
        let Loader {
            text,
            aliases,
            scope_starts,
        } = self;
        text.clear();
        aliases.clear();
        scope_starts.clear();
        reader.read_to_string(text)?;

        let text: &'l String = text;
        Ok(Parser {
            program,
            ctx,
            file: Arc::from(source_name),
            lexer: Lexer::new(text),
            token: Token {
                kind: TokenKind::Eof,
                start_offset: 0,
                length: 0,
                start_pos: Default::default(),
                end_pos: Default::default(),
                text_value: None,
            },
            aliases,
            scope_starts,
            depth: 0,
        })
    }

    /// The text of the most recent load.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A shared stock of idle [`Loader`]s.
#[derive(Debug, Default)]
pub struct LoaderPool {
    idle: Mutex<Vec<Loader>>,
}

impl LoaderPool {
    pub const fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Takes an idle loader, or creates one. It goes back to the pool on drop.
    pub fn get(&self) -> PooledLoader<'_> {
        let loader = self
            .idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.pop())
            .unwrap_or_default();
        PooledLoader { pool: self, loader }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}

pub struct PooledLoader<'p> {
    pool: &'p LoaderPool,
    loader: Loader,
}

impl Deref for PooledLoader<'_> {
    type Target = Loader;

    fn deref(&self) -> &Loader {
        &self.loader
    }
}

impl DerefMut for PooledLoader<'_> {
    fn deref_mut(&mut self) -> &mut Loader {
        &mut self.loader
    }
}

impl Drop for PooledLoader<'_> {
    fn drop(&mut self) {
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.push(mem::take(&mut self.loader));
        }
    }
}

/// Recursive-descent parser driven by the declared [`TypeMetadata`] of each value.
///
/// Every error is recorded in the [`DiagContext`] before [`Halt`] is returned, so
/// callers only need to propagate it.
pub struct Parser<'l> {
    program: &'l ProgramMetadata,
    ctx: &'l mut DiagContext,
    file: Arc<str>,
    lexer: Lexer<'l>,
    token: Token,
    aliases: &'l mut Vec<AliasDef>,
    scope_starts: &'l mut Vec<usize>,
    depth: usize,
}

impl<'l> Parser<'l> {
    // === Entry Points ===

    /// Document ::= ObjectValue EOF
    pub fn parse_document(&mut self, root: ClassId) -> ParseResult<DataObject> {
        self.bump()?;
        let obj = self.parse_object(root)?;
        self.expect_eof()?;
        Ok(obj)
    }

    /// Parses a document holding a single value of type `expected`.
    pub fn parse_value_document(&mut self, expected: &TypeMetadata) -> ParseResult<Value> {
        self.bump()?;
        let value = self.parse_value(expected)?;
        self.expect_eof()?;
        Ok(value)
    }

    // === Values ===

    /// Value ::= AtomLiteral | EnumLiteral | 'null' | ListOrSet | Map | ObjectValue
    pub fn parse_value(&mut self, expected: &TypeMetadata) -> ParseResult<Value> {
        if self.token.is_keyword("null") {
            if !expected.is_nullable() {
                let message = format!(
                    "Null is not allowed for {}.",
                    expected.display_name(self.program)
                );
                return self.error(DiagCode::NullNotAllowed, message);
            }
            self.bump()?;
            return Ok(Value::Null);
        }

        match expected {
            TypeMetadata::Atom(atom) => self.parse_atom(atom.kind()).map(Value::Atom),
            TypeMetadata::Enum { id, .. } => self.parse_enum_value(*id).map(Value::Atom),
            TypeMetadata::Object { class, .. } => {
                if !self.token.is_name() {
                    let expected = expected.display_name(self.program);
                    return self.value_mismatch(&expected);
                }
                self.nested(|p| p.parse_object(*class)).map(Value::from)
            }
            TypeMetadata::Collection(coll) => {
                self.nested(|p| p.parse_collection(expected, coll))
            }
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return self.error(
                DiagCode::NestingTooDeep,
                format!("Nesting exceeds the maximum depth of {MAX_NESTING_DEPTH}."),
            );
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_atom(&mut self, kind: TypeKind) -> ParseResult<Atom> {
        let start = self.span();
        let text = match LiteralForm::of(kind) {
            Some(LiteralForm::Text) if self.is_string_literal() => self.token.text().to_string(),
            Some(LiteralForm::Boolean)
                if self.token.is_keyword("true") || self.token.is_keyword("false") =>
            {
                self.token.text().to_string()
            }
            Some(LiteralForm::Number) => {
                let (negative, sign_end) = if self.token.is_char('-') || self.token.is_char('+') {
                    let negative = self.token.is_char('-');
                    let sign_end = self.token.start_offset + self.token.length;
                    self.bump()?;
                    (negative, Some(sign_end))
                } else {
                    (false, None)
                };
                // the sign must touch the number
                let detached = sign_end.is_some_and(|end| end != self.token.start_offset);
                if detached || !self.is_number_literal() {
                    return self.value_mismatch(&kind.to_string());
                }
                if negative {
                    format!("-{}", self.token.text())
                } else {
                    self.token.text().to_string()
                }
            }
            _ => return self.value_mismatch(&kind.to_string()),
        };

        let span = start.to(&self.span());
        match Atom::parse(kind, &text) {
            Some(atom) => {
                self.bump()?;
                Ok(atom)
            }
            None => {
                self.ctx.add_error(
                    DiagCode::InvalidAtomValue,
                    format!("Invalid {kind} value '{text}'."),
                    Some(span),
                );
                Err(Halt)
            }
        }
    }

    /// EnumLiteral ::= '$' Alias ':' EnumName '.' MemberName
    ///
    /// A plain literal of the underlying kind is accepted too.
    fn parse_enum_value(&mut self, declared: EnumId) -> ParseResult<Atom> {
        if !self.token.is_char('$') {
            return self.parse_atom(declared.underlying());
        }
        self.bump()?;

        let program = self.program;
        let (alias, alias_span) = self.expect_alias()?;
        self.expect_char(':')?;
        let (name, name_span) = self.expect_name()?;
        let uri = self.resolve_alias(&alias, alias_span)?;
        let full_name = FullName::new(uri, name);

        let found = match program.resolve(&full_name) {
            Some(GlobalType::Enum(found)) => found,
            _ => {
                return self.error_at(
                    DiagCode::InvalidEnumReference,
                    format!("Invalid enum reference '{full_name}'."),
                    name_span,
                )
            }
        };
        if found != declared {
            let declared_name = program.enum_name(declared);
            return self.error_at(
                DiagCode::EnumNotEqualToDeclared,
                format!(
                    "Enum '{full_name}' is not equal to the declared enum '{declared_name}'."
                ),
                name_span,
            );
        }

        self.expect_char('.')?;
        let (member_name, member_span) = self.expect_name()?;
        match program.enum_type(found).member(&member_name) {
            Some(member) => Ok(member.value.clone()),
            None => self.error_at(
                DiagCode::InvalidEnumMemberName,
                format!("Invalid member name '{member_name}' of enum '{full_name}'."),
                member_span,
            ),
        }
    }

    /// ListOrSet ::= '[' Value* ']'
    /// Map       ::= '#[' (Value '=' Value)* ']'
    fn parse_collection(
        &mut self,
        expected: &TypeMetadata,
        coll: &CollectionType,
    ) -> ParseResult<Value> {
        let opened = match coll.kind() {
            TypeKind::Map => self.token.kind == TokenKind::HashOpenBracket,
            _ => self.token.is_char('['),
        };
        if !opened {
            let expected = expected.display_name(self.program);
            return self.value_mismatch(&expected);
        }
        self.bump()?;

        let mut collection = coll.create_instance();
        while !self.token.is_char(']') {
            let item_span = self.span();
            match (coll.kind(), coll.key()) {
                (TypeKind::Map, Some(key_type)) => {
                    let Value::Atom(key) = self.parse_value(key_type)? else {
                        return self.error_at(
                            DiagCode::SpecificValueExpected,
                            "Map key must be an atom.",
                            item_span,
                        );
                    };
                    if coll.contains_key(&collection, &key) {
                        return self.error_at(
                            DiagCode::DuplicateMapKey,
                            format!("Duplicate map key {}.", key.to_literal()),
                            item_span,
                        );
                    }
                    self.expect_char('=')?;
                    let value = self.parse_value(coll.item())?;
                    coll.add_entry(&mut collection, key, value);
                }
                (TypeKind::AtomSet | TypeKind::ObjectSet, _) => {
                    let item = self.parse_value(coll.item())?;
                    if !coll.try_add_item(&mut collection, item) {
                        return self.error_at(
                            DiagCode::DuplicateSetItem,
                            "Duplicate set item.",
                            item_span,
                        );
                    }
                }
                _ => {
                    let item = self.parse_value(coll.item())?;
                    coll.add_item(&mut collection, item);
                }
            }
            self.skip_comma()?;
        }
        self.bump()?;
        Ok(collection)
    }

    // === Objects ===

    /// ObjectValue ::= Alias ':' ClassName AliasBlock? '{' PropertyAssign* '}'
    fn parse_object(&mut self, declared: ClassId) -> ParseResult<DataObject> {
        let head_span = self.span();
        let (alias, alias_span) = self.expect_alias()?;
        self.expect_char(':')?;
        let (name, name_span) = self.expect_name()?;

        // the head's own alias may be defined by its alias block
        let scope_pushed = if self.token.is_char('<') {
            self.parse_alias_block()?;
            true
        } else {
            false
        };
        let uri = self.resolve_alias(&alias, alias_span)?;
        let full_name = FullName::new(uri, name);

        let program = self.program;
        let Some(class) = program.resolve_class(&full_name) else {
            return self.error_at(
                DiagCode::InvalidClassReference,
                format!("Invalid class reference '{full_name}'."),
                name_span,
            );
        };
        if !class.is_equal_or_derives_from(declared) {
            let declared_name = program.class_name(declared);
            return self.error_at(
                DiagCode::ClassNotEqualToOrDeriveFromDeclared,
                format!(
                    "Class '{full_name}' is not equal to or derive from the declared class '{declared_name}'."
                ),
                name_span,
            );
        }
        let Some(mut obj) = class.create_instance() else {
            return self.error_at(
                DiagCode::ClassIsAbstract,
                format!("Class '{full_name}' is abstract."),
                name_span,
            );
        };

        if let Some(hook) = class.on_loading() {
            self.run_hook(hook, class, &mut obj, &name_span)?;
        }

        self.expect_char('{')?;
        let mut pending: Vec<&PropertyMetadata> = class.all_properties();
        while !self.token.is_char('}') {
            let (prop_name, prop_span) = self.expect_name()?;
            let Some(index) = pending.iter().position(|p| p.name() == prop_name) else {
                return if class.property(&prop_name).is_some() {
                    self.error_at(
                        DiagCode::DuplicatePropertyName,
                        format!("Duplicate property name '{prop_name}'."),
                        prop_span,
                    )
                } else {
                    self.error_at(
                        DiagCode::InvalidPropertyName,
                        format!("Invalid property name '{prop_name}' for class '{full_name}'."),
                        prop_span,
                    )
                };
            };
            let prop = pending.remove(index);
            self.expect_char('=')?;
            let value = self.parse_value(prop.ty())?;
            prop.set(&mut obj, value);
            self.skip_comma()?;
        }

        let close_span = self.span();
        if !pending.is_empty() {
            for prop in pending {
                self.ctx.add_error(
                    DiagCode::PropertyMissing,
                    format!("Property '{}' is missing.", prop.name()),
                    Some(close_span.clone()),
                );
            }
            return Err(Halt);
        }
        self.bump()?;

        if class.tracks_span() {
            obj.set_span(Some(head_span.to(&close_span)));
        }
        if let Some(hook) = class.on_loaded() {
            self.run_hook(hook, class, &mut obj, &name_span)?;
        }
        if scope_pushed {
            self.pop_scope();
        }
        Ok(obj)
    }

    /// AliasBlock ::= '<' (Alias '=' StringLiteral)* '>'
    fn parse_alias_block(&mut self) -> ParseResult<()> {
        self.bump()?;
        self.push_scope();
        while !self.token.is_char('>') {
            let (alias, alias_span) = self.expect_alias()?;
            if self.current_scope().iter().any(|def| def.alias == alias) {
                return self.error_at(
                    DiagCode::DuplicateAlias,
                    format!("Duplicate alias '{alias}'."),
                    alias_span,
                );
            }
            self.expect_char('=')?;
            if !self.is_string_literal() {
                let found = self.token.describe();
                return self.error(
                    DiagCode::SpecificTokenExpected,
                    format!("Namespace URI string expected, found {found}."),
                );
            }
            let uri = self.token.text().to_string();
            self.bump()?;
            log::trace!("alias {alias} -> {uri}");
            self.aliases.push(AliasDef { alias, uri });
            self.skip_comma()?;
        }
        self.bump()
    }

    fn run_hook(
        &mut self,
        hook: &LoadHook,
        class: ClassRef<'_>,
        obj: &mut DataObject,
        span: &TextSpan,
    ) -> ParseResult<()> {
        let mark = self.ctx.mark();
        let accepted = hook.call(obj, self.ctx);
        let failed = self.ctx.has_errors_since(mark);
        if accepted && !failed {
            return Ok(());
        }
        if !failed {
            self.ctx.add_error(
                DiagCode::ObjectRejected,
                format!("Object of class '{}' was rejected.", class.full_name()),
                Some(span.clone()),
            );
        }
        Err(Halt)
    }

    // === Alias Scopes ===

    fn push_scope(&mut self) {
        self.scope_starts.push(self.aliases.len());
        log::trace!("push alias scope {}", self.scope_starts.len());
    }

    fn pop_scope(&mut self) {
        if let Some(start) = self.scope_starts.pop() {
            self.aliases.truncate(start);
        }
        log::trace!("pop alias scope {}", self.scope_starts.len() + 1);
    }

    fn current_scope(&self) -> &[AliasDef] {
        let start = self.scope_starts.last().copied().unwrap_or(0);
        &self.aliases[start..]
    }

    /// Innermost definition wins.
    fn resolve_alias(&mut self, alias: &str, span: TextSpan) -> ParseResult<String> {
        match self.aliases.iter().rev().find(|def| def.alias == alias) {
            Some(def) => Ok(def.uri.clone()),
            None => self.error_at(
                DiagCode::InvalidAliasReference,
                format!("Invalid alias reference '{alias}'."),
                span,
            ),
        }
    }

    // === Tokenizer Helper Methods ===

    /// Moves to the next significant token. Lexer errors halt here.
    fn bump(&mut self) -> ParseResult<()> {
        let token = loop {
            let token = self.lexer.next_token();
            if !token.is_trivia() {
                break token;
            }
        };
        if let TokenKind::Error(kind) = token.kind {
            let span = token.span(&self.file);
            self.ctx
                .add_error(kind.diag_code(), token.text().to_string(), Some(span));
            return Err(Halt);
        }
        self.token = token;
        Ok(())
    }

    fn span(&self) -> TextSpan {
        self.token.span(&self.file)
    }

    fn is_string_literal(&self) -> bool {
        matches!(
            self.token.kind,
            TokenKind::StringLiteral | TokenKind::VerbatimStringLiteral
        )
    }

    fn is_number_literal(&self) -> bool {
        match self.token.kind {
            TokenKind::IntegerLiteral | TokenKind::DecimalLiteral | TokenKind::RealLiteral => true,
            TokenKind::Identifier => matches!(self.token.text(), "INF" | "NaN"),
            _ => false,
        }
    }

    fn starts_value(&self) -> bool {
        match self.token.kind {
            TokenKind::StringLiteral
            | TokenKind::VerbatimStringLiteral
            | TokenKind::CharLiteral
            | TokenKind::IntegerLiteral
            | TokenKind::DecimalLiteral
            | TokenKind::RealLiteral
            | TokenKind::Identifier
            | TokenKind::VerbatimIdentifier
            | TokenKind::HashOpenBracket => true,
            TokenKind::Char(c) => matches!(c, '[' | '$' | '-' | '+'),
            _ => false,
        }
    }

    fn skip_comma(&mut self) -> ParseResult<()> {
        if self.token.is_char(',') {
            self.bump()?;
        }
        Ok(())
    }

    fn expect_char(&mut self, c: char) -> ParseResult<()> {
        if self.token.is_char(c) {
            return self.bump();
        }
        let found = self.token.describe();
        self.error(
            DiagCode::SpecificTokenExpected,
            format!("'{c}' expected, found {found}."),
        )
    }

    fn expect_name(&mut self) -> ParseResult<(String, TextSpan)> {
        self.expect_name_with(DiagCode::NameExpected, "Name")
    }

    fn expect_alias(&mut self) -> ParseResult<(String, TextSpan)> {
        self.expect_name_with(DiagCode::AliasExpected, "Alias")
    }

    fn expect_name_with(&mut self, code: DiagCode, what: &str) -> ParseResult<(String, TextSpan)> {
        if !self.token.is_name() {
            let found = self.token.describe();
            return self.error(code, format!("{what} expected, found {found}."));
        }
        let name = self.token.text().to_string();
        let span = self.span();
        self.bump()?;
        Ok((name, span))
    }

    fn expect_eof(&mut self) -> ParseResult<()> {
        if self.token.kind == TokenKind::Eof {
            return Ok(());
        }
        let found = self.token.describe();
        self.error(
            DiagCode::EndOfFileExpected,
            format!("End of file expected, found {found}."),
        )
    }

    fn value_mismatch<T>(&mut self, expected: &str) -> ParseResult<T> {
        let found = self.token.describe();
        if self.starts_value() {
            self.error(
                DiagCode::SpecificValueExpected,
                format!("{expected} value expected, found {found}."),
            )
        } else {
            self.error(
                DiagCode::ValueExpected,
                format!("Value expected, found {found}."),
            )
        }
    }

    /// Records an error at the current token and halts.
    fn error<T>(&mut self, code: DiagCode, message: impl Into<String>) -> ParseResult<T> {
        let span = self.span();
        self.error_at(code, message, span)
    }

    fn error_at<T>(
        &mut self,
        code: DiagCode,
        message: impl Into<String>,
        span: TextSpan,
    ) -> ParseResult<T> {
        self.ctx.add_error(code, message, Some(span));
        Err(Halt)
    }
}
