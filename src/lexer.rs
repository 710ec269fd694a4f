use crate::diag::{DiagCode, TextPosition, TextSpan};
use crate::utils::{is_identifier_part, is_identifier_start, is_newline};
use std::str::Chars;
use std::sync::Arc;

/// Represents the different kinds of tokens that the lexer can produce.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    // == Special Tokens ==
    /// End of the input text.
    Eof,
    /// A run of whitespace characters, newlines excluded.
    Whitespace,
    /// One line break: `\r\n`, `\n`, `\r`, U+2028 or U+2029.
    NewLine,
    /// `// ...` up to (not including) the line break.
    SingleLineComment,
    /// `/* ... */`
    MultiLineComment,
    /// A malformed token. The token's `text_value` holds the message.
    Error(LexErrorKind),

    // == Literals ==
    Identifier,
    /// `@name`. The `text_value` excludes the `@`.
    VerbatimIdentifier,
    StringLiteral,
    /// `@"..."`, where `""` stands for one quote.
    VerbatimStringLiteral,
    CharLiteral,
    IntegerLiteral,
    DecimalLiteral,
    RealLiteral,

    // == Punctuation ==
    ColonColon,
    EqualsEquals,
    EqualsGreaterThan,
    ExclamationEquals,
    LessThanEquals,
    LessThanLessThan,
    GreaterThanEquals,
    BarBar,
    AmpersandAmpersand,
    QuestionQuestion,
    /// `#[`, which opens a map.
    HashOpenBracket,
    /// Any other single character.
    Char(char),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedChar,
    UnterminatedComment,
    InvalidEscapeSequence,
    ExponentDigitExpected,
    InvalidCharLiteral,
}

impl LexErrorKind {
    pub fn diag_code(self) -> DiagCode {
        match self {
            LexErrorKind::UnterminatedString => DiagCode::UnterminatedString,
            LexErrorKind::UnterminatedChar => DiagCode::UnterminatedChar,
            LexErrorKind::UnterminatedComment => DiagCode::UnterminatedComment,
            LexErrorKind::InvalidEscapeSequence => DiagCode::InvalidEscapeSequence,
            LexErrorKind::ExponentDigitExpected => DiagCode::ExponentDigitExpected,
            LexErrorKind::InvalidCharLiteral => DiagCode::InvalidCharLiteral,
        }
    }
}

/// A token with its kind, position and (for literals, names and comments) its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub start_offset: usize,
    /// Length in bytes.
    pub length: usize,
    pub start_pos: TextPosition,
    /// Position just past the last character.
    pub end_pos: TextPosition,
    pub text_value: Option<String>,
}

impl Token {
    pub fn is_error(&self) -> bool {
        matches!(self.kind, TokenKind::Error(_))
    }

    /// Whitespace, newlines and comments.
    pub fn is_trivia(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Whitespace
                | TokenKind::NewLine
                | TokenKind::SingleLineComment
                | TokenKind::MultiLineComment
        )
    }

    pub fn is_char(&self, c: char) -> bool {
        self.kind == TokenKind::Char(c)
    }

    pub fn is_name(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Identifier | TokenKind::VerbatimIdentifier
        )
    }

    /// The plain identifier `keyword`; `@keyword` never matches.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text() == keyword
    }

    pub fn text(&self) -> &str {
        self.text_value.as_deref().unwrap_or("")
    }

    pub fn span(&self, file: &Arc<str>) -> TextSpan {
        TextSpan::new(
            file.clone(),
            self.start_offset,
            self.length,
            self.start_pos,
            self.end_pos,
        )
    }

    /// Human-readable description used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Identifier | TokenKind::VerbatimIdentifier => {
                format!("identifier '{}'", self.text())
            }
            TokenKind::StringLiteral | TokenKind::VerbatimStringLiteral => {
                "string literal".to_string()
            }
            TokenKind::CharLiteral => "char literal".to_string(),
            TokenKind::IntegerLiteral | TokenKind::DecimalLiteral | TokenKind::RealLiteral => {
                format!("number '{}'", self.text())
            }
            TokenKind::Char(c) => format!("'{c}'"),
            other => format!("{other:?}"),
        }
    }
}

const RING_CAPACITY: usize = 8;

/// Fixed-size lookahead window over the source characters, refilled on demand.
struct CharRing<'a> {
    source: Chars<'a>,
    slots: [char; RING_CAPACITY],
    head: usize,
    len: usize,
}

impl<'a> CharRing<'a> {
    fn new(source: Chars<'a>) -> Self {
        Self {
            source,
            slots: ['\0'; RING_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    fn peek(&mut self, ahead: usize) -> Option<char> {
        debug_assert!(ahead < RING_CAPACITY);
        while self.len <= ahead {
            let c = self.source.next()?;
            self.slots[(self.head + self.len) % RING_CAPACITY] = c;
            self.len += 1;
        }
        Some(self.slots[(self.head + ahead) % RING_CAPACITY])
    }

    fn pop(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.head = (self.head + 1) % RING_CAPACITY;
        self.len -= 1;
        Some(c)
    }
}

/// Where the token being scanned began.
#[derive(Debug, Clone, Copy)]
struct State {
    start_offset: usize,
    start_line: u32,
    start_column: u32,
}

type LexResult<T> = Result<T, (LexErrorKind, String)>;

pub struct Lexer<'a> {
    ring: CharRing<'a>,
    offset: usize,
    line: u32,
    column: u32,
    state: State,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            ring: CharRing::new(input.chars()),
            offset: 0,
            line: 1,
            column: 1,
            state: State {
                start_offset: 0,
                start_line: 1,
                start_column: 1,
            },
        }
    }

    /// Lexes the whole input, including the final `Eof` token.
    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        self.state = State {
            start_offset: self.offset,
            start_line: self.line,
            start_column: self.column,
        };

        let Some(c) = self.peek() else {
            return self.make_token(TokenKind::Eof, None);
        };

        match c {
            '\r' => {
                self.advance();
                if self.peek() == Some('\n') {
                    self.advance();
                }
                self.make_token(TokenKind::NewLine, None)
            }
            c if is_newline(c) => {
                self.advance();
                self.make_token(TokenKind::NewLine, None)
            }
            c if c.is_whitespace() => self.read_whitespace(),
            '/' if self.peek_at(1) == Some('/') => self.read_line_comment(),
            '/' if self.peek_at(1) == Some('*') => self.read_block_comment(),
            '"' => self.read_string(),
            '\'' => self.read_char(),
            '@' => match self.peek_at(1) {
                Some('"') => self.read_verbatim_string(),
                Some(next) if is_identifier_start(next) => {
                    self.advance();
                    let name = self.read_identifier_text();
                    self.make_token(TokenKind::VerbatimIdentifier, Some(name))
                }
                _ => self.read_punctuation(c),
            },
            c if is_identifier_start(c) => {
                let name = self.read_identifier_text();
                self.make_token(TokenKind::Identifier, Some(name))
            }
            c if c.is_ascii_digit() => self.read_number(),
            c => self.read_punctuation(c),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.ring.peek(0)
    }

    fn peek_at(&mut self, ahead: usize) -> Option<char> {
        self.ring.peek(ahead)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.ring.pop()?;
        self.offset += c.len_utf8();
        match c {
            // the '\n' of a "\r\n" pair moves to the next line
            '\r' if self.ring.peek(0) == Some('\n') => self.column += 1,
            c if is_newline(c) => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += 1,
        }
        Some(c)
    }

    fn make_token(&self, kind: TokenKind, text_value: Option<String>) -> Token {
        Token {
            kind,
            start_offset: self.state.start_offset,
            length: self.offset - self.state.start_offset,
            start_pos: TextPosition::new(self.state.start_line, self.state.start_column),
            end_pos: TextPosition::new(self.line, self.column),
            text_value,
        }
    }

    fn error_token(&self, (kind, message): (LexErrorKind, String)) -> Token {
        self.make_token(TokenKind::Error(kind), Some(message))
    }

    fn read_whitespace(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_whitespace() && !is_newline(c) {
                self.advance();
            } else {
                break;
            }
        }
        self.make_token(TokenKind::Whitespace, None)
    }

    fn read_line_comment(&mut self) -> Token {
        self.advance();
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_newline(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        self.make_token(TokenKind::SingleLineComment, Some(text))
    }

    fn read_block_comment(&mut self) -> Token {
        self.advance();
        self.advance();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    return self.error_token((
                        LexErrorKind::UnterminatedComment,
                        "'*/' expected.".to_string(),
                    ))
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.advance();
                    self.advance();
                    return self.make_token(TokenKind::MultiLineComment, Some(text));
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    fn read_identifier_text(&mut self) -> String {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if is_identifier_part(c) {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn read_string(&mut self) -> Token {
        self.advance();
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return self.make_token(TokenKind::StringLiteral, Some(value));
                }
                Some('\\') => match self.read_escape() {
                    Ok(c) => value.push(c),
                    Err(err) => return self.error_token(err),
                },
                Some(c) if !is_newline(c) => {
                    value.push(c);
                    self.advance();
                }
                _ => {
                    return self.error_token((
                        LexErrorKind::UnterminatedString,
                        "Unterminated string literal.".to_string(),
                    ))
                }
            }
        }
    }

    fn read_verbatim_string(&mut self) -> Token {
        self.advance();
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => {
                    if self.peek() == Some('"') {
                        self.advance();
                        value.push('"');
                    } else {
                        return self.make_token(TokenKind::VerbatimStringLiteral, Some(value));
                    }
                }
                Some(c) => value.push(c),
                None => {
                    return self.error_token((
                        LexErrorKind::UnterminatedString,
                        "Unterminated verbatim string literal.".to_string(),
                    ))
                }
            }
        }
    }

    fn read_char(&mut self) -> Token {
        self.advance();
        let value = match self.peek() {
            Some('\\') => match self.read_escape() {
                Ok(c) => c,
                Err(err) => return self.error_token(err),
            },
            Some('\'') => {
                self.advance();
                return self.error_token((
                    LexErrorKind::InvalidCharLiteral,
                    "Empty char literal.".to_string(),
                ));
            }
            Some(c) if !is_newline(c) => {
                self.advance();
                c
            }
            _ => {
                return self.error_token((
                    LexErrorKind::UnterminatedChar,
                    "Unterminated char literal.".to_string(),
                ))
            }
        };
        match self.peek() {
            Some('\'') => {
                self.advance();
                self.make_token(TokenKind::CharLiteral, Some(value.to_string()))
            }
            None => self.error_token((
                LexErrorKind::UnterminatedChar,
                "Unterminated char literal.".to_string(),
            )),
            Some(_) => self.error_token((
                LexErrorKind::InvalidCharLiteral,
                "Char literal must contain exactly one character.".to_string(),
            )),
        }
    }

    /// Decodes one escape sequence; the current character is the backslash.
    fn read_escape(&mut self) -> LexResult<char> {
        self.advance();
        let Some(c) = self.advance() else {
            return Err((
                LexErrorKind::UnterminatedString,
                "Unterminated string literal.".to_string(),
            ));
        };
        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            '\\' => Ok('\\'),
            '"' => Ok('"'),
            '\'' => Ok('\''),
            '0' => Ok('\0'),
            'u' => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = self.peek().and_then(|d| d.to_digit(16)).ok_or_else(|| {
                        (
                            LexErrorKind::InvalidEscapeSequence,
                            "Invalid unicode escape: four hex digits expected.".to_string(),
                        )
                    })?;
                    self.advance();
                    code = code * 16 + digit;
                }
                char::from_u32(code).ok_or_else(|| {
                    (
                        LexErrorKind::InvalidEscapeSequence,
                        format!("Invalid unicode escape '\\u{code:04X}'."),
                    )
                })
            }
            other => Err((
                LexErrorKind::InvalidEscapeSequence,
                format!("Invalid escape sequence '\\{other}'."),
            )),
        }
    }

    /// integer -> fraction -> exponent
    fn read_number(&mut self) -> Token {
        let mut text = String::new();
        let mut kind = TokenKind::IntegerLiteral;
        self.read_digits(&mut text);

        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
            kind = TokenKind::DecimalLiteral;
        }

        if let Some(e @ ('e' | 'E')) = self.peek() {
            text.push(e);
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return self.error_token((
                    LexErrorKind::ExponentDigitExpected,
                    "Decimal digit expected in exponent.".to_string(),
                ));
            }
            self.read_digits(&mut text);
            kind = TokenKind::RealLiteral;
        }

        self.make_token(kind, Some(text))
    }

    fn read_digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_punctuation(&mut self, first: char) -> Token {
        let kind = match (first, self.peek_at(1)) {
            (':', Some(':')) => TokenKind::ColonColon,
            ('=', Some('=')) => TokenKind::EqualsEquals,
            ('=', Some('>')) => TokenKind::EqualsGreaterThan,
            ('!', Some('=')) => TokenKind::ExclamationEquals,
            ('<', Some('=')) => TokenKind::LessThanEquals,
            ('<', Some('<')) => TokenKind::LessThanLessThan,
            ('>', Some('=')) => TokenKind::GreaterThanEquals,
            ('|', Some('|')) => TokenKind::BarBar,
            ('&', Some('&')) => TokenKind::AmpersandAmpersand,
            ('?', Some('?')) => TokenKind::QuestionQuestion,
            ('#', Some('[')) => TokenKind::HashOpenBracket,
            _ => {
                self.advance();
                return self.make_token(TokenKind::Char(first), None);
            }
        };
        self.advance();
        self.advance();
        self.make_token(kind, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .lex()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .collect()
    }

    fn assert_kinds(input: &str, expected: Vec<TokenKind>) {
        let kinds: Vec<TokenKind> = significant(input).into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, expected);
    }

    #[test]
    fn test_eof() {
        assert_kinds("", vec![TokenKind::Eof]);
    }

    #[test]
    fn test_single_char_tokens() {
        assert_kinds(
            "{}[]<>:=,$.",
            vec![
                TokenKind::Char('{'),
                TokenKind::Char('}'),
                TokenKind::Char('['),
                TokenKind::Char(']'),
                TokenKind::Char('<'),
                TokenKind::Char('>'),
                TokenKind::Char(':'),
                TokenKind::Char('='),
                TokenKind::Char(','),
                TokenKind::Char('$'),
                TokenKind::Char('.'),
                TokenKind::Eof,
            ],
        );
    }

    #[test]
    fn test_multi_char_operators() {
        assert_kinds(
            ":: == => != <= << >= || && ?? #[",
            vec![
                TokenKind::ColonColon,
                TokenKind::EqualsEquals,
                TokenKind::EqualsGreaterThan,
                TokenKind::ExclamationEquals,
                TokenKind::LessThanEquals,
                TokenKind::LessThanLessThan,
                TokenKind::GreaterThanEquals,
                TokenKind::BarBar,
                TokenKind::AmpersandAmpersand,
                TokenKind::QuestionQuestion,
                TokenKind::HashOpenBracket,
                TokenKind::Eof,
            ],
        );
    }

    #[test]
    fn test_object_head() {
        let tokens = significant("a0:Person{");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text(), "a0");
        assert!(tokens[1].is_char(':'));
        assert_eq!(tokens[2].text(), "Person");
        assert!(tokens[3].is_char('{'));
    }

    #[test]
    fn test_identifiers() {
        let tokens = significant("foo bar_123 _baz @class @");
        assert_eq!(tokens[0].text(), "foo");
        assert_eq!(tokens[1].text(), "bar_123");
        assert_eq!(tokens[2].text(), "_baz");
        assert_eq!(tokens[3].kind, TokenKind::VerbatimIdentifier);
        assert_eq!(tokens[3].text(), "class");
        assert!(tokens[4].is_char('@'));
    }

    #[test]
    fn test_numbers() {
        let tokens = significant("123 45.67 1e10 2.5E-3 7.");
        assert_eq!(tokens[0].kind, TokenKind::IntegerLiteral);
        assert_eq!(tokens[0].text(), "123");
        assert_eq!(tokens[1].kind, TokenKind::DecimalLiteral);
        assert_eq!(tokens[1].text(), "45.67");
        assert_eq!(tokens[2].kind, TokenKind::RealLiteral);
        assert_eq!(tokens[2].text(), "1e10");
        assert_eq!(tokens[3].kind, TokenKind::RealLiteral);
        assert_eq!(tokens[3].text(), "2.5E-3");
        // a dot not followed by a digit is not part of the number
        assert_eq!(tokens[4].kind, TokenKind::IntegerLiteral);
        assert!(tokens[5].is_char('.'));
    }

    #[test]
    fn test_exponent_without_digits_is_an_error() {
        let tokens = significant("1e+x");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Error(LexErrorKind::ExponentDigitExpected)
        );
        assert!(tokens[0].is_error());
    }

    #[test]
    fn test_strings_with_escapes() {
        let tokens = significant(r#""a\"b\\c\n\t\'\0\u0041""#);
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text(), "a\"b\\c\n\t'\0A");
    }

    #[test]
    fn test_invalid_escapes() {
        let tokens = significant(r#""\q""#);
        assert_eq!(
            tokens[0].kind,
            TokenKind::Error(LexErrorKind::InvalidEscapeSequence)
        );
        let tokens = significant(r#""\u00G1""#);
        assert_eq!(
            tokens[0].kind,
            TokenKind::Error(LexErrorKind::InvalidEscapeSequence)
        );
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = significant("\"abc");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Error(LexErrorKind::UnterminatedString)
        );
        assert_eq!(tokens[0].text(), "Unterminated string literal.");
        let tokens = significant("\"abc\ndef\"");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Error(LexErrorKind::UnterminatedString)
        );
    }

    #[test]
    fn test_verbatim_string() {
        let tokens = significant("@\"C:\\dir\\\"\"quoted\"\"\nnext\"");
        assert_eq!(tokens[0].kind, TokenKind::VerbatimStringLiteral);
        assert_eq!(tokens[0].text(), "C:\\dir\\\"quoted\"\nnext");
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    #[test]
    fn test_char_literals() {
        let tokens = significant(r"'x' '\n' '' 'ab'");
        assert_eq!(tokens[0].kind, TokenKind::CharLiteral);
        assert_eq!(tokens[0].text(), "x");
        assert_eq!(tokens[1].text(), "\n");
        assert_eq!(
            tokens[2].kind,
            TokenKind::Error(LexErrorKind::InvalidCharLiteral)
        );
    }

    #[test]
    fn test_comments_and_whitespace() {
        let kinds: Vec<TokenKind> = Lexer::new(" // note\n/* block\n */x")
            .lex()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Whitespace,
                TokenKind::SingleLineComment,
                TokenKind::NewLine,
                TokenKind::MultiLineComment,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_comment() {
        let tokens = significant("/* never closed");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Error(LexErrorKind::UnterminatedComment)
        );
    }

    #[test]
    fn test_positions() {
        let tokens = significant("a\r\n  bb\n\"é\" c");
        assert_eq!(tokens[0].start_pos, TextPosition::new(1, 1));
        assert_eq!(tokens[1].start_pos, TextPosition::new(2, 3));
        assert_eq!(tokens[1].end_pos, TextPosition::new(2, 5));
        assert_eq!(tokens[1].start_offset, 5);
        assert_eq!(tokens[1].length, 2);
        assert_eq!(tokens[2].start_pos, TextPosition::new(3, 1));
        // 'é' is two bytes but one column
        assert_eq!(tokens[2].length, 4);
        assert_eq!(tokens[3].start_pos, TextPosition::new(3, 5));
        assert_eq!(tokens[3].start_offset, 13);
    }

    #[test]
    fn test_newline_tokens() {
        let newlines = Lexer::new("\r\n\n\r\u{2028}")
            .lex()
            .into_iter()
            .filter(|t| t.kind == TokenKind::NewLine)
            .count();
        assert_eq!(newlines, 4);
    }

    #[test]
    fn test_alias_block() {
        let tokens = significant(r#"<a0 = "http://example.com/ns", a1 = @"urn:x">"#);
        assert!(tokens[0].is_char('<'));
        assert_eq!(tokens[1].text(), "a0");
        assert!(tokens[2].is_char('='));
        assert_eq!(tokens[3].text(), "http://example.com/ns");
        assert!(tokens[4].is_char(','));
        assert_eq!(tokens[7].kind, TokenKind::VerbatimStringLiteral);
        assert!(tokens[8].is_char('>'));
    }
}
