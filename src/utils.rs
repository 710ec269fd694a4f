
/// Characters that may begin a plain identifier.
pub fn is_identifier_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

/// Characters that may continue a plain identifier.
pub fn is_identifier_part(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_part),
        _ => false,
    }
}

/// Identifiers with a fixed meaning in value position.
pub fn is_keyword(s: &str) -> bool {
    matches!(s, "null" | "true" | "false")
}

pub fn is_newline(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// Appends `s` as a quoted string literal, escaping whatever the lexer would not
/// read back verbatim.
pub fn push_string_literal(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            // control and line-separator characters are all in the BMP
            c if c.is_control() || is_newline(c) => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
