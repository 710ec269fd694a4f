//! Output formatting for the save path.

/// Controls the layout of saved documents.
///
/// # Examples
///
/// ```rust
/// use sdata_core::SaveOptions;
///
/// let options = SaveOptions::new();
/// assert_eq!(options.indent, "\t");
///
/// let options = SaveOptions::spaces(2).with_newline("\r\n");
/// assert_eq!(options.indent, "  ");
/// assert_eq!(options.newline, "\r\n");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    /// One level of indentation.
    pub indent: String,
    pub newline: String,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            indent: "\t".to_string(),
            newline: "\n".to_string(),
        }
    }
}

impl SaveOptions {
    /// Tab indentation and `\n` line breaks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indents with `n` spaces per level.
    #[must_use]
    pub fn spaces(n: usize) -> Self {
        Self::default().with_indent(" ".repeat(n))
    }

    #[must_use]
    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    #[must_use]
    pub fn with_newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = newline.into();
        self
    }
}
