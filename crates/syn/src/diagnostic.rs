use std::fmt;
use std::ops::Range;

/// Which kind of escape sequence went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EscapeKind {
    /// `\xHH`
    Byte,
    /// `\uHHHH` or `\UHHHHHHHH`
    Unicode,
}

impl fmt::Display for EscapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeKind::Byte => f.write_str("byte"),
            EscapeKind::Unicode => f.write_str("Unicode"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum LexErrorKind {
    #[error("Invalid character '{0}'.")]
    InvalidCharacter(char),
    #[error("Invalid byte 0x{0:x}.")]
    InvalidByte(u8),
    #[error("Number literal was too large.")]
    NumberRange,
    #[error("Invalid number.")]
    InvalidNumber,
    #[error("Unterminated scientific notation.")]
    UnterminatedExponent,
    #[error("Unterminated string.")]
    UnterminatedString,
    #[error("Unterminated block comment.")]
    UnterminatedBlockComment,
    #[error("Invalid escape character '{}'.", .0.escape_ascii())]
    InvalidEscapeChar(u8),
    #[error("Incomplete {0} escape sequence.")]
    IncompleteEscape(EscapeKind),
    #[error("Invalid {0} escape sequence.")]
    InvalidEscape(EscapeKind),
    #[error("Out of memory while building a literal.")]
    OutOfMemory,
}

/// A lexing error and where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: LexErrorKind,
    /// 1-based line the lexer was on when it noticed.
    pub line: u32,
    /// Byte range in the source.
    pub span: Range<usize>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error: {}", self.line, self.kind)
    }
}

/// Every [`Diagnostic`] reported while lexing one source, in order.
///
/// Nothing is ever removed, so once [`Diagnostics::has_errors`] turns true it
/// stays true.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic)
    }

    pub fn has_errors(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
