use std::ops::Range;

use glint_vm::Value;
use logos::Logos;

use crate::diagnostic::LexErrorKind;

/// The kind of a [`Token`].
///
/// Most kinds are matched directly by `logos`. Literals and comments are only
/// recognized by their first few bytes here, [`Lexer`](crate::Lexer) scans the
/// rest by hand.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // === Punctuation ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("^")]
    Caret,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("~")]
    Tilde,
    #[token("?")]
    Question,
    #[token("*")]
    Star,
    #[token("%")]
    Percent,
    #[token("/")]
    Slash,
    /// `#`. A `#!/` at the very start of the source is a comment instead.
    #[token("#")]
    Hash,

    // === Operators ===
    #[token("|")]
    Pipe,
    #[token("||")]
    PipePipe,
    #[token("&")]
    Amp,
    #[token("&&")]
    AmpAmp,
    #[token("=")]
    Eq,
    #[token("==")]
    EqEq,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Lt,
    #[token("<<")]
    LtLt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">>")]
    GtGt,
    #[token(">=")]
    GtEq,
    #[token(".")]
    Dot,
    #[token("..")]
    DotDot,
    #[token("...")]
    Ellipsis,

    /// Line break. Newlines end statements, so they are tokens.
    #[token("\n")]
    Line,

    // === Keywords ===
    #[token("break")]
    BreakKw,
    #[token("continue")]
    ContinueKw,
    #[token("else")]
    ElseKw,
    #[token("false")]
    FalseKw,
    #[token("for")]
    ForKw,
    #[token("if")]
    IfKw,
    #[token("null")]
    NullKw,
    #[token("return")]
    ReturnKw,
    #[token("true")]
    TrueKw,
    #[token("while")]
    WhileKw,

    // === Identifiers ===
    #[regex("[a-zA-Z][a-zA-Z0-9]*")]
    Ident,

    // === Literals ===
    /// Number literal. A `-` right before the first digit belongs to it.
    #[regex("-?[0-9]")]
    Number,
    /// String literal, matched on its opening quote.
    #[token("\"")]
    String,

    /// Opening `/*` of a block comment. Never emitted.
    #[token("/*")]
    BlockComment,

    /// End of input.
    Eof,

    /// Anything that doesn't match
    #[error]
    #[regex(r"[ \t\r]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            BreakKw
                | ContinueKw
                | ElseKw
                | FalseKw
                | ForKw
                | IfKw
                | NullKw
                | ReturnKw
                | TrueKw
                | WhileKw
        )
    }

    /// Kinds whose tokens carry a literal [`Value`].
    pub fn has_value(self) -> bool {
        matches!(
            self,
            TokenKind::Ident | TokenKind::Number | TokenKind::String
        ) || self.is_keyword()
    }
}

/// A lexed token.
///
/// `text` borrows the source, `value` refers into the
/// [`Vm`](glint_vm::Vm) that lexed it.
#[derive(Debug, Clone, Copy)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// The source text of this token. Empty for [`TokenKind::Eof`] and for
    /// error tokens on invalid bytes.
    pub text: &'src str,
    /// Byte offset of the token in the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: u32,
    /// Decoded literal: a number, or a string holding the decoded contents of
    /// a string literal or the name of an identifier or keyword. `Null` for
    /// everything else.
    pub value: Value,
    /// Why this is an [`TokenKind::Error`] token.
    pub error: Option<LexErrorKind>,
}

impl<'src> Token<'src> {
    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.text.len()
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}
