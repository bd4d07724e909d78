//! Syntax front end of Glint.
//!
//! For now this is the lexer: it turns source text into [`Token`]s, with
//! literal values already materialized on a [`glint_vm::Vm`].

pub mod diagnostic;
pub mod lex;
pub mod token;

pub use diagnostic::{Diagnostic, Diagnostics, EscapeKind, LexErrorKind};
pub use lex::{tokenize, Lexer};
pub use token::{Token, TokenKind};
