//! The Glint lexer.
//!
//! `logos` classifies each token by its first bytes. Literals, comments and
//! shebang lines are then finished by hand straight from the remaining source
//! bytes, since they need state (nesting depth, escape decoding, line counting)
//! that a regex can't carry.

#[cfg(test)]
mod test;

use std::ops::Range;

use glint_util::utf8;
use glint_vm::config::ErrorReport;
use glint_vm::{Buffer, Value, Vm};
use logos::Logos;
use tracing::trace;

use crate::diagnostic::{Diagnostic, Diagnostics, EscapeKind, LexErrorKind};
use crate::token::{Token, TokenKind};

/// Module name used in error reports unless told otherwise.
pub const DEFAULT_MODULE: &str = "main";

/// Turns source text into [`Token`]s with one token of lookahead.
///
/// Literal values are allocated on the borrowed [`Vm`] as they are lexed.
/// Errors never stop the lexer: each one produces a token, goes into
/// [`Lexer::diagnostics`], and is forwarded to the VM's error callback.
pub struct Lexer<'src, 'vm> {
    vm: &'vm mut Vm,
    inner: logos::Lexer<'src, TokenKind>,
    module: String,
    /// Line of the byte at the scan position.
    line: u32,

    previous: Option<Token<'src>>,
    current: Option<Token<'src>>,
    next: Option<Token<'src>>,

    diagnostics: Diagnostics,
}

impl<'src, 'vm> Lexer<'src, 'vm> {
    pub fn new(vm: &'vm mut Vm, source: &'src str) -> Self {
        Lexer {
            vm,
            inner: TokenKind::lexer(source),
            module: DEFAULT_MODULE.to_owned(),
            line: 1,
            previous: None,
            current: None,
            next: None,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Name the module being lexed, for error reports.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn source(&self) -> &'src str {
        self.inner.source()
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The line the scanner is currently on.
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn previous(&self) -> Option<&Token<'src>> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&Token<'src>> {
        self.current.as_ref()
    }

    /// The lookahead token: the one returned by the last call to
    /// [`Lexer::next_token`].
    pub fn peek(&self) -> Option<&Token<'src>> {
        self.next.as_ref()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Whether any error has been reported. Never goes back to `false`.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    pub fn finish(self) -> Diagnostics {
        self.diagnostics
    }

    /// Shift the token window (next becomes current, current becomes
    /// previous) and lex a new lookahead token, which is returned.
    ///
    /// After the end of input this keeps returning [`TokenKind::Eof`].
    pub fn next_token(&mut self) -> Token<'src> {
        self.previous = self.current.take();
        self.current = self.next.take();

        let token = match self.current {
            Some(current) if current.is_eof() => current,
            _ => self.scan(),
        };
        trace!(kind = ?token.kind, line = token.line, text = token.text, "token");
        self.next = Some(token);
        token
    }

    fn scan(&mut self) -> Token<'src> {
        loop {
            let kind = match self.inner.next() {
                Some(kind) => kind,
                None => return self.eof(),
            };

            return match kind {
                TokenKind::Line => {
                    let token = self.token(kind, Value::Null);
                    self.line += 1;
                    token
                }
                TokenKind::Hash if self.at_shebang() => {
                    self.skip_line();
                    continue;
                }
                TokenKind::BlockComment => {
                    self.skip_block_comment();
                    continue;
                }
                TokenKind::Number => self.lex_number(),
                TokenKind::String => self.lex_string(),
                TokenKind::Ident => self.lex_name(kind),
                kind if kind.is_keyword() => self.lex_name(kind),
                TokenKind::Error => self.lex_invalid(),
                kind => self.token(kind, Value::Null),
            };
        }
    }

    fn token(&self, kind: TokenKind, value: Value) -> Token<'src> {
        Token {
            kind,
            text: self.inner.slice(),
            offset: self.inner.span().start,
            line: self.line,
            value,
            error: None,
        }
    }

    fn eof(&self) -> Token<'src> {
        Token {
            kind: TokenKind::Eof,
            text: "",
            offset: self.inner.source().len(),
            line: self.line,
            value: Value::Null,
            error: None,
        }
    }

    /// Record an error and forward it to the host.
    fn report(&mut self, kind: LexErrorKind, span: Range<usize>) {
        let message = format!("Error: {}", kind);
        self.vm.report_error(ErrorReport::Compile {
            module: &self.module,
            line: self.line,
            message: &message,
        });
        self.diagnostics.push(Diagnostic {
            kind,
            line: self.line,
            span,
        });
    }

    /// Report an error covering the token scanned so far.
    fn report_here(&mut self, kind: LexErrorKind) {
        let span = self.inner.span();
        self.report(kind, span)
    }

    fn alloc_string(&mut self, bytes: &[u8]) -> Value {
        match self.vm.new_string(bytes) {
            Ok(value) => value,
            Err(_) => {
                self.report_here(LexErrorKind::OutOfMemory);
                Value::Null
            }
        }
    }

    // === Comments ===

    fn at_shebang(&self) -> bool {
        self.line == 1 && self.inner.remainder().starts_with("!/")
    }

    fn skip_line(&mut self) {
        let rest = self.inner.remainder();
        self.inner.bump(rest.find('\n').unwrap_or(rest.len()));
    }

    fn skip_block_comment(&mut self) {
        let bytes = self.inner.remainder().as_bytes();
        let mut depth = 1usize;
        let mut i = 0;

        while depth > 0 {
            match (bytes.get(i), bytes.get(i + 1)) {
                (None, _) => break,
                (Some(b'/'), Some(b'*')) => {
                    depth += 1;
                    i += 2;
                }
                (Some(b'*'), Some(b'/')) => {
                    depth -= 1;
                    i += 2;
                }
                (Some(&c), _) => {
                    if c == b'\n' {
                        self.line += 1;
                    }
                    i += 1;
                }
            }
        }

        self.inner.bump(i);
        if depth > 0 {
            self.report_here(LexErrorKind::UnterminatedBlockComment);
        }
    }

    // === Numbers ===

    fn lex_number(&mut self) -> Token<'src> {
        let leading = self.inner.slice().as_bytes();
        let negative = leading[0] == b'-';
        let first_digit = leading[leading.len() - 1];
        let rest = self.inner.remainder().as_bytes();

        if first_digit == b'0' && rest.first() == Some(&b'x') {
            let digits = count_while(&rest[1..], u8::is_ascii_hexdigit);
            self.inner.bump(1 + digits);
            return self.finish_hex(negative, digits);
        }

        let mut i = count_while(rest, u8::is_ascii_digit);
        if rest.get(i) == Some(&b'.') && rest.get(i + 1).map_or(false, u8::is_ascii_digit) {
            i += 1;
            i += count_while(&rest[i..], u8::is_ascii_digit);
        }

        let mut exponent_complete = true;
        if matches!(rest.get(i), Some(b'e' | b'E')) {
            i += 1;
            if matches!(rest.get(i), Some(b'+' | b'-')) {
                i += 1;
            }
            let digits = count_while(&rest[i..], u8::is_ascii_digit);
            exponent_complete = digits > 0;
            i += digits;
        }
        self.inner.bump(i);

        if !exponent_complete {
            self.report_here(LexErrorKind::UnterminatedExponent);
            return self.token(TokenKind::Number, Value::Number(0.0));
        }
        let text = self.inner.slice();
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() && !underflowed(text, n) => {
                self.token(TokenKind::Number, Value::Number(n))
            }
            _ => self.number_out_of_range(),
        }
    }

    fn finish_hex(&mut self, negative: bool, digits: usize) -> Token<'src> {
        if digits == 0 {
            self.report_here(LexErrorKind::InvalidNumber);
            return self.token(TokenKind::Number, Value::Number(0.0));
        }

        let text = self.inner.slice();
        let value = i128::from_str_radix(&text[text.len() - digits..], 16)
            .ok()
            .map(|n| if negative { -n } else { n })
            .and_then(|n| i64::try_from(n).ok());
        match value {
            Some(n) => self.token(TokenKind::Number, Value::Number(n as f64)),
            None => self.number_out_of_range(),
        }
    }

    fn number_out_of_range(&mut self) -> Token<'src> {
        self.report_here(LexErrorKind::NumberRange);
        Token {
            error: Some(LexErrorKind::NumberRange),
            ..self.token(TokenKind::Error, Value::Number(0.0))
        }
    }

    // === Identifiers ===

    fn lex_name(&mut self, kind: TokenKind) -> Token<'src> {
        let value = self.alloc_string(self.inner.slice().as_bytes());
        self.token(kind, value)
    }

    // === Strings ===

    fn lex_string(&mut self) -> Token<'src> {
        let mut scanner = StringScanner {
            bytes: self.inner.remainder().as_bytes(),
            pos: 0,
            escape_start: 0,
            contents: Buffer::new(),
            out_of_memory: false,
        };

        loop {
            let c = match scanner.bytes.get(scanner.pos) {
                Some(&c) => c,
                None => {
                    self.inner.bump(scanner.pos);
                    self.report_here(LexErrorKind::UnterminatedString);
                    break;
                }
            };
            scanner.pos += 1;

            match c {
                b'"' => {
                    self.inner.bump(scanner.pos);
                    break;
                }
                b'\r' => {}
                b'\\' => {
                    scanner.escape_start = scanner.pos - 1;
                    self.lex_escape(&mut scanner)
                }
                c => {
                    if c == b'\n' {
                        self.line += 1;
                    }
                    scanner.push(self.vm, &[c]);
                }
            }
        }

        let value = if scanner.out_of_memory {
            self.report_here(LexErrorKind::OutOfMemory);
            Value::Null
        } else {
            self.alloc_string(scanner.contents.as_slice())
        };
        scanner.contents.clear(self.vm.heap_mut());
        self.token(TokenKind::String, value)
    }

    /// Decode one escape sequence. The backslash has been consumed.
    fn lex_escape(&mut self, scanner: &mut StringScanner<'src>) {
        let c = match scanner.bytes.get(scanner.pos) {
            Some(&c) => c,
            // the string loop reports the missing quote
            None => return,
        };
        scanner.pos += 1;

        let byte = match c {
            b'"' => b'"',
            b'\\' => b'\\',
            b'%' => b'%',
            b'0' => 0,
            b'a' => 0x07,
            b'b' => 0x08,
            b'e' => 0x1b,
            b'f' => 0x0c,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'v' => 0x0b,
            b'x' => match self.lex_hex_escape(scanner, 2, EscapeKind::Byte) {
                Some(n) => n as u8,
                None => return,
            },
            b'u' | b'U' => {
                let digits = if c == b'u' { 4 } else { 8 };
                let code_point = self.lex_hex_escape(scanner, digits, EscapeKind::Unicode);
                if let Some(code_point) = code_point {
                    self.push_code_point(scanner, code_point);
                }
                return;
            }
            c => {
                if c == b'\n' {
                    self.line += 1;
                }
                let span = self.escape_span(scanner);
                self.report(LexErrorKind::InvalidEscapeChar(c), span);
                return;
            }
        };
        scanner.push(self.vm, &[byte]);
    }

    /// Read exactly `digits` hex digits. On failure the offending byte is left
    /// in place and `None` is returned.
    fn lex_hex_escape(
        &mut self,
        scanner: &mut StringScanner<'src>,
        digits: usize,
        kind: EscapeKind,
    ) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..digits {
            let digit = match scanner.bytes.get(scanner.pos) {
                None | Some(b'"') => {
                    let span = self.escape_span(scanner);
                    self.report(LexErrorKind::IncompleteEscape(kind), span);
                    return None;
                }
                Some(&c) => (c as char).to_digit(16),
            };
            match digit {
                Some(d) => {
                    value = (value << 4) | d;
                    scanner.pos += 1;
                }
                None => {
                    let span = self.escape_span(scanner);
                    self.report(LexErrorKind::InvalidEscape(kind), span);
                    return None;
                }
            }
        }
        Some(value)
    }

    fn push_code_point(&mut self, scanner: &mut StringScanner<'src>, code_point: u32) {
        let len = utf8::encoded_len(code_point);
        if len == 0 {
            let span = self.escape_span(scanner);
            self.report(LexErrorKind::InvalidEscape(EscapeKind::Unicode), span);
            return;
        }
        let mut encoded = [0u8; 4];
        utf8::encode(code_point, &mut encoded);
        scanner.push(self.vm, &encoded[..len]);
    }

    /// Span from the backslash of the escape being decoded to the scan
    /// position.
    fn escape_span(&self, scanner: &StringScanner<'src>) -> Range<usize> {
        let base = self.inner.span().end;
        base + scanner.escape_start..base + scanner.pos
    }

    // === Invalid input ===

    fn lex_invalid(&mut self) -> Token<'src> {
        let span = self.inner.span();
        let source = self.inner.source();
        let mut first = None;

        for (offset, &b) in source.as_bytes()[span.clone()].iter().enumerate() {
            let kind = if (0x20..0x7f).contains(&b) {
                LexErrorKind::InvalidCharacter(b as char)
            } else {
                LexErrorKind::InvalidByte(b)
            };
            let at = span.start + offset;
            self.report(kind, at..at + 1);
            first.get_or_insert(kind);
        }

        Token {
            kind: TokenKind::Error,
            text: "",
            offset: span.start,
            line: self.line,
            value: Value::Null,
            error: first,
        }
    }
}

impl<'src, 'vm> Iterator for Lexer<'src, 'vm> {
    type Item = Token<'src>;

    /// Yields every token up to and including the first EOF.
    fn next(&mut self) -> Option<Self::Item> {
        match self.next {
            Some(token) if token.is_eof() => None,
            _ => Some(self.next_token()),
        }
    }
}

/// A literal with a non-zero mantissa that still came out as zero.
fn underflowed(text: &str, n: f64) -> bool {
    let mantissa = text.split(|c| c == 'e' || c == 'E').next().unwrap_or(text);
    n == 0.0 && mantissa.bytes().any(|b| (b'1'..=b'9').contains(&b))
}

/// Lex all of `source`, returning the tokens (ending with EOF) and every error
/// reported along the way.
pub fn tokenize<'src>(vm: &mut Vm, source: &'src str) -> (Vec<Token<'src>>, Diagnostics) {
    let mut lexer = Lexer::new(vm, source);
    let tokens = lexer.by_ref().collect();
    (tokens, lexer.finish())
}

/// State of a string literal being decoded.
struct StringScanner<'src> {
    /// Source after the opening quote.
    bytes: &'src [u8],
    pos: usize,
    /// Position of the backslash of the last escape.
    escape_start: usize,
    contents: Buffer<u8>,
    out_of_memory: bool,
}

impl<'src> StringScanner<'src> {
    fn push(&mut self, vm: &mut Vm, bytes: &[u8]) {
        if self.out_of_memory {
            return;
        }
        if self.contents.extend_from_slice(vm.heap_mut(), bytes).is_err() {
            self.out_of_memory = true;
        }
    }
}

fn count_while(bytes: &[u8], pred: impl Fn(&u8) -> bool) -> usize {
    bytes.iter().take_while(|b| pred(b)).count()
}
