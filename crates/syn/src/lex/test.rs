use std::cell::RefCell;
use std::fmt::Write;
use std::ptr::NonNull;
use std::rc::Rc;

use expect_test::expect;
use glint_vm::{Configuration, HostAllocator, MiMalloc, Value, Vm};
use pretty_assertions::assert_eq;
use test_env_log::test;

use super::*;
use crate::diagnostic::{EscapeKind, LexErrorKind};
use crate::token::TokenKind::{self, *};

/// One line per token: kind, text, line, and the decoded number or string
/// literal if there is one.
fn dump(vm: &Vm, tokens: &[Token]) -> std::string::String {
    let mut out = std::string::String::new();
    for token in tokens {
        write!(out, "{:?} {:?} @{}", token.kind, token.text, token.line).unwrap();
        match token.kind {
            Number | Error => {
                if let Value::Number(n) = token.value {
                    write!(out, " = {}", n).unwrap();
                }
            }
            String => {
                if let Some(bytes) = vm.string_bytes(token.value) {
                    write!(out, " = \"{}\"", bytes.escape_ascii()).unwrap();
                }
            }
            _ => {}
        }
        if let Some(error) = token.error {
            write!(out, " !{:?}", error).unwrap();
        }
        out.push('\n');
    }
    out
}

fn assert_tokens(source: &str, expected: &str) {
    let mut vm = Vm::default();
    let (tokens, _) = tokenize(&mut vm, source);
    let result = dump(&vm, &tokens);
    let actual = result.trim();
    let expected = expected.trim();
    if actual != expected {
        let diff = colored_diff::PrettyDifference { actual, expected };
        panic!("token mismatch (< expected / > actual):\n{}", diff);
    }
}

fn kinds(source: &str) -> Vec<TokenKind> {
    let mut vm = Vm::default();
    let (tokens, _) = tokenize(&mut vm, source);
    tokens.iter().map(|t| t.kind).collect()
}

fn errors(source: &str) -> Vec<LexErrorKind> {
    let mut vm = Vm::default();
    let (_, diagnostics) = tokenize(&mut vm, source);
    diagnostics.iter().map(|d| d.kind).collect()
}

/// Lex a source holding a single string literal, returning its decoded bytes
/// and the errors it produced.
fn lex_string_literal(source: &str) -> (Vec<u8>, Vec<LexErrorKind>) {
    let mut vm = Vm::default();
    let (tokens, diagnostics) = tokenize(&mut vm, source);
    assert_eq!(tokens.len(), 2, "one string and EOF");
    assert_eq!(tokens[0].kind, String);
    let bytes = vm
        .string_bytes(tokens[0].value)
        .expect("string literals have a string value")
        .to_vec();
    (bytes, diagnostics.iter().map(|d| d.kind).collect())
}

// === Numbers ===

#[test]
fn test_decimal_number() {
    assert_tokens(
        "3.14",
        r#"
Number "3.14" @1 = 3.14
Eof "" @1
        "#,
    );
}

#[test]
fn test_negative_number_is_one_token() {
    assert_tokens(
        "-100.1",
        r#"
Number "-100.1" @1 = -100.1
Eof "" @1
        "#,
    );
}

#[test]
fn test_minus_fusion() {
    assert_tokens(
        "100 - 100",
        r#"
Number "100" @1 = 100
Minus "-" @1
Number "100" @1 = 100
Eof "" @1
        "#,
    );
    assert_tokens(
        "100 -100",
        r#"
Number "100" @1 = 100
Number "-100" @1 = -100
Eof "" @1
        "#,
    );
}

#[test]
fn test_hex_number() {
    assert_tokens(
        "0xdeadBEEF -0x10",
        r#"
Number "0xdeadBEEF" @1 = 3735928559
Number "-0x10" @1 = -16
Eof "" @1
        "#,
    );
}

#[test]
fn test_hex_number_range() {
    let mut vm = Vm::default();
    let (tokens, diagnostics) = tokenize(
        &mut vm,
        "0x7fffffffffffffff 0x8000000000000000 -0x8000000000000000",
    );
    expect![[r#"
        Number "0x7fffffffffffffff" @1 = 9223372036854776000
        Error "0x8000000000000000" @1 = 0 !NumberRange
        Number "-0x8000000000000000" @1 = -9223372036854776000
        Eof "" @1
    "#]]
    .assert_eq(&dump(&vm, &tokens));
    assert_eq!(tokens[0].value.as_number(), Some(i64::MAX as f64));
    assert_eq!(tokens[2].value.as_number(), Some(i64::MIN as f64));
    assert_eq!(
        diagnostics.into_vec(),
        vec![Diagnostic {
            kind: LexErrorKind::NumberRange,
            line: 1,
            span: 19..37,
        }]
    );
}

#[test]
fn test_decimal_forms() {
    assert_tokens(
        "1e3 2.5E-1 7e+2 1. 1.x",
        r#"
Number "1e3" @1 = 1000
Number "2.5E-1" @1 = 0.25
Number "7e+2" @1 = 700
Number "1" @1 = 1
Dot "." @1
Number "1" @1 = 1
Dot "." @1
Ident "x" @1
Eof "" @1
        "#,
    );
}

#[test]
fn test_decimal_range() {
    assert_tokens(
        "1e300000",
        r#"
Error "1e300000" @1 = 0 !NumberRange
Eof "" @1
        "#,
    );
    assert_eq!(errors("1e300000"), vec![LexErrorKind::NumberRange]);
}

#[test]
fn test_malformed_numbers() {
    assert_tokens(
        "1e 2 3e+ 0x 0xg",
        r#"
Number "1e" @1 = 0
Number "2" @1 = 2
Number "3e+" @1 = 0
Number "0x" @1 = 0
Number "0x" @1 = 0
Ident "g" @1
Eof "" @1
        "#,
    );
    assert_eq!(
        errors("1e 2 3e+ 0x 0xg"),
        vec![
            LexErrorKind::UnterminatedExponent,
            LexErrorKind::UnterminatedExponent,
            LexErrorKind::InvalidNumber,
            LexErrorKind::InvalidNumber,
        ]
    );
}

#[test]
fn test_decimal_number_range() {
    assert_tokens(
        "1e400 1e-400 0e-400 0.000",
        r#"
Error "1e400" @1 = 0 !NumberRange
Error "1e-400" @1 = 0 !NumberRange
Number "0e-400" @1 = 0
Number "0.000" @1 = 0
Eof "" @1
        "#,
    );
    assert_eq!(
        errors("1e400 1e-400 0e-400"),
        vec![LexErrorKind::NumberRange, LexErrorKind::NumberRange]
    );

    // subnormals are still representable
    let mut vm = Vm::default();
    let (tokens, diagnostics) = tokenize(&mut vm, "2.5e-320");
    assert_eq!(tokens[0].kind, Number);
    assert!(tokens[0].value.as_number().map_or(false, |n| n > 0.0));
    assert!(diagnostics.is_empty());
}

// === Punctuation, names and layout ===

#[test]
fn test_punctuation() {
    assert_eq!(
        kinds("( ) { } [ ] : , ^ + - ~ ? * % / #"),
        vec![
            LParen, RParen, LBrace, RBrace, LBracket, RBracket, Colon, Comma, Caret, Plus, Minus,
            Tilde, Question, Star, Percent, Slash, Hash, Eof
        ]
    );
}

#[test]
fn test_operators() {
    assert_eq!(
        kinds("| || & && = == ! != < << <= > >> >= . .. ..."),
        vec![
            Pipe, PipePipe, Amp, AmpAmp, Eq, EqEq, Bang, BangEq, Lt, LtLt, LtEq, Gt, GtGt, GtEq,
            Dot, DotDot, Ellipsis, Eof
        ]
    );
    assert_eq!(kinds("...."), vec![Ellipsis, Dot, Eof]);
    assert_eq!(kinds("a||b"), vec![Ident, PipePipe, Ident, Eof]);
}

#[test]
fn test_keywords_and_identifiers() {
    let source = "break continue else false for if null return true while iffy x1 While";
    assert_eq!(
        kinds(source),
        vec![
            BreakKw, ContinueKw, ElseKw, FalseKw, ForKw, IfKw, NullKw, ReturnKw, TrueKw, WhileKw,
            Ident, Ident, Ident, Eof
        ]
    );

    let mut vm = Vm::default();
    let (tokens, diagnostics) = tokenize(&mut vm, source);
    assert!(diagnostics.is_empty());
    for token in &tokens[..tokens.len() - 1] {
        assert!(token.kind.has_value());
        assert_eq!(
            vm.string_bytes(token.value),
            Some(token.text.as_bytes()),
            "names carry their text"
        );
    }
    assert!(tokens[tokens.len() - 1].value.is_null());
}

#[test]
fn test_lines() {
    assert_tokens(
        "a\nb\r\n\nc",
        r#"
Ident "a" @1
Line "\n" @1
Ident "b" @2
Line "\n" @2
Line "\n" @3
Ident "c" @4
Eof "" @4
        "#,
    );
}

#[test]
fn test_comments() {
    assert_tokens(
        "a // comment\n/* block /* nested */ still\n comment */ b // trailing",
        r#"
Ident "a" @1
Line "\n" @1
Ident "b" @3
Eof "" @3
        "#,
    );
}

#[test]
fn test_unterminated_block_comment() {
    let mut vm = Vm::default();
    let (tokens, diagnostics) = tokenize(&mut vm, "x /* /* */\n");
    assert_eq!(tokens.iter().map(|t| t.kind).collect::<Vec<_>>(), vec![Ident, Eof]);
    assert_eq!(
        diagnostics.into_vec(),
        vec![Diagnostic {
            kind: LexErrorKind::UnterminatedBlockComment,
            line: 2,
            span: 2..11,
        }]
    );
}

#[test]
fn test_shebang() {
    assert_tokens(
        "#!/usr/bin/env glint\nx",
        r#"
Line "\n" @1
Ident "x" @2
Eof "" @2
        "#,
    );
    assert_eq!(
        kinds("x\n#!/y"),
        vec![Ident, Line, Hash, Bang, Slash, Ident, Eof]
    );
}

#[test]
fn test_small_program() {
    let mut vm = Vm::default();
    let (tokens, diagnostics) = tokenize(&mut vm, "x = [1, 2]\nif x != null { return \"ok\" }");
    assert!(!diagnostics.has_errors());
    expect![[r#"
        Ident "x" @1
        Eq "=" @1
        LBracket "[" @1
        Number "1" @1 = 1
        Comma "," @1
        Number "2" @1 = 2
        RBracket "]" @1
        Line "\n" @1
        IfKw "if" @2
        Ident "x" @2
        BangEq "!=" @2
        NullKw "null" @2
        LBrace "{" @2
        ReturnKw "return" @2
        String "\"ok\"" @2 = "ok"
        RBrace "}" @2
        Eof "" @2
    "#]]
    .assert_eq(&dump(&vm, &tokens));
}

// === Strings ===

#[test]
fn test_plain_string() {
    let (bytes, errors) = lex_string_literal(r#""hello world""#);
    assert_eq!(bytes, b"hello world");
    assert!(errors.is_empty());

    let (bytes, _) = lex_string_literal(r#""""#);
    assert_eq!(bytes, b"");
}

#[test]
fn test_simple_escapes() {
    let (bytes, errors) = lex_string_literal(r#""\"\\\%\0\a\b\e\f\n\r\t\v""#);
    assert_eq!(
        bytes,
        vec![b'"', b'\\', b'%', 0, 0x07, 0x08, 0x1b, 0x0c, b'\n', b'\r', b'\t', 0x0b]
    );
    assert!(errors.is_empty());
}

#[test]
fn test_hex_and_unicode_escapes() {
    let (bytes, errors) = lex_string_literal(r#""\x41\x7eé\U0001F600""#);
    assert_eq!(bytes, "A~é😀".as_bytes());
    assert!(errors.is_empty());

    // surrogates are encoded as-is
    let (bytes, _) = lex_string_literal(r#""\ud800""#);
    assert_eq!(bytes, vec![0xed, 0xa0, 0x80]);
}

#[test]
fn test_bad_escapes() {
    let (bytes, errors) = lex_string_literal(r#""a\U00110000b""#);
    assert_eq!(bytes, b"ab");
    assert_eq!(errors, vec![LexErrorKind::InvalidEscape(EscapeKind::Unicode)]);

    let (bytes, errors) = lex_string_literal(r#""\q""#);
    assert_eq!(bytes, b"");
    assert_eq!(errors, vec![LexErrorKind::InvalidEscapeChar(b'q')]);

    // the closing quote is not eaten by the escape
    let (bytes, errors) = lex_string_literal(r#""\x4""#);
    assert_eq!(bytes, b"");
    assert_eq!(errors, vec![LexErrorKind::IncompleteEscape(EscapeKind::Byte)]);

    // the offending byte is kept as a plain character
    let (bytes, errors) = lex_string_literal(r#""\x4g""#);
    assert_eq!(bytes, b"g");
    assert_eq!(errors, vec![LexErrorKind::InvalidEscape(EscapeKind::Byte)]);

    let (bytes, errors) = lex_string_literal(r#""\u12""#);
    assert_eq!(bytes, b"");
    assert_eq!(errors, vec![LexErrorKind::IncompleteEscape(EscapeKind::Unicode)]);
}

#[test]
fn test_string_lines() {
    let mut vm = Vm::default();
    let (tokens, _) = tokenize(&mut vm, "\"a\r\nb\" c");
    assert_eq!(vm.string_bytes(tokens[0].value), Some(&b"a\nb"[..]));
    assert_eq!(tokens[0].line, 2);
    assert_eq!(tokens[1].kind, Ident);
    assert_eq!(tokens[1].line, 2);
}

#[test]
fn test_unterminated_string() {
    let (bytes, errors) = lex_string_literal("\"abc");
    assert_eq!(bytes, b"abc");
    assert_eq!(errors, vec![LexErrorKind::UnterminatedString]);

    let (bytes, errors) = lex_string_literal("\"abc\\");
    assert_eq!(bytes, b"abc");
    assert_eq!(errors, vec![LexErrorKind::UnterminatedString]);
}

#[test]
fn test_string_scratch_is_released() {
    let mut vm = Vm::default();
    let (tokens, _) = tokenize(&mut vm, r#""some fairly long string literal""#);
    let string = tokens[0].value.as_object().unwrap();
    vm.release(string).unwrap();
    assert_eq!(vm.heap().bytes_allocated(), 0, "only the string itself was left");
}

// === Invalid input ===

#[test]
fn test_invalid_characters() {
    assert_tokens(
        "a @ b",
        r#"
Ident "a" @1
Error "" @1 !InvalidCharacter('@')
Ident "b" @1
Eof "" @1
        "#,
    );

    let mut vm = Vm::default();
    let (_, diagnostics) = tokenize(&mut vm, "a @ b");
    assert_eq!(diagnostics.as_slice()[0].span, 2..3);

    assert_eq!(
        errors("x;_'"),
        vec![
            LexErrorKind::InvalidCharacter(';'),
            LexErrorKind::InvalidCharacter('_'),
            LexErrorKind::InvalidCharacter('\''),
        ]
    );
}

#[test]
fn test_invalid_bytes() {
    assert_eq!(
        errors("é"),
        vec![LexErrorKind::InvalidByte(0xc3), LexErrorKind::InvalidByte(0xa9)]
    );
    assert_eq!(errors("\u{1}"), vec![LexErrorKind::InvalidByte(0x01)]);
    assert_eq!(kinds("é x").last(), Some(&Eof));
}

#[test]
fn test_error_messages() {
    assert_eq!(LexErrorKind::InvalidCharacter('@').to_string(), "Invalid character '@'.");
    assert_eq!(LexErrorKind::InvalidByte(0xff).to_string(), "Invalid byte 0xff.");
    assert_eq!(LexErrorKind::NumberRange.to_string(), "Number literal was too large.");
    assert_eq!(
        LexErrorKind::InvalidEscapeChar(b'q').to_string(),
        "Invalid escape character 'q'."
    );
    assert_eq!(
        LexErrorKind::InvalidEscapeChar(b'\n').to_string(),
        "Invalid escape character '\\n'."
    );
    assert_eq!(
        LexErrorKind::IncompleteEscape(EscapeKind::Byte).to_string(),
        "Incomplete byte escape sequence."
    );
    assert_eq!(
        LexErrorKind::InvalidEscape(EscapeKind::Unicode).to_string(),
        "Invalid Unicode escape sequence."
    );
    let diagnostic = Diagnostic {
        kind: LexErrorKind::UnterminatedString,
        line: 3,
        span: 0..1,
    };
    assert_eq!(diagnostic.to_string(), "[line 3] Error: Unterminated string.");
}

#[test]
fn test_errors_reach_the_host() {
    let reports = Rc::new(RefCell::new(vec![]));
    let mut vm = Vm::new(Configuration::new().with_error_handler({
        let reports = reports.clone();
        move |report| {
            if let ErrorReport::Compile {
                module,
                line,
                message,
            } = report
            {
                reports
                    .borrow_mut()
                    .push(format!("{}:{}: {}", module, line, message));
            }
        }
    }));

    let mut lexer = Lexer::new(&mut vm, "\n\n@ \"x").with_module("test");
    let tokens: Vec<_> = lexer.by_ref().collect();
    assert_eq!(tokens.len(), 5);
    assert!(lexer.has_errors());
    assert_eq!(lexer.diagnostics().len(), 2);

    assert_eq!(
        &*reports.borrow(),
        &[
            "test:3: Error: Invalid character '@'.".to_owned(),
            "test:3: Error: Unterminated string.".to_owned(),
        ]
    );
}

// === The token window ===

#[test]
fn test_token_window() {
    let mut vm = Vm::default();
    let mut lexer = Lexer::new(&mut vm, "a b");
    assert!(lexer.peek().is_none());

    let a = lexer.next_token();
    assert_eq!(a.text, "a");
    assert_eq!(lexer.peek().map(|t| t.text), Some("a"));
    assert!(lexer.current().is_none());

    lexer.next_token();
    assert_eq!(lexer.current().map(|t| t.text), Some("a"));
    assert_eq!(lexer.peek().map(|t| t.text), Some("b"));
    assert!(lexer.previous().is_none());

    let eof = lexer.next_token();
    assert_eq!(eof.kind, Eof);
    assert_eq!(eof.offset, 3);
    assert_eq!(lexer.previous().map(|t| t.text), Some("a"));
    assert_eq!(lexer.current().map(|t| t.text), Some("b"));

    // EOF repeats forever
    for _ in 0..3 {
        assert_eq!(lexer.next_token().kind, Eof);
    }
    assert_eq!(lexer.current().map(|t| t.kind), Some(Eof));
    assert_eq!(lexer.previous().map(|t| t.kind), Some(Eof));
}

#[test]
fn test_iterator_stops_after_eof() {
    assert_eq!(kinds(""), vec![Eof]);
    assert_eq!(kinds("  \t "), vec![Eof]);

    let mut vm = Vm::default();
    let mut lexer = Lexer::new(&mut vm, "x");
    assert_eq!(lexer.by_ref().count(), 2);
    assert!(lexer.next().is_none());
    assert!(lexer.next().is_none());
}

#[test]
fn test_token_spans() {
    let mut vm = Vm::default();
    let (tokens, _) = tokenize(&mut vm, "ab  \"c\"");
    assert_eq!(tokens[0].span(), 0..2);
    assert_eq!(tokens[1].span(), 4..7);
    assert_eq!(tokens[2].span(), 7..7);
}

// === Allocation failure ===

/// Refuses every request for memory.
struct Exhausted;

impl HostAllocator for Exhausted {
    unsafe fn reallocate(
        &mut self,
        memory: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size > 0 {
            None
        } else {
            MiMalloc.reallocate(memory, 0)
        }
    }
}

#[test]
fn test_out_of_memory() {
    let mut vm = Vm::new(Configuration::new().with_allocator(Exhausted));
    let (tokens, diagnostics) = tokenize(&mut vm, "name \"text\" 1.5");

    assert_eq!(
        tokens.iter().map(|t| t.kind).collect::<Vec<_>>(),
        vec![Ident, String, Number, Eof]
    );
    assert!(tokens[0].value.is_null());
    assert!(tokens[1].value.is_null());
    assert_eq!(tokens[2].value.as_number(), Some(1.5));
    assert_eq!(
        diagnostics.iter().map(|d| d.kind).collect::<Vec<_>>(),
        vec![LexErrorKind::OutOfMemory, LexErrorKind::OutOfMemory]
    );
    assert_eq!(vm.heap().bytes_allocated(), 0);
}
