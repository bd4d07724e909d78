use clap::Parser as ClapParser;
use glint_syn::{Diagnostic, Lexer, Token, TokenKind};
use glint_vm::{Configuration, ErrorReport, Value, Vm};
use std::io::Read;
use std::process::ExitCode;
use text_lines::TextLines;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use unicode_width::UnicodeWidthStr;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::parse();

    let (module, input) = match read_input(&opt) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };
    debug!(module = %module, len = input.len(), "read input");

    let mut config = Configuration::new().with_write(|text| print!("{}", text));
    if let Some(size) = opt.initial_heap_size {
        config = config.with_initial_heap_size(size);
    }
    if opt.verbose_errors {
        config = config.with_error_handler(print_report);
    }
    let mut vm = Vm::new(config);

    let mut lexer = Lexer::new(&mut vm, &input).with_module(module.as_str());
    let tokens: Vec<Token> = lexer.by_ref().collect();
    let diagnostics = lexer.finish();

    if !opt.quiet {
        for token in &tokens {
            println!("{}", describe_token(&vm, token));
        }
    }

    let lines = TextLines::new(&input);
    for diagnostic in &diagnostics {
        eprint!("{}", render_diagnostic(&module, &input, &lines, diagnostic));
    }

    if diagnostics.has_errors() {
        eprintln!("{} error(s) in {}", diagnostics.len(), module);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[derive(clap::Parser)]
#[clap(about, version, author)]
struct Opt {
    /// Lex the given string as a Glint program.
    #[clap(short, long)]
    eval: Option<String>,

    /// Lex the given file as a Glint program.
    #[clap(short, long)]
    file: Option<String>,

    /// Bytes the VM may allocate before its first collection.
    #[clap(long)]
    initial_heap_size: Option<usize>,

    /// Don't print the token stream, only errors.
    #[clap(short, long)]
    quiet: bool,

    /// Also print every error as the VM's error callback receives it.
    #[clap(long)]
    verbose_errors: bool,
}

/// Returns the module name and the source text.
fn read_input(opt: &Opt) -> std::io::Result<(String, String)> {
    if let Some(e) = &opt.eval {
        Ok(("<eval>".to_owned(), e.clone()))
    } else if let Some(f) = &opt.file {
        let source = std::fs::read_to_string(f)?;
        Ok((f.clone(), source))
    } else {
        let mut s = String::new();
        std::io::stdin().lock().read_to_string(&mut s)?;
        Ok(("<stdin>".to_owned(), s))
    }
}

fn print_report(report: ErrorReport<'_>) {
    match report {
        ErrorReport::Compile {
            module,
            line,
            message,
        }
        | ErrorReport::StackTrace {
            module,
            line,
            message,
        } => eprintln!("{}:{}: {}", module, line, message),
        ErrorReport::Runtime { message } => eprintln!("{}", message),
    }
}

fn describe_token(vm: &Vm, token: &Token) -> String {
    let mut out = format!("{:>4} {:?} {:?}", token.line, token.kind, token.text);
    match token.value {
        Value::Number(n) => out.push_str(&format!(" = {}", n)),
        value @ Value::Object(_) if token.kind == TokenKind::String => {
            if let Some(bytes) = vm.string_bytes(value) {
                out.push_str(&format!(" = \"{}\"", bytes.escape_ascii()));
            }
        }
        _ => {}
    }
    out
}

/// Formats a diagnostic with the offending source line and a caret run under
/// its span.
fn render_diagnostic(
    module: &str,
    source: &str,
    lines: &TextLines,
    diagnostic: &Diagnostic,
) -> String {
    let start = floor_char_boundary(source, diagnostic.span.start.min(source.len()));
    let end = floor_char_boundary(source, diagnostic.span.end.min(source.len())).max(start);

    let line_index = lines.line_index(start);
    let line_start = lines.line_start(line_index);
    let line_end = lines.line_end(line_index);
    let text = source[line_start..line_end].trim_end_matches(['\n', '\r']);

    let column = source[line_start..start].width();
    let underline = source[start..end.min(line_start + text.len()).max(start)]
        .width()
        .max(1);

    format!(
        "{}:{}: Error: {}\n{:>5} | {}\n      | {}{}\n",
        module,
        diagnostic.line,
        diagnostic.kind,
        line_index + 1,
        text,
        " ".repeat(column),
        "^".repeat(underline)
    )
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
