use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use kindling::{Backend, Context, DiagnosticSink, StdoutSink};

struct Args {
    file: Option<String>,
    debug: bool,
    vm: bool,
}

fn parse_args(raw: &[String]) -> Args {
    let mut file = None;
    let mut debug = false;
    let mut vm = false;
    for arg in raw {
        match arg.as_str() {
            "--debug" | "-d" => debug = true,
            "--vm" => vm = true,
            _ => file = Some(arg.clone()),
        }
    }
    Args { file, debug, vm }
}

fn main() -> ExitCode {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&raw);
    let backend = if args.vm { Backend::Vm } else { Backend::TreeWalk };

    match args.file {
        Some(path) => run_file(&path, backend, args.debug),
        None => run_repl(backend, args.debug),
    }
}

fn run_file(path: &str, backend: Backend, debug: bool) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error reading {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut ctx = Context::new();
    let mut sink = DiagnosticSink::new();
    let mut out = StdoutSink;
    kindling::run_source(&source, &mut ctx, &mut sink, &mut out, backend, debug);
    report_diagnostics(&sink);
    ExitCode::SUCCESS
}

/// Reads stdin one brace-balanced chunk at a time, persisting `Context`
/// across entries so a `func`/`let` from one line stays visible to the next
/// (SPEC_FULL.md §4.M).
fn run_repl(backend: Backend, debug: bool) -> ExitCode {
    let mut ctx = Context::new();
    let mut out = StdoutSink;
    let stdin = io::stdin();
    let mut depth: i32 = 0;
    let mut chunk = String::new();

    loop {
        if depth == 0 {
            print!("kindling> ");
        } else {
            print!("...     > ");
        }
        let _ = io::stdout().flush();

        let mut line = String::new();
        let bytes_read = match stdin.lock().read_line(&mut line) {
            Ok(n) => n,
            Err(err) => {
                eprintln!("error reading stdin: {err}");
                return ExitCode::FAILURE;
            }
        };
        if bytes_read == 0 {
            break;
        }

        depth += brace_delta(&line);
        chunk.push_str(&line);

        if depth <= 0 {
            depth = 0;
            let mut sink = DiagnosticSink::new();
            kindling::run_source(&chunk, &mut ctx, &mut sink, &mut out, backend, debug);
            report_diagnostics(&sink);
            chunk.clear();
        }
    }
    ExitCode::SUCCESS
}

fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    for c in line.chars() {
        match c {
            '{' => delta += 1,
            '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn report_diagnostics(sink: &DiagnosticSink) {
    for d in sink.iter() {
        eprintln!("{d}");
    }
}
