//! `kindling`: a small dynamically-typed scripting language with two
//! interchangeable executors over one value model — a tree-walking
//! evaluator and a bytecode stack VM (SPEC_FULL.md §2).

pub mod ast;
pub mod bytecode;
pub mod context;
pub mod diagnostics;
pub mod heap;
pub mod interpreter;
pub mod io;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod token;
pub mod types;
pub mod value;

pub use crate::context::Context;
pub use crate::diagnostics::{Category, Diagnostic, DiagnosticSink};
pub use crate::heap::{Heap, HeapId};
pub use crate::io::{CollectSink, PrintSink, StdoutSink};
pub use crate::value::Value;

use crate::lexer::Lexer;
use crate::parser::Parser;

/// Which executor a source program runs on. Both share [`Context`] and the
/// [`Value`] model; they differ only in how a parsed program turns into
/// effects, per SPEC_FULL.md §4.G-§4.I.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    TreeWalk,
    Vm,
}

/// Parses `source` and resolves lexical scopes, reporting every lexer,
/// parser, and resolver diagnostic into `sink`. Returns the resolved AST
/// regardless of how many diagnostics fired, so a caller can still choose to
/// run a partially-broken program (matching the language's "never abort"
/// error policy, SPEC_FULL.md §9).
pub fn parse(source: &str, sink: &mut DiagnosticSink) -> Vec<ast::Stmt> {
    let tokens = Lexer::new(source).tokenize(sink);
    let mut program = Parser::new(tokens, sink).parse_program();
    resolver::resolve(&mut program, sink);
    program
}

/// Runs a fully parsed-and-resolved program against `ctx` on the requested
/// backend, writing `print`/`println` output to `out`. `debug` enables
/// verbose execution tracing to stderr without changing evaluation semantics
/// (SPEC_FULL.md §4.M).
pub fn run_program(program: &[ast::Stmt], ctx: &mut Context, sink: &mut DiagnosticSink, out: &mut dyn PrintSink, backend: Backend, debug: bool) {
    match backend {
        Backend::TreeWalk => {
            interpreter::Evaluator::new(ctx, sink, out).with_trace(debug).run(program);
        }
        Backend::Vm => {
            let compiled = bytecode::compile(program, ctx, sink);
            bytecode::Vm::new(compiled, ctx, sink, out).with_trace(debug).run();
        }
    }
}

/// Lexes, parses, resolves, and runs `source` in one call — the REPL's and
/// the file-runner's shared entry point (SPEC_FULL.md §4.M).
pub fn run_source(source: &str, ctx: &mut Context, sink: &mut DiagnosticSink, out: &mut dyn PrintSink, backend: Backend, debug: bool) {
    let program = parse(source, sink);
    run_program(&program, ctx, sink, out, backend, debug);
}
