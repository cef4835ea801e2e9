//! Structured, non-fatal diagnostics shared by every stage of the pipeline.

use std::fmt;

/// The seven diagnostic categories the language defines.
///
/// None of these ever abort evaluation; each stage reports through a
/// [`DiagnosticSink`] and falls back to a best-effort value (usually `Null`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Category {
    LexicalError,
    ParseError,
    NameError,
    TypeError,
    IndexError,
    DivisionByZero,
    StackFault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub category: Category,
    pub message: String,
    pub line: u32,
}

impl Diagnostic {
    pub fn new(category: Category, message: impl Into<String>, line: u32) -> Self {
        Self {
            category,
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}): {}", self.category, self.line, self.message)
    }
}

/// Collects diagnostics as they are reported.
///
/// Every stage of the pipeline (lexer, parser, resolver, evaluator, VM) takes
/// a `&mut DiagnosticSink` rather than returning `Result` — a diagnostic is
/// reported and execution continues, per the language's error policy.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, category: Category, message: impl Into<String>, line: u32) {
        self.diagnostics.push(Diagnostic::new(category, message, line));
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.diagnostics.iter().map(|d| d.category)
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl fmt::Display for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in &self.diagnostics {
            writeln!(f, "{d}")?;
        }
        Ok(())
    }
}
