use std::fmt;

use crate::token::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Pipeline stage a diagnostic originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Hoist,
    Link,
    Scope,
    Layout,
    Type,
    Analysis,
    Codegen,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Hoist => "hoist",
            Stage::Link => "link",
            Stage::Scope => "scope",
            Stage::Layout => "layout",
            Stage::Type => "type",
            Stage::Analysis => "analysis",
            Stage::Codegen => "codegen",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub stage: Stage,
    pub message: String,
    pub module: String,
    pub row: usize,
    pub column: usize,
    pub length: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}[{}]: {}",
            self.module, self.row, self.column, self.severity, self.stage, self.message
        )
    }
}

/// Sink that every pass appends to. Filtering by module happens at the call
/// site, not through shared state.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::debug!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn report(
        &mut self,
        severity: Severity,
        stage: Stage,
        module: &str,
        span: Span,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic {
            severity,
            stage,
            message: message.into(),
            module: module.to_string(),
            row: span.line,
            column: span.column,
            length: span.length,
        });
    }

    pub fn error(&mut self, stage: Stage, module: &str, span: Span, message: impl Into<String>) {
        self.report(Severity::Error, stage, module, span, message);
    }

    pub fn warning(&mut self, stage: Stage, module: &str, span: Span, message: impl Into<String>) {
        self.report(Severity::Warning, stage, module, span, message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn for_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.entries.iter().filter(move |d| d.module == module)
    }

    pub fn has_errors_for(&self, module: &str) -> bool {
        self.for_module(module)
            .any(|d| d.severity == Severity::Error)
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
