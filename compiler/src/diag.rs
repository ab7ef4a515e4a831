// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all compiler phases.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `E0500`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Syntax
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error

    // Names and units
    pub const E0100: DiagCode = DiagCode("E0100"); // identifier not found
    pub const E0101: DiagCode = DiagCode("E0101"); // identifier already exists
    pub const E0102: DiagCode = DiagCode("E0102"); // unknown import
    pub const E0103: DiagCode = DiagCode("E0103"); // self import
    pub const E0104: DiagCode = DiagCode("E0104"); // recursive namespace detected

    // Types
    pub const E0200: DiagCode = DiagCode("E0200"); // type mismatch
    pub const E0201: DiagCode = DiagCode("E0201"); // wrong argument count
    pub const E0202: DiagCode = DiagCode("E0202"); // wrong type argument count
    pub const E0203: DiagCode = DiagCode("E0203"); // cannot infer type parameter
    pub const E0204: DiagCode = DiagCode("E0204"); // type argument kind mismatch
    pub const E0205: DiagCode = DiagCode("E0205"); // too many elements for Fin bound
    pub const E0206: DiagCode = DiagCode("E0206"); // mutable collection needs type arguments
    pub const E0207: DiagCode = DiagCode("E0207"); // unknown member
    pub const E0208: DiagCode = DiagCode("E0208"); // assignment to immutable binding
    pub const E0209: DiagCode = DiagCode("E0209"); // match case problems
    pub const E0210: DiagCode = DiagCode("E0210"); // operator not defined for operand types
    pub const E0211: DiagCode = DiagCode("E0211"); // value is not callable / iterable

    // Recursion
    pub const E0300: DiagCode = DiagCode("E0300"); // recursive record detected
    pub const E0301: DiagCode = DiagCode("E0301"); // recursive function detected

    // Feature and shape bans
    pub const E0400: DiagCode = DiagCode("E0400"); // function type in banned position
    pub const E0401: DiagCode = DiagCode("E0401"); // higher-order nesting too deep
    pub const E0402: DiagCode = DiagCode("E0402"); // nested definition
    pub const E0403: DiagCode = DiagCode("E0403"); // function value in banned position

    // Cost
    pub const E0500: DiagCode = DiagCode("E0500"); // cost over limit

    // Internal
    pub const E0600: DiagCode = DiagCode("E0600"); // type system bug
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Location ─────────────────────────────────────────────────────────────

/// Where a diagnostic points. Errors synthesized by the pipeline itself
/// (recursion detection, namespace cycles) are not located in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Source(Span),
    NotInSource,
}

impl From<Span> for Location {
    fn from(span: Span) -> Self {
        Location::Source(span)
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A compiler diagnostic emitted by any phase.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub location: Location,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, or related spans.
    pub fn new(level: DiagLevel, location: impl Into<Location>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            location: location.into(),
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    /// Shorthand for an error-level diagnostic with a code.
    pub fn error(code: DiagCode, location: impl Into<Location>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, location, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related span.
    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }

    /// Render with a `unit:line:col` prefix resolved against `source`.
    pub fn render(&self, unit: &str, source: &str) -> String {
        let prefix = match self.location {
            Location::Source(span) => {
                let (line, col) = line_col(source, span.start);
                format!("{}:{}:{}", unit, line, col)
            }
            Location::NotInSource => format!("{}:<generated>", unit),
        };
        format!("{}: {}", prefix, self)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        (0..1).into()
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::new(DiagLevel::Warning, dummy_span(), "unused value")
            .with_code(DiagCode("W0001"));
        assert_eq!(format!("{d}"), "warning[W0001]: unused value");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(codes::E0200, dummy_span(), "type mismatch")
            .with_hint("annotate the binding")
            .with_related(dummy_span(), "declared here");

        assert_eq!(d.code, Some(codes::E0200));
        assert_eq!(d.hint.as_deref(), Some("annotate the binding"));
        assert_eq!(d.related_spans.len(), 1);
    }

    #[test]
    fn render_located_and_generated() {
        let source = "val x = 1\nval y = z\n";
        let d = Diagnostic::error(codes::E0100, Span::from(18..19), "identifier 'z' not found");
        assert_eq!(
            d.render("main", source),
            "main:2:9: error[E0100]: identifier 'z' not found"
        );

        let g = Diagnostic::error(codes::E0301, Location::NotInSource, "recursive function detected: f");
        assert_eq!(
            g.render("main", source),
            "main:<generated>: error[E0301]: recursive function detected: f"
        );
    }
}
