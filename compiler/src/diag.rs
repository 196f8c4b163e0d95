// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic type used by the frontend, the directive
// parser and the lowering engine. Every unsupported construct surfaces as a
// single error-level `Diagnostic` that aborts the run.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0301`).
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

/// Stable code table.
///
/// E01xx frontend, E02xx directives, E03xx lowering.
pub mod codes {
    use super::DiagCode;

    pub const UNKNOWN_NAME: DiagCode = DiagCode("E0100");
    pub const DUPLICATE_DEFINITION: DiagCode = DiagCode("E0101");
    pub const UNKNOWN_FUNCTION: DiagCode = DiagCode("E0102");
    pub const UNKNOWN_TOP: DiagCode = DiagCode("E0103");

    pub const MALFORMED_DIRECTIVE: DiagCode = DiagCode("E0200");
    pub const INCOMPLETE_DIRECTIVE: DiagCode = DiagCode("E0201");

    pub const UNSUPPORTED_STATEMENT: DiagCode = DiagCode("E0300");
    pub const UNSUPPORTED_EXPRESSION: DiagCode = DiagCode("E0301");
    pub const DO_WHILE: DiagCode = DiagCode("E0302");
    pub const MULTIPLE_RETURNS: DiagCode = DiagCode("E0303");
    pub const BREAK_OUTSIDE_LOOP: DiagCode = DiagCode("E0304");
    pub const BAD_INDEX_BASE: DiagCode = DiagCode("E0305");
    pub const UNREGISTERED_STRUCT: DiagCode = DiagCode("E0306");
    pub const UNSUPPORTED_SIZEOF: DiagCode = DiagCode("E0307");
    pub const UNSUPPORTED_TYPE: DiagCode = DiagCode("E0308");
    pub const UNSUPPORTED_FOR_INIT: DiagCode = DiagCode("E0309");
    pub const MISSING_STORAGE: DiagCode = DiagCode("E0310");
    pub const NO_VALUE: DiagCode = DiagCode("E0311");
    pub const UNTYPED_VALUE: DiagCode = DiagCode("E0312");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Cause record ─────────────────────────────────────────────────────────

/// One link in a cause chain, innermost construct first.
#[derive(Debug, Clone)]
pub struct CauseRecord {
    pub message: String,
    pub span: Option<Span>,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any stage.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
    pub cause_chain: Vec<CauseRecord>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, hint, related spans, or causes.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
            cause_chain: Vec::new(),
        }
    }

    /// Shorthand for an error-level diagnostic carrying a code.
    pub fn error(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
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

    /// Attach a cause record to the chain.
    pub fn with_cause(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.cause_chain.push(CauseRecord {
            message: message.into(),
            span,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
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
        for cause in &self.cause_chain {
            write!(f, "\n  in: {}", cause.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, dummy_span(), "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::error(codes::DO_WHILE, dummy_span(), "do-while loops are unsupported");
        assert_eq!(
            format!("{d}"),
            "error[E0302]: do-while loops are unsupported"
        );
    }

    #[test]
    fn display_with_cause_and_hint() {
        let d = Diagnostic::error(codes::UNSUPPORTED_EXPRESSION, dummy_span(), "`a && b`")
            .with_cause("function `top`", None)
            .with_hint("rewrite as nested ifs");
        assert_eq!(
            format!("{d}"),
            "error[E0301]: `a && b`\n  in: function `top`\n  hint: rewrite as nested ifs"
        );
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::new(DiagLevel::Warning, dummy_span(), "pragma ignored")
            .with_code(DiagCode("E0200"))
            .with_hint("check the directive spelling")
            .with_related(dummy_span(), "enclosing loop here")
            .with_cause("block scan", Some(dummy_span()));

        assert_eq!(d.code, Some(DiagCode("E0200")));
        assert_eq!(d.hint.as_deref(), Some("check the directive spelling"));
        assert_eq!(d.related_spans.len(), 1);
        assert_eq!(d.cause_chain.len(), 1);
        assert!(!d.is_error());
    }
}
