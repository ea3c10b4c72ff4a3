//! Unified Diagnostics Module
//!
//! Single diagnostic type used by validation, the measurement manager and the
//! formula engine so the presentation layer renders every problem the same way.

use serde::{Deserialize, Serialize};

/// Diagnostic severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

/// Diagnostic codes for categorizing issues
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticCode {
    // =========================================================================
    // Measurement field errors
    // =========================================================================
    MissingField,
    InvalidValue,
    InvalidRange,
    ContradictoryField,
    WeightOutOfRange,

    // =========================================================================
    // Measurement warnings
    // =========================================================================
    MissingUnit,
    TargetOutsideBounds,
    IndistinctOptions,

    // =========================================================================
    // Weight budget
    // =========================================================================
    WeightBudgetExceeded,
    WeightBudgetIncomplete,

    // =========================================================================
    // Formula errors
    // =========================================================================
    SyntaxError,
    FormulaTooComplex,
    PlaceholderOutOfRange,
    UnknownIdentifier,
    UnknownFunction,
    WrongArity,
    EvaluationFailed,

    // =========================================================================
    // Formula hints
    // =========================================================================
    FormulaStale,
    PlaceholderUnused,
}

/// Source location span inside a formula
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceSpan {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Create a span from byte offsets (requires source text for line/col calculation)
    pub fn from_byte_offset(source: &str, start: usize, end: usize) -> Self {
        let (start_line, start_col) = byte_to_line_col(source, start);
        let (end_line, end_col) = byte_to_line_col(source, end);
        Self::new(start_line, start_col, end_line, end_col)
    }
}

/// Convert byte offset to line and column
fn byte_to_line_col(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 1u32;

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

/// A diagnostic message with optional location and the field it concerns
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    /// Form field the diagnostic points at (e.g. `weight`, `optionA`)
    pub field: Option<String>,
    pub span: Option<SourceSpan>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            field: None,
            span: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
            field: None,
            span: None,
        }
    }

    /// Create a hint diagnostic
    pub fn hint(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Hint,
            code,
            message: message.into(),
            field: None,
            span: None,
        }
    }

    /// Add source span
    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach the form field this diagnostic concerns
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }

    /// Check if this is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }

    /// Check if this blocks a score from being computed
    pub fn blocks_scoring(&self) -> bool {
        self.is_error()
            && matches!(
                self.code,
                DiagnosticCode::SyntaxError
                    | DiagnosticCode::FormulaTooComplex
                    | DiagnosticCode::PlaceholderOutOfRange
                    | DiagnosticCode::UnknownIdentifier
                    | DiagnosticCode::UnknownFunction
                    | DiagnosticCode::WrongArity
                    | DiagnosticCode::EvaluationFailed
            )
    }
}

// =============================================================================
// Convenience Builders
// =============================================================================

/// Warn that the weight budget is exceeded
pub fn weight_exceeded_warning(total: rust_decimal::Decimal) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticCode::WeightBudgetExceeded,
        format!("measurement weights sum to {}%, above the 100% budget", total),
    )
    .with_field("weight")
}

/// Hint that the formula was written against a different measurement layout
pub fn stale_formula_hint() -> Diagnostic {
    Diagnostic::hint(
        DiagnosticCode::FormulaStale,
        "the measurement layout changed since the formula was last reviewed; \
         placeholders may now refer to different measurements",
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let diag = Diagnostic::error(DiagnosticCode::SyntaxError, "unexpected token");
        assert!(diag.is_error());
        assert!(diag.blocks_scoring());
        assert_eq!(diag.message, "unexpected token");
    }

    #[test]
    fn test_field_error_does_not_block_scoring() {
        let diag = Diagnostic::error(DiagnosticCode::MissingField, "min is required")
            .with_field("min");
        assert!(diag.is_error());
        assert!(!diag.blocks_scoring());
        assert_eq!(diag.field.as_deref(), Some("min"));
    }

    #[test]
    fn test_warning_not_error() {
        let diag = weight_exceeded_warning(rust_decimal::Decimal::new(120, 0));
        assert!(!diag.is_error());
        assert!(diag.is_warning());
        assert!(diag.message.contains("120%"));
    }

    #[test]
    fn test_byte_to_line_col() {
        let source = "M1 +\nM2 *\nM3";
        assert_eq!(byte_to_line_col(source, 0), (1, 1));
        assert_eq!(byte_to_line_col(source, 3), (1, 4));
        assert_eq!(byte_to_line_col(source, 5), (2, 1));
        assert_eq!(byte_to_line_col(source, 10), (3, 1));
    }

    #[test]
    fn test_span_from_offsets() {
        let span = SourceSpan::from_byte_offset("M1 + M9", 5, 7);
        assert_eq!(span, SourceSpan::new(1, 6, 1, 8));
    }
}
