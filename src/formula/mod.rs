//! Formula expression engine
//!
//! Binds measurements to positional placeholders (`M1..Mn`) and evaluates a
//! user-authored expression to a single score.
//!
//! ## Pipeline
//!
//! ```text
//! Source → length check → Parser (depth-limited)
//!                                      ↓
//!                                     Expr
//!                                      ↓
//!                     CompiledFormula (static function/arity checks)
//!                                      ↓
//!              reference check against a Scope (placeholders, variables)
//!                                      ↓
//!                               Evaluator → f64
//! ```
//!
//! The formula text is end-user input, so the engine only understands its own
//! grammar and only reads values through [`Scope`].

pub mod ast;
pub mod evaluator;
pub mod parser;

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticCode, SourceSpan};

pub use ast::{parse_placeholder, placeholder_name, Builtin, Expr, Span};
pub use evaluator::Scope;

/// Variable bound to a measurement's raw value inside a custom sub-expression
pub const SUBJECT_VARIABLE: &str = "x";

// =============================================================================
// ERRORS
// =============================================================================

/// Formula failure; the goal has no score until the formula or inputs change
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("formula is {length} characters long, the limit is {limit}")]
    TooLong { length: usize, limit: usize },

    #[error("formula nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("{name} is out of range: the goal has {count} measurement(s)")]
    PlaceholderOutOfRange {
        name: String,
        index: usize,
        count: usize,
        span: Span,
    },

    #[error("unknown identifier '{name}'")]
    UnknownIdentifier { name: String, span: Span },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String, span: Span },

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: &'static str,
        found: usize,
        span: Span,
    },

    #[error("no value supplied for {name}")]
    UnboundPlaceholder { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("formula produced a non-finite result")]
    NonFiniteResult,
}

impl FormulaError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            FormulaError::Empty | FormulaError::Syntax { .. } => DiagnosticCode::SyntaxError,
            FormulaError::TooLong { .. } | FormulaError::TooDeep { .. } => {
                DiagnosticCode::FormulaTooComplex
            }
            FormulaError::PlaceholderOutOfRange { .. } => DiagnosticCode::PlaceholderOutOfRange,
            FormulaError::UnknownIdentifier { .. } => DiagnosticCode::UnknownIdentifier,
            FormulaError::UnknownFunction { .. } => DiagnosticCode::UnknownFunction,
            FormulaError::WrongArity { .. } => DiagnosticCode::WrongArity,
            FormulaError::UnboundPlaceholder { .. }
            | FormulaError::DivisionByZero
            | FormulaError::NonFiniteResult => DiagnosticCode::EvaluationFailed,
        }
    }

    fn span(&self) -> Option<Span> {
        match self {
            FormulaError::Syntax { position, .. } => Some(Span::new(*position, *position)),
            FormulaError::PlaceholderOutOfRange { span, .. }
            | FormulaError::UnknownIdentifier { span, .. }
            | FormulaError::UnknownFunction { span, .. }
            | FormulaError::WrongArity { span, .. } => Some(*span),
            _ => None,
        }
    }

    /// Render as a diagnostic located in `source`
    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        let diag = Diagnostic::error(self.code(), self.to_string()).with_field("formula");
        match self.span() {
            Some(span) => {
                diag.with_span(SourceSpan::from_byte_offset(source, span.start, span.end))
            }
            None => diag,
        }
    }
}

// =============================================================================
// LIMITS
// =============================================================================

/// Input bounds on a formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormulaLimits {
    /// Checked before parsing starts
    pub max_length: usize,
    /// Deepest nesting of parentheses, unary prefixes, `?:` branches and call
    /// arguments; enforced by the parser as it descends
    pub max_depth: usize,
}

impl Default for FormulaLimits {
    fn default() -> Self {
        Self {
            max_length: 1024,
            max_depth: 32,
        }
    }
}

impl FormulaLimits {
    pub fn check_length(&self, source: &str) -> Result<(), FormulaError> {
        let length = source.chars().count();
        if length > self.max_length {
            return Err(FormulaError::TooLong {
                length,
                limit: self.max_length,
            });
        }
        Ok(())
    }
}

// =============================================================================
// SCOPES
// =============================================================================

/// Positional values for `M1..Mn`; a slot may be empty until its outcome is known
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceholderValues {
    values: Vec<Option<f64>>,
}

impl PlaceholderValues {
    /// `count` empty slots, one per measurement
    pub fn with_count(count: usize) -> Self {
        Self {
            values: vec![None; count],
        }
    }

    /// Build from `("M1", value)` pairs against a set of `count` measurements
    pub fn from_named<'a>(
        count: usize,
        pairs: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, FormulaError> {
        let mut values = Self::with_count(count);
        for (name, value) in pairs {
            let index = parse_placeholder(name).ok_or_else(|| FormulaError::UnknownIdentifier {
                name: name.to_string(),
                span: Span::default(),
            })?;
            values.set(index, value)?;
        }
        Ok(values)
    }

    /// Set `M{index}` (1-based)
    pub fn set(&mut self, index: usize, value: f64) -> Result<(), FormulaError> {
        let count = self.values.len();
        match index.checked_sub(1).and_then(|i| self.values.get_mut(i)) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(FormulaError::PlaceholderOutOfRange {
                name: placeholder_name(index),
                index,
                count,
                span: Span::default(),
            }),
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        index
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .copied()
            .flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<f64> for PlaceholderValues {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(Some).collect(),
        }
    }
}

impl Scope for PlaceholderValues {
    fn placeholder_count(&self) -> usize {
        self.values.len()
    }

    fn placeholder(&self, index: usize) -> Option<f64> {
        self.get(index)
    }
}

/// Scope of a custom measurement's sub-expression: only `x` is bound
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubjectScope {
    pub value: f64,
}

impl Scope for SubjectScope {
    fn placeholder_count(&self) -> usize {
        0
    }

    fn placeholder(&self, _index: usize) -> Option<f64> {
        None
    }

    fn variable(&self, name: &str) -> Option<f64> {
        (name == SUBJECT_VARIABLE).then_some(self.value)
    }
}

// =============================================================================
// COMPILED FORMULA
// =============================================================================

/// A parsed formula with its references collected
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFormula {
    source: String,
    expr: Expr,
    placeholders: Vec<(usize, Span)>,
    variables: Vec<(String, Span)>,
}

impl CompiledFormula {
    fn new(source: &str, expr: Expr) -> Result<Self, FormulaError> {
        let mut placeholders = Vec::new();
        let mut variables = Vec::new();
        let mut call_error = None;

        expr.walk(&mut |node| match node {
            Expr::Placeholder { index, span } => placeholders.push((*index, *span)),
            Expr::Variable { name, span } => variables.push((name.clone(), *span)),
            Expr::Call {
                function,
                args,
                span,
            } if call_error.is_none() => {
                call_error = match Builtin::from_name(function) {
                    None => Some(FormulaError::UnknownFunction {
                        name: function.clone(),
                        span: *span,
                    }),
                    Some(b) if !b.accepts(args.len()) => Some(FormulaError::WrongArity {
                        name: function.clone(),
                        expected: b.arity_label(),
                        found: args.len(),
                        span: *span,
                    }),
                    Some(_) => None,
                };
            }
            _ => {}
        });

        if let Some(err) = call_error {
            return Err(err);
        }

        Ok(Self {
            source: source.to_string(),
            expr,
            placeholders,
            variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Source text covered by `span`
    fn text(&self, span: Span) -> Option<String> {
        self.source.get(span.start..span.end).map(str::to_string)
    }

    /// Distinct placeholder indices referenced anywhere in the formula
    pub fn placeholder_indices(&self) -> BTreeSet<usize> {
        self.placeholders.iter().map(|(i, _)| *i).collect()
    }

    /// True when the formula uses exactly `M1..=Mn`, no gaps and nothing beyond
    pub fn references_exactly(&self, count: usize) -> bool {
        self.placeholder_indices() == (1..=count).collect()
    }

    /// Every reference the formula makes that `count` placeholders and the
    /// `binds` predicate cannot satisfy, in source order
    pub fn reference_errors(
        &self,
        count: usize,
        binds: impl Fn(&str) -> bool,
    ) -> Vec<FormulaError> {
        let mut errors: Vec<(Span, FormulaError)> = self
            .placeholders
            .iter()
            .filter(|(index, _)| *index == 0 || *index > count)
            .map(|(index, span)| {
                (
                    *span,
                    FormulaError::PlaceholderOutOfRange {
                        name: self.text(*span).unwrap_or_else(|| placeholder_name(*index)),
                        index: *index,
                        count,
                        span: *span,
                    },
                )
            })
            .chain(
                self.variables
                    .iter()
                    .filter(|(name, _)| !binds(name.as_str()))
                    .map(|(name, span)| {
                        (
                            *span,
                            FormulaError::UnknownIdentifier {
                                name: name.clone(),
                                span: *span,
                            },
                        )
                    }),
            )
            .collect();
        errors.sort_by_key(|(span, _)| span.start);
        errors.into_iter().map(|(_, e)| e).collect()
    }

    /// First unresolved reference, if any
    pub fn check_references(
        &self,
        count: usize,
        binds: impl Fn(&str) -> bool,
    ) -> Result<(), FormulaError> {
        match self.reference_errors(count, binds).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Check every reference against `scope`, then evaluate
    pub fn evaluate(&self, scope: &dyn Scope) -> Result<f64, FormulaError> {
        self.check_references(scope.placeholder_count(), |name| scope.binds(name))?;
        evaluator::evaluate(&self.expr, scope)
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Stateless front door to the formula pipeline
#[derive(Debug, Clone, Default)]
pub struct FormulaEngine {
    limits: FormulaLimits,
}

impl FormulaEngine {
    pub fn new(limits: FormulaLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &FormulaLimits {
        &self.limits
    }

    /// Parse and statically check a formula without binding it to anything
    pub fn compile(&self, source: &str) -> Result<CompiledFormula, FormulaError> {
        if source.trim().is_empty() {
            return Err(FormulaError::Empty);
        }
        self.limits.check_length(source)?;
        let expr = parser::parse_formula(source, self.limits.max_depth)?;
        CompiledFormula::new(source, expr)
    }

    /// Compile a goal formula and check it against `measurement_count` placeholders
    pub fn check_goal_formula(
        &self,
        source: &str,
        measurement_count: usize,
    ) -> Result<CompiledFormula, FormulaError> {
        let compiled = self.compile(source)?;
        compiled.check_references(measurement_count, |_| false)?;
        Ok(compiled)
    }

    /// Compile a custom measurement's sub-expression, which may only use `x`
    pub fn check_subject_expression(&self, source: &str) -> Result<CompiledFormula, FormulaError> {
        let compiled = self.compile(source)?;
        compiled.check_references(0, |name| name == SUBJECT_VARIABLE)?;
        Ok(compiled)
    }

    /// One-shot evaluation of `source` against `scope`
    pub fn evaluate(&self, source: &str, scope: &dyn Scope) -> Result<f64, FormulaError> {
        self.compile(source)?.evaluate(scope)
    }

    /// Every problem with a goal formula, plus hints for unused placeholders
    pub fn diagnostics(&self, source: &str, measurement_count: usize) -> Vec<Diagnostic> {
        let compiled = match self.compile(source) {
            Ok(c) => c,
            Err(err) => return vec![err.to_diagnostic(source)],
        };

        let mut diagnostics: Vec<Diagnostic> = compiled
            .reference_errors(measurement_count, |_| false)
            .iter()
            .map(|e| e.to_diagnostic(source))
            .collect();

        let used = compiled.placeholder_indices();
        for index in (1..=measurement_count).filter(|i| !used.contains(i)) {
            diagnostics.push(
                Diagnostic::hint(
                    DiagnosticCode::PlaceholderUnused,
                    format!("{} is not used by the formula", placeholder_name(index)),
                )
                .with_field("formula"),
            );
        }
        diagnostics
    }
}

/// Weighted-sum formula over the given weights, e.g. `(M1*0.6)+(M2*0.4)`
///
/// Returns `None` for an empty set.
pub fn weighted_sum_formula(weights: &[Decimal]) -> Option<String> {
    if weights.is_empty() {
        return None;
    }
    let terms: Vec<String> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| {
            format!(
                "({}*{})",
                placeholder_name(i + 1),
                (*w / Decimal::ONE_HUNDRED).normalize()
            )
        })
        .collect();
    Some(terms.join("+"))
}

// =============================================================================
// TESTS
// =============================================================================
