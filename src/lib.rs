//! appraisal-scoring: goal measurement and scoring configuration
//!
//! A goal in an appraisal is scored from a small, ordered set of weighted
//! measurements combined by a user-authored formula. This crate holds the
//! logic behind that configuration:
//! - Raw form input to typed measurement drafts
//! - Whole-unit measurement validation
//! - The ordered measurement set, weight budget and placeholder renumbering
//! - A sandboxed nom-based formula parser and evaluator over `M1..Mn`
//! - Outcome resolution and the goal scoring session
//!
//! Measurement data types live in the `measure_types` crate so storage and
//! presentation layers can depend on them without pulling in the engine.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod form;
pub mod formula;
pub mod manager;
pub mod resolve;
pub mod session;
pub mod telemetry;
pub mod validator;

// Re-export commonly used types
pub use config::{PolicyLoader, ScoringPolicy, SubmissionGate, WeightBudgetMode};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity, SourceSpan};
pub use error::{ScoringError, ScoringResult};
pub use form::MeasurementForm;
pub use formula::{
    weighted_sum_formula, CompiledFormula, FormulaEngine, FormulaError, FormulaLimits,
    PlaceholderValues, Scope,
};
pub use manager::{
    ChangeReceipt, ManagerError, MeasurementManager, MeasurementSet, Renumbering, WeightBudget,
};
pub use resolve::{resolve_outcome, Binding, MeasurementOutcome, Outcomes, ResolveError};
pub use session::{GoalScore, GoalScoring, ScoringState, SubmitError};
pub use validator::{
    is_valid, validate_draft, FieldError, FieldWarning, MeasurementValidator, ValidatedMeasurement,
    ValidationReport,
};

pub use measure_types::{
    ConfigDraft, Measurement, MeasurementConfig, MeasurementDraft, MeasurementId,
    MeasurementPatch, MeasurementType,
};
