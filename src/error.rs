//! Error handling for the scoring engine
//!
//! Each concern has its own thiserror enum next to its code; [`ScoringError`]
//! gathers them for callers that drive a whole goal.

use thiserror::Error;

use crate::formula::FormulaError;
use crate::manager::ManagerError;
use crate::resolve::ResolveError;
use crate::session::SubmitError;
use crate::validator::ValidationReport;

/// Main error type for goal scoring
#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationReport),

    #[error("Measurement error: {0}")]
    Manager(#[from] ManagerError),

    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    #[error("Outcome error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("No formula has been set for this goal")]
    NoFormula,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for scoring operations
pub type ScoringResult<T> = Result<T, ScoringError>;

impl ScoringError {
    /// Whether the caller can fix this by editing the goal (as opposed to a
    /// corrupt snapshot)
    pub fn is_user_correctable(&self) -> bool {
        !matches!(self, ScoringError::Serialization(_))
    }
}
