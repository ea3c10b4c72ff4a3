//! Goal scoring session
//!
//! Ties one goal's measurement set to its formula. The session is where the
//! two meet: it flags the formula as possibly stale whenever the layout
//! changes, derives the configuration state, applies the submission policy
//! and produces the final score.
//!
//! ```text
//! Empty ──add──▶ Configuring ──weights = 100──▶ WeightComplete
//!                                                      │
//!                                            formula covers M1..Mn
//!                                                      ▼
//!                                                  Scorable
//! ```
//!
//! State is recomputed from the current set and formula on every call; nothing
//! is cached.

use std::fmt;

use measure_types::{Measurement, MeasurementDraft, MeasurementId, MeasurementPatch};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ScoringPolicy, SubmissionGate};
use crate::diagnostics::{stale_formula_hint, weight_exceeded_warning, Diagnostic, DiagnosticCode};
use crate::error::{ScoringError, ScoringResult};
use crate::formula::{weighted_sum_formula, CompiledFormula, FormulaEngine, PlaceholderValues};
use crate::manager::{ChangeReceipt, ManagerError, MeasurementManager, MeasurementSet};
use crate::resolve::{bind_outcomes, Binding, Outcomes};
use crate::validator::MeasurementValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringState {
    /// No measurements yet
    Empty,
    /// Weights do not sum to 100
    Configuring,
    /// Weights sum to 100 but the formula is missing, invalid or does not use
    /// every measurement
    WeightComplete,
    Scorable,
}

impl fmt::Display for ScoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ScoringState::Empty => "empty",
            ScoringState::Configuring => "configuring",
            ScoringState::WeightComplete => "weight complete",
            ScoringState::Scorable => "scorable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("goal cannot be submitted while {state}")]
    NotScorable { state: ScoringState },
}

/// Result of scoring a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalScore {
    pub score: f64,
    /// Placeholder bindings in effect for this evaluation
    pub bindings: Vec<Binding>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoalSnapshot {
    measurements: Vec<Measurement>,
    #[serde(default)]
    formula: Option<String>,
    #[serde(default)]
    formula_stale: bool,
}

#[derive(Debug, Clone)]
pub struct GoalScoring {
    manager: MeasurementManager,
    engine: FormulaEngine,
    policy: ScoringPolicy,
    formula: Option<String>,
    /// Layout version the formula was last written or acknowledged against
    formula_reviewed_at: Option<u64>,
}

impl Default for GoalScoring {
    fn default() -> Self {
        Self::new(ScoringPolicy::default())
    }
}

impl GoalScoring {
    pub fn new(policy: ScoringPolicy) -> Self {
        let engine = FormulaEngine::new(policy.formula.clone());
        let manager = MeasurementManager::new(
            policy.weight_budget,
            MeasurementValidator::new(engine.clone()),
        );
        Self {
            manager,
            engine,
            policy,
            formula: None,
            formula_reviewed_at: None,
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn measurements(&self) -> &MeasurementSet {
        self.manager.set()
    }

    // ------------------------------------------------------------------------
    // Measurement edits
    // ------------------------------------------------------------------------

    pub fn add(&mut self, draft: MeasurementDraft) -> Result<ChangeReceipt, ManagerError> {
        let receipt = self.manager.add(draft)?;
        Ok(self.flag_stale(receipt))
    }

    pub fn update(
        &mut self,
        id: &MeasurementId,
        patch: MeasurementPatch,
    ) -> Result<ChangeReceipt, ManagerError> {
        let receipt = self.manager.update(id, patch)?;
        Ok(self.flag_stale(receipt))
    }

    pub fn remove(
        &mut self,
        id: &MeasurementId,
    ) -> Result<(Measurement, ChangeReceipt), ManagerError> {
        let (removed, receipt) = self.manager.remove(id)?;
        Ok((removed, self.flag_stale(receipt)))
    }

    pub fn reorder(
        &mut self,
        old_index: usize,
        new_index: usize,
    ) -> Result<ChangeReceipt, ManagerError> {
        let receipt = self.manager.reorder(old_index, new_index)?;
        Ok(self.flag_stale(receipt))
    }

    fn flag_stale(&self, mut receipt: ChangeReceipt) -> ChangeReceipt {
        if receipt.layout_changed && self.formula.is_some() {
            receipt.formula_stale = true;
            warn!(
                layout_version = self.measurements().layout_version(),
                "measurement layout changed under a stored formula"
            );
        }
        receipt
    }

    // ------------------------------------------------------------------------
    // Formula
    // ------------------------------------------------------------------------

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    /// Store the formula text verbatim, valid or not, and report its problems
    pub fn set_formula(&mut self, formula: impl Into<String>) -> Vec<Diagnostic> {
        let formula = formula.into();
        debug!(formula = %formula, "formula set");
        self.formula = Some(formula);
        self.acknowledge_formula();
        self.formula_diagnostics()
    }

    pub fn clear_formula(&mut self) {
        self.formula = None;
        self.formula_reviewed_at = None;
    }

    /// Size or order changed since the formula was last set or acknowledged
    pub fn formula_is_stale(&self) -> bool {
        self.formula.is_some()
            && self.formula_reviewed_at != Some(self.measurements().layout_version())
    }

    /// Confirm the formula still means what it should for the current layout
    pub fn acknowledge_formula(&mut self) {
        self.formula_reviewed_at = Some(self.measurements().layout_version());
    }

    /// Weighted-sum starting point built from the current weights
    ///
    /// Never stored on its own; pass it to [`GoalScoring::set_formula`] to adopt it.
    pub fn suggest_formula(&self) -> Option<String> {
        weighted_sum_formula(&self.measurements().weights())
    }

    /// Compile the stored formula against the current measurement count
    pub fn check_formula(&self) -> ScoringResult<CompiledFormula> {
        let formula = self.formula.as_deref().ok_or(ScoringError::NoFormula)?;
        Ok(self.engine.check_goal_formula(formula, self.measurements().len())?)
    }

    pub fn formula_diagnostics(&self) -> Vec<Diagnostic> {
        let Some(formula) = self.formula.as_deref() else {
            return Vec::new();
        };
        let mut diagnostics = self.engine.diagnostics(formula, self.measurements().len());
        if self.formula_is_stale() {
            diagnostics.push(stale_formula_hint());
        }
        diagnostics
    }

    // ------------------------------------------------------------------------
    // State and submission
    // ------------------------------------------------------------------------

    pub fn state(&self) -> ScoringState {
        let set = self.measurements();
        if set.is_empty() {
            return ScoringState::Empty;
        }
        if !set.is_weight_complete() {
            return ScoringState::Configuring;
        }
        match self.check_formula() {
            Ok(compiled) if compiled.references_exactly(set.len()) => ScoringState::Scorable,
            _ => ScoringState::WeightComplete,
        }
    }

    pub fn check_submittable(&self) -> Result<(), SubmitError> {
        match self.policy.submission {
            SubmissionGate::Unrestricted => Ok(()),
            SubmissionGate::RequireScorable => match self.state() {
                ScoringState::Scorable => Ok(()),
                state => Err(SubmitError::NotScorable { state }),
            },
        }
    }

    /// Everything worth showing next to the goal: weight budget, then formula
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let set = self.measurements();
        let mut diagnostics = Vec::new();
        let total = set.total_weight();
        if !set.is_weight_valid() {
            diagnostics.push(weight_exceeded_warning(total));
        } else if !set.is_empty() && total < Decimal::ONE_HUNDRED {
            diagnostics.push(
                Diagnostic::warning(
                    DiagnosticCode::WeightBudgetIncomplete,
                    format!(
                        "measurement weights sum to {}%, {}% unassigned",
                        total,
                        set.remaining_weight()
                    ),
                )
                .with_field("weight"),
            );
        }
        diagnostics.extend(self.formula_diagnostics());
        diagnostics
    }

    // ------------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------------

    /// Evaluate the formula against positional values, one per measurement
    pub fn evaluate(&self, values: &PlaceholderValues) -> ScoringResult<f64> {
        let compiled = self.check_formula()?;
        Ok(compiled.evaluate(values)?)
    }

    /// Resolve every measurement's outcome, bind by current position and
    /// evaluate the formula
    pub fn score(&self, outcomes: &Outcomes) -> ScoringResult<GoalScore> {
        let compiled = self.check_formula()?;
        let (values, bindings) = bind_outcomes(self.measurements(), outcomes, &self.engine)?;
        let score = compiled.evaluate(&values)?;
        debug!(score, measurements = bindings.len(), "goal scored");
        Ok(GoalScore { score, bindings })
    }

    // ------------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------------

    /// Serialize measurements (in order) and formula
    pub fn to_json(&self) -> ScoringResult<String> {
        let snapshot = GoalSnapshot {
            measurements: self.measurements().as_slice().to_vec(),
            formula: self.formula.clone(),
            formula_stale: self.formula_is_stale(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Restore a snapshot under `policy`; every measurement is revalidated
    pub fn from_json(json: &str, policy: ScoringPolicy) -> ScoringResult<Self> {
        let snapshot: GoalSnapshot = serde_json::from_str(json)?;
        let mut session = Self::new(policy);
        let set =
            MeasurementSet::from_measurements(snapshot.measurements, session.manager.validator())?;
        session.manager = session.manager.with_set(set);
        session.formula = snapshot.formula;
        if session.formula.is_some() && !snapshot.formula_stale {
            session.acknowledge_formula();
        }
        debug!(
            measurements = session.measurements().len(),
            "goal restored from snapshot"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightBudgetMode;
    use crate::resolve::MeasurementOutcome;
    use measure_types::{BinaryDraft, BinaryOption, ConfigDraft, NumberDraft};
    use pretty_assertions::assert_eq;

    fn number(name: &str, weight: i64) -> MeasurementDraft {
        MeasurementDraft::new(
            name,
            Decimal::new(weight, 0),
            ConfigDraft::Number(NumberDraft {
                min: Some(0.0),
                max: Some(100.0),
            }),
        )
    }

    fn session_with(weights: &[i64]) -> (GoalScoring, Vec<MeasurementId>) {
        let mut session = GoalScoring::default();
        let ids = weights
            .iter()
            .enumerate()
            .map(|(i, w)| {
                session
                    .add(number(&format!("m{}", i + 1), *w))
                    .unwrap()
                    .measurement_id
            })
            .collect();
        (session, ids)
    }

    #[test]
    fn test_state_machine() {
        let mut session = GoalScoring::default();
        assert_eq!(session.state(), ScoringState::Empty);

        session.add(number("a", 60)).unwrap();
        assert_eq!(session.state(), ScoringState::Configuring);

        session.add(number("b", 40)).unwrap();
        assert_eq!(session.state(), ScoringState::WeightComplete);

        session.set_formula("M1 * 2");
        assert_eq!(session.state(), ScoringState::WeightComplete);

        session.set_formula("(M1*0.6)+(M2*0.4)");
        assert_eq!(session.state(), ScoringState::Scorable);

        session.add(number("c", 10)).unwrap();
        assert_eq!(session.state(), ScoringState::Configuring);
    }

    #[test]
    fn test_layout_changes_mark_formula_stale() {
        let (mut session, ids) = session_with(&[50, 50]);
        let receipt = session.reorder(0, 1).unwrap();
        assert!(!receipt.formula_stale, "no formula stored yet");

        session.set_formula("M1 + M2");
        assert!(!session.formula_is_stale());

        let receipt = session
            .update(
                &ids[0],
                MeasurementPatch {
                    name: Some("renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!receipt.formula_stale);

        let receipt = session.reorder(0, 1).unwrap();
        assert!(receipt.formula_stale);
        assert!(session.formula_is_stale());
        assert!(receipt
            .diagnostics()
            .iter()
            .any(|d| d.code == DiagnosticCode::FormulaStale));

        session.acknowledge_formula();
        assert!(!session.formula_is_stale());

        let (_, receipt) = session.remove(&ids[1]).unwrap();
        assert!(receipt.formula_stale);
    }

    #[test]
    fn test_formula_is_stored_verbatim_even_when_invalid() {
        let (mut session, _) = session_with(&[100]);
        let diagnostics = session.set_formula("M1 + M2");
        assert_eq!(session.formula(), Some("M1 + M2"));
        assert_eq!(diagnostics[0].code, DiagnosticCode::PlaceholderOutOfRange);
        assert!(matches!(
            session.check_formula(),
            Err(ScoringError::Formula(_))
        ));
    }

    #[test]
    fn test_submission_gate() {
        let (session, _) = session_with(&[30]);
        assert!(session.check_submittable().is_ok());

        let policy = ScoringPolicy {
            submission: SubmissionGate::RequireScorable,
            ..Default::default()
        };
        let mut gated = GoalScoring::new(policy);
        gated.add(number("a", 100)).unwrap();
        assert_eq!(
            gated.check_submittable(),
            Err(SubmitError::NotScorable {
                state: ScoringState::WeightComplete
            })
        );
        gated.set_formula("M1");
        assert!(gated.check_submittable().is_ok());
    }

    #[test]
    fn test_strict_policy_reaches_manager() {
        let mut session = GoalScoring::new(ScoringPolicy {
            weight_budget: WeightBudgetMode::Strict,
            ..Default::default()
        });
        session.add(number("a", 80)).unwrap();
        assert!(matches!(
            session.add(number("b", 30)),
            Err(ManagerError::WeightBudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_score_binds_by_position() {
        let (mut session, ids) = session_with(&[60, 40]);
        session.set_formula("(M1*0.6)+(M2*0.4)");
        let outcomes: Outcomes = [
            (ids[0], MeasurementOutcome::Value(4.0)),
            (ids[1], MeasurementOutcome::Value(5.0)),
        ]
        .into_iter()
        .collect();

        let scored = session.score(&outcomes).unwrap();
        assert!((scored.score - 4.4).abs() < 1e-9);
        assert_eq!(scored.bindings[0].placeholder, "M1");
        assert_eq!(scored.bindings[0].measurement_id, ids[0]);

        session.reorder(1, 0).unwrap();
        let scored = session.score(&outcomes).unwrap();
        assert!((scored.score - 4.6).abs() < 1e-9);
        assert_eq!(scored.bindings[0].measurement_id, ids[1]);
    }

    #[test]
    fn test_score_resolves_binary_outcome() {
        let mut session = GoalScoring::default();
        let id = session
            .add(MeasurementDraft::new(
                "Audit",
                Decimal::ONE_HUNDRED,
                ConfigDraft::Binary(BinaryDraft {
                    option_a: "Pass".into(),
                    option_b: "Fail".into(),
                    positive_is: BinaryOption::A,
                    true_score: Some(5.0),
                    false_score: Some(1.0),
                }),
            ))
            .unwrap()
            .measurement_id;
        session.set_formula("M1");
        let outcomes: Outcomes = [(id, MeasurementOutcome::Choice(BinaryOption::B))]
            .into_iter()
            .collect();
        assert_eq!(session.score(&outcomes).unwrap().score, 1.0);
    }

    #[test]
    fn test_score_without_formula() {
        let (session, _) = session_with(&[100]);
        assert!(matches!(
            session.score(&Outcomes::new()),
            Err(ScoringError::NoFormula)
        ));
    }

    #[test]
    fn test_missing_outcome() {
        let (mut session, _) = session_with(&[100]);
        session.set_formula("M1");
        assert!(matches!(
            session.score(&Outcomes::new()),
            Err(ScoringError::Resolve(_))
        ));
    }

    #[test]
    fn test_suggest_formula_is_not_stored() {
        let (session, _) = session_with(&[25, 75]);
        assert_eq!(
            session.suggest_formula().as_deref(),
            Some("(M1*0.25)+(M2*0.75)")
        );
        assert_eq!(session.formula(), None);
    }

    #[test]
    fn test_weight_diagnostics() {
        let (session, _) = session_with(&[30]);
        let codes: Vec<_> = session.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::WeightBudgetIncomplete]);

        let (session, _) = session_with(&[70, 50]);
        let codes: Vec<_> = session.diagnostics().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::WeightBudgetExceeded]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut session, ids) = session_with(&[20, 30, 50]);
        session.set_formula("M1 + M2 + M3");
        session.reorder(2, 0).unwrap();

        let json = session.to_json().unwrap();
        let restored = GoalScoring::from_json(&json, ScoringPolicy::default()).unwrap();

        let order: Vec<_> = restored.measurements().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
        assert_eq!(restored.formula(), Some("M1 + M2 + M3"));
        assert!(restored.formula_is_stale());
        assert_eq!(restored.state(), ScoringState::Scorable);
    }

    #[test]
    fn test_snapshot_rejects_invalid_measurement() {
        let (session, _) = session_with(&[100]);
        let mut value: serde_json::Value =
            serde_json::from_str(&session.to_json().unwrap()).unwrap();
        value["measurements"][0]["config"]["settings"]["min"] = serde_json::json!(500.0);

        let result = GoalScoring::from_json(&value.to_string(), ScoringPolicy::default());
        assert!(matches!(
            result,
            Err(ScoringError::Manager(ManagerError::Invalid(_)))
        ));
    }

    #[test]
    fn test_snapshot_rejects_duplicate_ids() {
        let (session, _) = session_with(&[50]);
        let mut value: serde_json::Value =
            serde_json::from_str(&session.to_json().unwrap()).unwrap();
        let first = value["measurements"][0].clone();
        value["measurements"]
            .as_array_mut()
            .unwrap()
            .push(first);

        let result = GoalScoring::from_json(&value.to_string(), ScoringPolicy::default());
        assert!(matches!(
            result,
            Err(ScoringError::Manager(ManagerError::DuplicateId(_)))
        ));
    }

    #[test]
    fn test_malformed_snapshot() {
        assert!(matches!(
            GoalScoring::from_json("{\"measurements\": 3}", ScoringPolicy::default()),
            Err(ScoringError::Serialization(_))
        ));
    }
}
