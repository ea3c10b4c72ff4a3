//! Measurement collection manager
//!
//! Owns the ordered measurement set of one goal. Position is identity for the
//! formula: the measurement at index `i` is placeholder `M{i+1}`, so every
//! operation that changes size or order reports the placeholders it moved.
//!
//! The weight budget (`sum(weights) <= 100`) is soft by default: an edit that
//! overruns it is accepted and flagged. Under [`WeightBudgetMode::Strict`] the
//! edit is rejected and the set is left untouched.

use std::fmt;

use measure_types::{Measurement, MeasurementDraft, MeasurementId, MeasurementPatch};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::WeightBudgetMode;
use crate::diagnostics::{stale_formula_hint, weight_exceeded_warning, Diagnostic};
use crate::formula::placeholder_name;
use crate::validator::{FieldWarning, MeasurementValidator, ValidatedMeasurement, ValidationReport};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManagerError {
    #[error("measurement rejected: {0}")]
    Invalid(ValidationReport),

    #[error("no measurement with id {0}")]
    UnknownMeasurement(MeasurementId),

    #[error("index {index} is out of bounds for {len} measurement(s)")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("weights would total {total}%, above the 100% budget")]
    WeightBudgetExceeded { total: Decimal },

    #[error("measurement id {0} appears more than once")]
    DuplicateId(MeasurementId),
}

// ============================================================================
// SET
// ============================================================================

/// Ordered measurements of one goal; read-only outside the manager
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeasurementSet {
    measurements: Vec<Measurement>,
    /// Bumped whenever size or order changes
    #[serde(skip)]
    layout_version: u64,
}

impl MeasurementSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a set from stored measurements, revalidating each one
    pub fn from_measurements(
        measurements: Vec<Measurement>,
        validator: &MeasurementValidator,
    ) -> Result<Self, ManagerError> {
        let mut set = Self::new();
        for stored in measurements {
            if set.get(&stored.id).is_some() {
                return Err(ManagerError::DuplicateId(stored.id));
            }
            let validated = validator.revalidate(&stored).map_err(ManagerError::Invalid)?;
            set.measurements.push(into_measurement(stored.id, validated));
        }
        Ok(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }

    pub fn as_slice(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn get(&self, id: &MeasurementId) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.id == *id)
    }

    /// 0-based position of a measurement
    pub fn position(&self, id: &MeasurementId) -> Option<usize> {
        self.measurements.iter().position(|m| m.id == *id)
    }

    /// Placeholder currently bound to a measurement, e.g. `M2`
    pub fn placeholder_of(&self, id: &MeasurementId) -> Option<String> {
        self.position(id).map(|i| placeholder_name(i + 1))
    }

    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    /// Exact sum of all weights, recomputed on every call
    pub fn total_weight(&self) -> Decimal {
        self.measurements.iter().map(|m| m.weight).sum()
    }

    /// `100 - total`; negative when over budget
    pub fn remaining_weight(&self) -> Decimal {
        Decimal::ONE_HUNDRED - self.total_weight()
    }

    pub fn is_weight_valid(&self) -> bool {
        self.total_weight() <= Decimal::ONE_HUNDRED
    }

    /// Weights sum to exactly 100
    pub fn is_weight_complete(&self) -> bool {
        self.total_weight() == Decimal::ONE_HUNDRED
    }

    pub fn weights(&self) -> Vec<Decimal> {
        self.measurements.iter().map(|m| m.weight).collect()
    }

    pub fn budget(&self) -> WeightBudget {
        let total = self.total_weight();
        WeightBudget {
            total,
            remaining: Decimal::ONE_HUNDRED - total,
            valid: total <= Decimal::ONE_HUNDRED,
        }
    }

    fn ids(&self) -> Vec<MeasurementId> {
        self.measurements.iter().map(|m| m.id).collect()
    }
}

impl<'a> IntoIterator for &'a MeasurementSet {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.iter()
    }
}

// ============================================================================
// RECEIPTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightBudget {
    pub total: Decimal,
    pub remaining: Decimal,
    pub valid: bool,
}

/// A measurement whose placeholder changed, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renumbering {
    pub measurement_id: MeasurementId,
    pub from: usize,
    pub to: usize,
}

impl fmt::Display for Renumbering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", placeholder_name(self.from), placeholder_name(self.to))
    }
}

/// What an accepted change did to the set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeReceipt {
    pub measurement_id: MeasurementId,
    /// Size or order changed
    pub layout_changed: bool,
    pub renumbered: Vec<Renumbering>,
    pub budget: WeightBudget,
    pub warnings: Vec<FieldWarning>,
    /// Set by the scoring session when a stored formula may now bind differently
    pub formula_stale: bool,
}

impl ChangeReceipt {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> =
            self.warnings.iter().map(FieldWarning::to_diagnostic).collect();
        if !self.budget.valid {
            diagnostics.push(weight_exceeded_warning(self.budget.total));
        }
        if self.formula_stale {
            diagnostics.push(stale_formula_hint());
        }
        diagnostics
    }
}

// ============================================================================
// MANAGER
// ============================================================================

/// The only mutator of a [`MeasurementSet`]
#[derive(Debug, Clone, Default)]
pub struct MeasurementManager {
    set: MeasurementSet,
    budget_mode: WeightBudgetMode,
    validator: MeasurementValidator,
}

impl MeasurementManager {
    pub fn new(budget_mode: WeightBudgetMode, validator: MeasurementValidator) -> Self {
        Self {
            set: MeasurementSet::new(),
            budget_mode,
            validator,
        }
    }

    pub fn with_set(mut self, set: MeasurementSet) -> Self {
        self.set = set;
        self
    }

    pub fn set(&self) -> &MeasurementSet {
        &self.set
    }

    pub fn budget_mode(&self) -> WeightBudgetMode {
        self.budget_mode
    }

    pub fn validator(&self) -> &MeasurementValidator {
        &self.validator
    }

    /// Validate and append; the new measurement takes the highest placeholder
    pub fn add(&mut self, draft: MeasurementDraft) -> Result<ChangeReceipt, ManagerError> {
        let validated = self.validator.validate(&draft).map_err(ManagerError::Invalid)?;
        let before = self.set.total_weight();
        self.admit(before, before + validated.weight)?;

        let id = MeasurementId::new();
        let warnings = validated.warnings.clone();
        self.set.measurements.push(into_measurement(id, validated));
        self.set.layout_version += 1;

        debug!(
            measurement = %id,
            placeholder = %placeholder_name(self.set.len()),
            "measurement added"
        );
        Ok(self.receipt(id, true, Vec::new(), warnings))
    }

    /// Apply `patch` to the measurement and revalidate the whole unit; id and
    /// position are kept
    pub fn update(
        &mut self,
        id: &MeasurementId,
        patch: MeasurementPatch,
    ) -> Result<ChangeReceipt, ManagerError> {
        let index = self
            .set
            .position(id)
            .ok_or(ManagerError::UnknownMeasurement(*id))?;
        let current = &self.set.measurements[index];

        let draft = patch.apply(current.to_draft());
        let validated = self.validator.validate(&draft).map_err(ManagerError::Invalid)?;
        let before = self.set.total_weight();
        self.admit(before, before - current.weight + validated.weight)?;

        let warnings = validated.warnings.clone();
        self.set.measurements[index] = into_measurement(*id, validated);

        debug!(measurement = %id, "measurement updated");
        Ok(self.receipt(*id, false, Vec::new(), warnings))
    }

    /// Delete and compact; every later measurement moves down one placeholder
    pub fn remove(
        &mut self,
        id: &MeasurementId,
    ) -> Result<(Measurement, ChangeReceipt), ManagerError> {
        let index = self
            .set
            .position(id)
            .ok_or(ManagerError::UnknownMeasurement(*id))?;
        let removed = self.set.measurements.remove(index);
        self.set.layout_version += 1;

        let renumbered: Vec<Renumbering> = self.set.measurements[index..]
            .iter()
            .enumerate()
            .map(|(offset, m)| Renumbering {
                measurement_id: m.id,
                from: index + offset + 2,
                to: index + offset + 1,
            })
            .collect();

        debug!(
            measurement = %id,
            renumbered = renumbered.len(),
            "measurement removed"
        );
        let receipt = self.receipt(*id, true, renumbered, Vec::new());
        Ok((removed, receipt))
    }

    /// Move the measurement at `old_index` to `new_index` (0-based)
    ///
    /// Both indices are checked before anything moves.
    pub fn reorder(
        &mut self,
        old_index: usize,
        new_index: usize,
    ) -> Result<ChangeReceipt, ManagerError> {
        let len = self.set.len();
        for index in [old_index, new_index] {
            if index >= len {
                return Err(ManagerError::IndexOutOfBounds { index, len });
            }
        }

        let id = self.set.measurements[old_index].id;
        if old_index == new_index {
            return Ok(self.receipt(id, false, Vec::new(), Vec::new()));
        }

        let before = self.set.ids();
        let moved = self.set.measurements.remove(old_index);
        self.set.measurements.insert(new_index, moved);
        self.set.layout_version += 1;

        let (low, high) = (old_index.min(new_index), old_index.max(new_index));
        let renumbered: Vec<Renumbering> = (low..=high)
            .filter_map(|to| {
                let measurement_id = self.set.measurements[to].id;
                let from = before.iter().position(|b| *b == measurement_id)?;
                (from != to).then_some(Renumbering {
                    measurement_id,
                    from: from + 1,
                    to: to + 1,
                })
            })
            .collect();

        debug!(
            measurement = %id,
            from = old_index,
            to = new_index,
            "measurements reordered"
        );
        Ok(self.receipt(id, true, renumbered, Vec::new()))
    }

    /// Accept or reject a weight change from `before` to `after`
    fn admit(&self, before: Decimal, after: Decimal) -> Result<(), ManagerError> {
        if after <= Decimal::ONE_HUNDRED || after <= before {
            return Ok(());
        }
        match self.budget_mode {
            WeightBudgetMode::Strict => Err(ManagerError::WeightBudgetExceeded { total: after }),
            WeightBudgetMode::Soft => {
                warn!(total = %after, "measurement weights exceed the 100% budget");
                Ok(())
            }
        }
    }

    fn receipt(
        &self,
        measurement_id: MeasurementId,
        layout_changed: bool,
        renumbered: Vec<Renumbering>,
        warnings: Vec<FieldWarning>,
    ) -> ChangeReceipt {
        ChangeReceipt {
            measurement_id,
            layout_changed,
            renumbered,
            budget: self.set.budget(),
            warnings,
            formula_stale: false,
        }
    }
}

fn into_measurement(id: MeasurementId, validated: ValidatedMeasurement) -> Measurement {
    Measurement {
        id,
        name: validated.name,
        unit: validated.unit,
        weight: validated.weight,
        config: validated.config,
    }
}
