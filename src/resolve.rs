//! Outcome resolution
//!
//! Turns what actually happened for a measurement (a number, an amount, the
//! option that was chosen, the date something was delivered) into the single
//! numeric value its placeholder is bound to.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use measure_types::{
    BinaryOption, DateConfig, Measurement, MeasurementConfig, MeasurementId, MeasurementType,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula::{
    placeholder_name, FormulaEngine, FormulaError, PlaceholderValues, SubjectScope,
};
use crate::manager::MeasurementSet;

/// Raw result recorded for one measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MeasurementOutcome {
    Value(f64),
    Amount(Decimal),
    Choice(BinaryOption),
    Date(NaiveDate),
}

impl MeasurementOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            MeasurementOutcome::Value(_) => "value",
            MeasurementOutcome::Amount(_) => "amount",
            MeasurementOutcome::Choice(_) => "choice",
            MeasurementOutcome::Date(_) => "date",
        }
    }
}

/// Outcomes keyed by measurement id; position plays no part here
pub type Outcomes = BTreeMap<MeasurementId, MeasurementOutcome>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("'{measurement}' is a {expected} measurement but received a {found} outcome")]
    OutcomeMismatch {
        measurement: String,
        expected: MeasurementType,
        found: &'static str,
    },

    #[error("no outcome recorded for '{measurement}' ({placeholder})")]
    MissingOutcome {
        measurement: String,
        placeholder: String,
    },

    #[error("outcome for '{measurement}' is not a finite number")]
    NonFiniteOutcome { measurement: String },

    #[error("expression of '{measurement}' failed: {source}")]
    Expression {
        measurement: String,
        source: FormulaError,
    },
}

/// Placeholder binding used for one scoring run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub placeholder: String,
    pub measurement_id: MeasurementId,
    pub name: String,
    pub value: f64,
}

/// Numeric value of one measurement's outcome
pub fn resolve_outcome(
    measurement: &Measurement,
    outcome: &MeasurementOutcome,
    engine: &FormulaEngine,
) -> Result<f64, ResolveError> {
    let mismatch = || ResolveError::OutcomeMismatch {
        measurement: measurement.name.clone(),
        expected: measurement.measurement_type(),
        found: outcome.kind(),
    };

    let value = match (&measurement.config, outcome) {
        (MeasurementConfig::Number(_), MeasurementOutcome::Value(v))
        | (MeasurementConfig::Percentage(_), MeasurementOutcome::Value(v))
        | (MeasurementConfig::Currency(_), MeasurementOutcome::Value(v)) => *v,

        (MeasurementConfig::Currency(_), MeasurementOutcome::Amount(amount)) => {
            amount.to_f64().ok_or_else(|| ResolveError::NonFiniteOutcome {
                measurement: measurement.name.clone(),
            })?
        }

        (MeasurementConfig::Binary(config), MeasurementOutcome::Choice(choice)) => {
            if *choice == config.positive_is {
                config.true_score
            } else {
                config.false_score
            }
        }

        (MeasurementConfig::Date(config), MeasurementOutcome::Date(achieved)) => {
            let met = match config {
                DateConfig::Deadline { target_date } => achieved <= target_date,
                DateConfig::Range {
                    start_date,
                    end_date,
                } => start_date <= achieved && achieved <= end_date,
            };
            if met {
                1.0
            } else {
                0.0
            }
        }

        (MeasurementConfig::Custom(config), MeasurementOutcome::Value(v)) => {
            check_finite(measurement, *v)?;
            engine
                .evaluate(&config.expression, &SubjectScope { value: *v })
                .map_err(|source| ResolveError::Expression {
                    measurement: measurement.name.clone(),
                    source,
                })?
        }

        _ => return Err(mismatch()),
    };

    check_finite(measurement, value)
}

/// Bind every measurement of `set` to its placeholder, by current position
pub fn bind_outcomes(
    set: &MeasurementSet,
    outcomes: &Outcomes,
    engine: &FormulaEngine,
) -> Result<(PlaceholderValues, Vec<Binding>), ResolveError> {
    let mut values = PlaceholderValues::with_count(set.len());
    let mut bindings = Vec::with_capacity(set.len());

    for (position, measurement) in set.iter().enumerate() {
        let placeholder = placeholder_name(position + 1);
        let outcome = outcomes
            .get(&measurement.id)
            .ok_or_else(|| ResolveError::MissingOutcome {
                measurement: measurement.name.clone(),
                placeholder: placeholder.clone(),
            })?;
        let value = resolve_outcome(measurement, outcome, engine)?;
        values
            .set(position + 1, value)
            .map_err(|source| ResolveError::Expression {
                measurement: measurement.name.clone(),
                source,
            })?;
        bindings.push(Binding {
            placeholder,
            measurement_id: measurement.id,
            name: measurement.name.clone(),
            value,
        });
    }

    Ok((values, bindings))
}

fn check_finite(measurement: &Measurement, value: f64) -> Result<f64, ResolveError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ResolveError::NonFiniteOutcome {
            measurement: measurement.name.clone(),
        })
    }
}
