//! Measurement validator
//!
//! Decides whether a prospective measurement (new or edited) may enter a
//! goal's measurement set. A draft is validated as a whole unit: every
//! problem is collected, and either a fully typed measurement comes out or
//! nothing does.
//!
//! # Rules
//!
//! | type       | required                                                     |
//! |------------|--------------------------------------------------------------|
//! | number     | `min`, `max` finite, `min <= max`                            |
//! | currency   | range: `min`, `max`; otherwise `amount`                      |
//! | percentage | `target` finite; bounds default to 0..100                    |
//! | binary     | `optionA`, `optionB` non-empty; `trueScore`, `falseScore`    |
//! | date       | deadline: `targetDate`; range: `startDate` and `endDate`     |
//! | custom     | `expression` non-empty and valid over `x`                    |
//!
//! Independent of type: `name` non-empty and `0 < weight <= 100`. The
//! set-level weight budget is the manager's concern.
//!
//! # Usage
//!
//! ```
//! use appraisal_scoring::validator::is_valid;
//! use measure_types::{ConfigDraft, MeasurementDraft, NumberDraft};
//! use rust_decimal::Decimal;
//!
//! let draft = MeasurementDraft::new(
//!     "Tickets closed",
//!     Decimal::new(50, 0),
//!     ConfigDraft::Number(NumberDraft { min: Some(0.0), max: Some(200.0) }),
//! );
//! assert!(is_valid(&draft));
//! ```

use std::fmt;

use measure_types::{
    BinaryConfig, BinaryDraft, ConfigDraft, CurrencyConfig, CurrencyDraft, CustomConfig,
    CustomDraft, DateConfig, DateDraft, DateMode, Measurement, MeasurementConfig,
    MeasurementDraft, MeasurementType, NumberConfig, NumberDraft, PercentageConfig,
    PercentageDraft,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::formula::{FormulaEngine, FormulaError};

// =============================================================================
// ERROR TYPES
// =============================================================================

/// A single malformed or missing field
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must not be blank")]
    Blank { field: &'static str },

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("{field} could not be read from '{value}'")]
    Unparseable { field: &'static str, value: String },

    #[error("{min_field} must not be greater than {max_field}")]
    InvertedRange {
        min_field: &'static str,
        max_field: &'static str,
    },

    #[error("{field} cannot be combined with {context}")]
    Contradictory {
        field: &'static str,
        context: &'static str,
    },

    #[error("weight must be greater than 0 and at most 100, got {weight}")]
    WeightOutOfRange { weight: Decimal },

    #[error("expression is invalid: {0}")]
    InvalidExpression(FormulaError),
}

impl FieldError {
    /// Form field this error points at
    pub fn field(&self) -> &'static str {
        match self {
            FieldError::Missing { field }
            | FieldError::Blank { field }
            | FieldError::NotFinite { field }
            | FieldError::Unparseable { field, .. }
            | FieldError::Contradictory { field, .. } => field,
            FieldError::InvertedRange { min_field, .. } => min_field,
            FieldError::WeightOutOfRange { .. } => "weight",
            FieldError::InvalidExpression(_) => "expression",
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            FieldError::Missing { .. } | FieldError::Blank { .. } => DiagnosticCode::MissingField,
            FieldError::NotFinite { .. }
            | FieldError::Unparseable { .. }
            | FieldError::InvalidExpression(_) => DiagnosticCode::InvalidValue,
            FieldError::InvertedRange { .. } => DiagnosticCode::InvalidRange,
            FieldError::Contradictory { .. } => DiagnosticCode::ContradictoryField,
            FieldError::WeightOutOfRange { .. } => DiagnosticCode::WeightOutOfRange,
        }
    }
}

/// Non-blocking observation about an otherwise valid measurement
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldWarning {
    #[error("{measurement_type} measurements normally carry a unit")]
    MissingUnit { measurement_type: MeasurementType },

    #[error("target {target} lies outside the {min}..{max} bounds")]
    TargetOutsideBounds { target: f64, min: f64, max: f64 },

    #[error("both options read '{option}'")]
    IndistinctOptions { option: String },
}

impl FieldWarning {
    pub fn field(&self) -> &'static str {
        match self {
            FieldWarning::MissingUnit { .. } => "unit",
            FieldWarning::TargetOutsideBounds { .. } => "target",
            FieldWarning::IndistinctOptions { .. } => "optionB",
        }
    }

    pub fn code(&self) -> DiagnosticCode {
        match self {
            FieldWarning::MissingUnit { .. } => DiagnosticCode::MissingUnit,
            FieldWarning::TargetOutsideBounds { .. } => DiagnosticCode::TargetOutsideBounds,
            FieldWarning::IndistinctOptions { .. } => DiagnosticCode::IndistinctOptions,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warning(self.code(), self.to_string()).with_field(self.field())
    }
}

// =============================================================================
// VALIDATION RESULT
// =============================================================================

/// Everything wrong with a rejected draft
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    pub errors: Vec<FieldError>,
    pub warnings: Vec<FieldWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_error_on(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field() == field)
    }

    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|e| Diagnostic::error(e.code(), e.to_string()).with_field(e.field()))
            .chain(self.warnings.iter().map(FieldWarning::to_diagnostic))
            .collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationReport {}

/// A draft that passed validation, ready to be given an identity
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMeasurement {
    pub name: String,
    pub unit: String,
    pub weight: Decimal,
    pub config: MeasurementConfig,
    pub warnings: Vec<FieldWarning>,
}

// =============================================================================
// VALIDATOR
// =============================================================================

/// Validate a draft with default formula limits
pub fn validate_draft(draft: &MeasurementDraft) -> Result<ValidatedMeasurement, ValidationReport> {
    MeasurementValidator::default().validate(draft)
}

/// Boolean form of [`validate_draft`]
pub fn is_valid(draft: &MeasurementDraft) -> bool {
    validate_draft(draft).is_ok()
}

#[derive(Debug, Clone, Default)]
pub struct MeasurementValidator {
    engine: FormulaEngine,
}

impl MeasurementValidator {
    pub fn new(engine: FormulaEngine) -> Self {
        Self { engine }
    }

    pub fn validate(
        &self,
        draft: &MeasurementDraft,
    ) -> Result<ValidatedMeasurement, ValidationReport> {
        let mut checks = Checks::default();

        let name = draft.name.trim();
        if name.is_empty() {
            checks.error(FieldError::Blank { field: "name" });
        }

        match draft.weight {
            None => checks.error(FieldError::Missing { field: "weight" }),
            Some(weight) if weight <= Decimal::ZERO || weight > Decimal::ONE_HUNDRED => {
                checks.error(FieldError::WeightOutOfRange { weight })
            }
            Some(_) => {}
        }

        let measurement_type = draft.measurement_type();
        if measurement_type.expects_unit() && draft.unit.trim().is_empty() {
            checks.warn(FieldWarning::MissingUnit { measurement_type });
        }

        let config = match &draft.config {
            ConfigDraft::Number(d) => number(d, &mut checks).map(MeasurementConfig::Number),
            ConfigDraft::Currency(d) => currency(d, &mut checks).map(MeasurementConfig::Currency),
            ConfigDraft::Percentage(d) => {
                percentage(d, &mut checks).map(MeasurementConfig::Percentage)
            }
            ConfigDraft::Binary(d) => binary(d, &mut checks).map(MeasurementConfig::Binary),
            ConfigDraft::Date(d) => date(d, &mut checks).map(MeasurementConfig::Date),
            ConfigDraft::Custom(d) => self.custom(d, &mut checks).map(MeasurementConfig::Custom),
        };

        match (config, draft.weight, checks.errors.is_empty()) {
            (Some(config), Some(weight), true) => Ok(ValidatedMeasurement {
                name: name.to_string(),
                unit: draft.unit.trim().to_string(),
                weight,
                config,
                warnings: checks.warnings,
            }),
            _ => Err(ValidationReport {
                errors: checks.errors,
                warnings: checks.warnings,
            }),
        }
    }

    /// Re-check a measurement that already carries an identity
    pub fn revalidate(
        &self,
        measurement: &Measurement,
    ) -> Result<ValidatedMeasurement, ValidationReport> {
        self.validate(&measurement.to_draft())
    }

    fn custom(&self, d: &CustomDraft, checks: &mut Checks) -> Option<CustomConfig> {
        let expression = d.expression.trim();
        if expression.is_empty() {
            checks.error(FieldError::Blank {
                field: "expression",
            });
            return None;
        }
        match self.engine.check_subject_expression(expression) {
            Ok(_) => Some(CustomConfig {
                expression: expression.to_string(),
            }),
            Err(err) => {
                checks.error(FieldError::InvalidExpression(err));
                None
            }
        }
    }
}

#[derive(Default)]
struct Checks {
    errors: Vec<FieldError>,
    warnings: Vec<FieldWarning>,
}

impl Checks {
    fn error(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    fn warn(&mut self, warning: FieldWarning) {
        self.warnings.push(warning);
    }

    fn finite(&mut self, field: &'static str, value: Option<f64>) -> Option<f64> {
        match value {
            None => {
                self.error(FieldError::Missing { field });
                None
            }
            Some(v) if !v.is_finite() => {
                self.error(FieldError::NotFinite { field });
                None
            }
            Some(v) => Some(v),
        }
    }

    fn required<T: Copy>(&mut self, field: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.error(FieldError::Missing { field });
        }
        value
    }

    fn non_blank(&mut self, field: &'static str, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            self.error(FieldError::Blank { field });
            None
        } else {
            Some(value.to_string())
        }
    }

    fn absent<T>(&mut self, field: &'static str, value: &Option<T>, context: &'static str) {
        if value.is_some() {
            self.error(FieldError::Contradictory { field, context });
        }
    }

    fn ordered<T: PartialOrd>(
        &mut self,
        min_field: &'static str,
        max_field: &'static str,
        min: T,
        max: T,
    ) -> bool {
        if min > max {
            self.error(FieldError::InvertedRange {
                min_field,
                max_field,
            });
            false
        } else {
            true
        }
    }
}

// =============================================================================
// PER-TYPE RULES
// =============================================================================

fn number(d: &NumberDraft, checks: &mut Checks) -> Option<NumberConfig> {
    let min = checks.finite("min", d.min);
    let max = checks.finite("max", d.max);
    let (min, max) = (min?, max?);
    checks
        .ordered("min", "max", min, max)
        .then_some(NumberConfig { min, max })
}

fn currency(d: &CurrencyDraft, checks: &mut Checks) -> Option<CurrencyConfig> {
    match d.operator.threshold() {
        None => {
            checks.absent("amount", &d.amount, "the range operator");
            let min = checks.required("min", d.min);
            let max = checks.required("max", d.max);
            let (min, max) = (min?, max?);
            checks
                .ordered("min", "max", min, max)
                .then_some(CurrencyConfig::Range { min, max })
        }
        Some(operator) => {
            checks.absent("min", &d.min, "a threshold operator");
            checks.absent("max", &d.max, "a threshold operator");
            let amount = checks.required("amount", d.amount)?;
            Some(CurrencyConfig::Threshold { operator, amount })
        }
    }
}

fn percentage(d: &PercentageDraft, checks: &mut Checks) -> Option<PercentageConfig> {
    let target = checks.finite("target", d.target);
    let min = checks.finite("min", Some(d.min.unwrap_or(0.0)));
    let max = checks.finite("max", Some(d.max.unwrap_or(100.0)));
    let (target, min, max) = (target?, min?, max?);
    if !checks.ordered("min", "max", min, max) {
        return None;
    }
    if target < min || target > max {
        checks.warn(FieldWarning::TargetOutsideBounds { target, min, max });
    }
    Some(PercentageConfig {
        operator: d.operator,
        target,
        min,
        max,
    })
}

fn binary(d: &BinaryDraft, checks: &mut Checks) -> Option<BinaryConfig> {
    let option_a = checks.non_blank("optionA", &d.option_a);
    let option_b = checks.non_blank("optionB", &d.option_b);
    let true_score = checks.finite("trueScore", d.true_score);
    let false_score = checks.finite("falseScore", d.false_score);
    let (option_a, option_b) = (option_a?, option_b?);

    if option_a.eq_ignore_ascii_case(&option_b) {
        checks.warn(FieldWarning::IndistinctOptions {
            option: option_a.clone(),
        });
    }

    Some(BinaryConfig {
        option_a,
        option_b,
        positive_is: d.positive_is,
        true_score: true_score?,
        false_score: false_score?,
    })
}

fn date(d: &DateDraft, checks: &mut Checks) -> Option<DateConfig> {
    match d.mode {
        DateMode::Deadline => {
            checks.absent("startDate", &d.start_date, "deadline mode");
            checks.absent("endDate", &d.end_date, "deadline mode");
            let target_date = checks.required("targetDate", d.target_date)?;
            Some(DateConfig::Deadline { target_date })
        }
        DateMode::Range => {
            checks.absent("targetDate", &d.target_date, "range mode");
            let start_date = checks.required("startDate", d.start_date);
            let end_date = checks.required("endDate", d.end_date);
            let (start_date, end_date) = (start_date?, end_date?);
            checks
                .ordered("startDate", "endDate", start_date, end_date)
                .then_some(DateConfig::Range {
                    start_date,
                    end_date,
                })
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use measure_types::{BinaryOption, ComparisonOperator, ThresholdOperator};
    use pretty_assertions::assert_eq;

    fn draft(config: ConfigDraft) -> MeasurementDraft {
        MeasurementDraft::new("Measure", Decimal::new(50, 0), config).with_unit("u")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    fn valid_drafts() -> Vec<ConfigDraft> {
        vec![
            ConfigDraft::Number(NumberDraft {
                min: Some(0.0),
                max: Some(10.0),
            }),
            ConfigDraft::Currency(CurrencyDraft {
                operator: ComparisonOperator::AtLeast,
                amount: Some(Decimal::new(50_000, 0)),
                min: None,
                max: None,
            }),
            ConfigDraft::Currency(CurrencyDraft {
                operator: ComparisonOperator::Range,
                amount: None,
                min: Some(Decimal::new(1_000, 0)),
                max: Some(Decimal::new(2_000, 0)),
            }),
            ConfigDraft::Percentage(PercentageDraft {
                target: Some(95.0),
                ..Default::default()
            }),
            ConfigDraft::Binary(BinaryDraft {
                option_a: "Pass".into(),
                option_b: "Fail".into(),
                positive_is: BinaryOption::A,
                true_score: Some(5.0),
                false_score: Some(1.0),
            }),
            ConfigDraft::Date(DateDraft {
                mode: DateMode::Deadline,
                target_date: Some(day(30)),
                ..Default::default()
            }),
            ConfigDraft::Date(DateDraft {
                mode: DateMode::Range,
                start_date: Some(day(1)),
                end_date: Some(day(15)),
                ..Default::default()
            }),
            ConfigDraft::Custom(CustomDraft {
                expression: "(x > 90) ? 5 : (x > 70) ? 4 : 3".into(),
            }),
        ]
    }

    #[test]
    fn test_every_type_accepts_complete_config() {
        for config in valid_drafts() {
            let result = validate_draft(&draft(config.clone()));
            assert!(result.is_ok(), "{:?} rejected: {:?}", config, result);
        }
    }

    #[test]
    fn test_every_type_rejects_missing_required_field() {
        let cases: Vec<(ConfigDraft, &str)> = vec![
            (ConfigDraft::Number(NumberDraft { min: Some(0.0), max: None }), "max"),
            (ConfigDraft::Number(NumberDraft { min: None, max: Some(1.0) }), "min"),
            (ConfigDraft::Currency(CurrencyDraft::default()), "amount"),
            (
                ConfigDraft::Currency(CurrencyDraft {
                    operator: ComparisonOperator::Range,
                    min: Some(Decimal::ONE),
                    ..Default::default()
                }),
                "max",
            ),
            (ConfigDraft::Percentage(PercentageDraft::default()), "target"),
            (
                ConfigDraft::Binary(BinaryDraft {
                    option_a: "Yes".into(),
                    true_score: Some(1.0),
                    false_score: Some(0.0),
                    ..Default::default()
                }),
                "optionB",
            ),
            (ConfigDraft::Date(DateDraft::default()), "targetDate"),
            (
                ConfigDraft::Date(DateDraft {
                    mode: DateMode::Range,
                    start_date: Some(day(1)),
                    ..Default::default()
                }),
                "endDate",
            ),
            (ConfigDraft::Custom(CustomDraft::default()), "expression"),
        ];

        for (config, field) in cases {
            let report = validate_draft(&draft(config.clone())).unwrap_err();
            assert!(
                report.has_error_on(field),
                "{:?} should fail on {}: {:?}",
                config,
                field,
                report
            );
        }
    }

    #[test]
    fn test_binary_without_scores_rejected() {
        let report = validate_draft(&draft(ConfigDraft::Binary(BinaryDraft {
            option_a: "Pass".into(),
            option_b: "Fail".into(),
            ..Default::default()
        })))
        .unwrap_err();
        assert_eq!(
            report.errors,
            vec![
                FieldError::Missing { field: "trueScore" },
                FieldError::Missing { field: "falseScore" },
            ]
        );
    }

    #[test]
    fn test_number_rejects_non_finite() {
        let report = validate_draft(&draft(ConfigDraft::Number(NumberDraft {
            min: Some(f64::NAN),
            max: Some(f64::INFINITY),
        })))
        .unwrap_err();
        assert_eq!(
            report.errors,
            vec![
                FieldError::NotFinite { field: "min" },
                FieldError::NotFinite { field: "max" },
            ]
        );
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let report = validate_draft(&draft(ConfigDraft::Number(NumberDraft {
            min: Some(10.0),
            max: Some(1.0),
        })))
        .unwrap_err();
        assert_eq!(
            report.errors,
            vec![FieldError::InvertedRange {
                min_field: "min",
                max_field: "max"
            }]
        );

        let report = validate_draft(&draft(ConfigDraft::Date(DateDraft {
            mode: DateMode::Range,
            start_date: Some(day(20)),
            end_date: Some(day(10)),
            ..Default::default()
        })))
        .unwrap_err();
        assert!(report.has_error_on("startDate"));
    }

    #[test]
    fn test_range_operator_with_amount_is_contradictory() {
        let report = validate_draft(&draft(ConfigDraft::Currency(CurrencyDraft {
            operator: ComparisonOperator::Range,
            amount: Some(Decimal::new(10, 0)),
            min: Some(Decimal::new(1, 0)),
            max: Some(Decimal::new(20, 0)),
        })))
        .unwrap_err();
        assert_eq!(
            report.errors,
            vec![FieldError::Contradictory {
                field: "amount",
                context: "the range operator"
            }]
        );
    }

    #[test]
    fn test_threshold_currency_builds_threshold_config() {
        let validated = validate_draft(&draft(ConfigDraft::Currency(CurrencyDraft {
            operator: ComparisonOperator::AtMost,
            amount: Some(Decimal::new(1200, 0)),
            min: None,
            max: None,
        })))
        .unwrap();
        assert_eq!(
            validated.config,
            MeasurementConfig::Currency(CurrencyConfig::Threshold {
                operator: ThresholdOperator::AtMost,
                amount: Decimal::new(1200, 0),
            })
        );
    }

    #[test]
    fn test_percentage_defaults_bounds() {
        let validated = validate_draft(&draft(ConfigDraft::Percentage(PercentageDraft {
            target: Some(80.0),
            ..Default::default()
        })))
        .unwrap();
        match validated.config {
            MeasurementConfig::Percentage(p) => {
                assert_eq!((p.min, p.max), (0.0, 100.0));
            }
            other => panic!("Expected percentage, got {:?}", other),
        }
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_percentage_target_outside_bounds_warns() {
        let validated = validate_draft(&draft(ConfigDraft::Percentage(PercentageDraft {
            target: Some(120.0),
            ..Default::default()
        })))
        .unwrap();
        assert!(matches!(
            validated.warnings[..],
            [FieldWarning::TargetOutsideBounds { .. }]
        ));
    }

    #[test]
    fn test_weight_bounds() {
        for (weight, ok) in [
            (Decimal::ZERO, false),
            (Decimal::new(-5, 0), false),
            (Decimal::new(1, 2), true),
            (Decimal::ONE_HUNDRED, true),
            (Decimal::new(10001, 2), false),
        ] {
            let mut d = draft(valid_drafts().remove(0));
            d.weight = Some(weight);
            assert_eq!(is_valid(&d), ok, "weight {}", weight);
        }

        let mut d = draft(valid_drafts().remove(0));
        d.weight = None;
        assert!(validate_draft(&d).unwrap_err().has_error_on("weight"));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut d = draft(valid_drafts().remove(0));
        d.name = "   ".into();
        let report = validate_draft(&d).unwrap_err();
        assert_eq!(report.errors, vec![FieldError::Blank { field: "name" }]);
    }

    #[test]
    fn test_missing_unit_warns_for_currency_only() {
        let mut d = draft(valid_drafts().remove(1));
        d.unit = String::new();
        let validated = validate_draft(&d).unwrap();
        assert_eq!(
            validated.warnings,
            vec![FieldWarning::MissingUnit {
                measurement_type: MeasurementType::Currency
            }]
        );

        let mut d = draft(valid_drafts().remove(0));
        d.unit = String::new();
        assert!(validate_draft(&d).unwrap().warnings.is_empty());
    }

    #[test]
    fn test_custom_expression_must_only_use_x() {
        let report = validate_draft(&draft(ConfigDraft::Custom(CustomDraft {
            expression: "x + salary".into(),
        })))
        .unwrap_err();
        assert!(matches!(
            report.errors[..],
            [FieldError::InvalidExpression(FormulaError::UnknownIdentifier { .. })]
        ));
    }

    #[test]
    fn test_report_converts_to_diagnostics() {
        let mut d = draft(ConfigDraft::Binary(BinaryDraft {
            option_a: "Done".into(),
            option_b: "done".into(),
            true_score: Some(1.0),
            false_score: None,
            ..Default::default()
        }));
        d.weight = Some(Decimal::new(150, 0));
        let report = validate_draft(&d).unwrap_err();
        let diags = report.to_diagnostics();
        let fields: Vec<_> = diags.iter().map(|d| d.field.as_deref().unwrap()).collect();
        assert_eq!(fields, vec!["weight", "falseScore", "optionB"]);
        assert!(diags[0].is_error());
        assert!(diags[2].is_warning());
    }
}
