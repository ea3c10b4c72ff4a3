//! Measurement Types - Level 1 Foundation Types
//!
//! Pure data structures describing how a goal is measured. Every other crate
//! in the workspace builds on these; this crate depends on nothing in the
//! workspace.
//!
//! ## Contents
//!
//! - Measurement identity (`MeasurementId`)
//! - The six measurement kinds and their typed configurations
//! - Draft forms of the same configurations (every field optional) used
//!   for input that has not been validated yet
//! - Patches for in-place edits
//!
//! ## Rules
//!
//! 1. **NO BUSINESS LOGIC** - validation lives in the scoring crate
//! 2. **TYPE FOLLOWS CONFIG** - a measurement's type is derived from its
//!    config variant, so a binary config can never sit on a number measurement
//! 3. **SERIALIZABLE** - all types support serde

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY
// ============================================================================

/// Opaque identifier of a measurement, stable across edits and reorders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeasurementId(Uuid);

impl MeasurementId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MeasurementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MEASUREMENT KINDS
// ============================================================================

/// Capability tag of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    Number,
    Currency,
    Percentage,
    Binary,
    Date,
    Custom,
}

impl MeasurementType {
    pub const ALL: [MeasurementType; 6] = [
        MeasurementType::Number,
        MeasurementType::Currency,
        MeasurementType::Percentage,
        MeasurementType::Binary,
        MeasurementType::Date,
        MeasurementType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementType::Number => "number",
            MeasurementType::Currency => "currency",
            MeasurementType::Percentage => "percentage",
            MeasurementType::Binary => "binary",
            MeasurementType::Date => "date",
            MeasurementType::Custom => "custom",
        }
    }

    /// Whether a unit annotation is expected for this kind
    pub fn expects_unit(&self) -> bool {
        matches!(self, MeasurementType::Currency | MeasurementType::Percentage)
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a type tag, operator, mode or option cannot be recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what} '{value}'")]
pub struct UnknownTag {
    pub what: &'static str,
    pub value: String,
}

impl UnknownTag {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

impl FromStr for MeasurementType {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" => Ok(MeasurementType::Number),
            "currency" => Ok(MeasurementType::Currency),
            "percentage" | "percent" => Ok(MeasurementType::Percentage),
            "binary" => Ok(MeasurementType::Binary),
            "date" => Ok(MeasurementType::Date),
            "custom" => Ok(MeasurementType::Custom),
            _ => Err(UnknownTag::new("measurement type", s)),
        }
    }
}

// ============================================================================
// OPERATORS AND OPTIONS
// ============================================================================

/// Target comparison offered by currency and percentage measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = "<=")]
    AtMost,
    #[serde(rename = "=")]
    Exactly,
    #[serde(rename = "range")]
    Range,
}

impl ComparisonOperator {
    /// The single-value form of this operator, `None` for `Range`
    pub fn threshold(&self) -> Option<ThresholdOperator> {
        match self {
            ComparisonOperator::AtLeast => Some(ThresholdOperator::AtLeast),
            ComparisonOperator::AtMost => Some(ThresholdOperator::AtMost),
            ComparisonOperator::Exactly => Some(ThresholdOperator::Exactly),
            ComparisonOperator::Range => None,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            ">=" | "≥" | "gte" => Ok(ComparisonOperator::AtLeast),
            "<=" | "≤" | "lte" => Ok(ComparisonOperator::AtMost),
            "=" | "==" | "eq" => Ok(ComparisonOperator::Exactly),
            "range" => Ok(ComparisonOperator::Range),
            _ => Err(UnknownTag::new("operator", s)),
        }
    }
}

/// Single-value comparison (currency thresholds cannot carry `range`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdOperator {
    #[serde(rename = ">=")]
    AtLeast,
    #[serde(rename = "<=")]
    AtMost,
    #[serde(rename = "=")]
    Exactly,
}

impl From<ThresholdOperator> for ComparisonOperator {
    fn from(op: ThresholdOperator) -> Self {
        match op {
            ThresholdOperator::AtLeast => ComparisonOperator::AtLeast,
            ThresholdOperator::AtMost => ComparisonOperator::AtMost,
            ThresholdOperator::Exactly => ComparisonOperator::Exactly,
        }
    }
}

/// One of the two outcomes of a binary measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinaryOption {
    #[default]
    A,
    B,
}

impl FromStr for BinaryOption {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(BinaryOption::A),
            "B" | "b" => Ok(BinaryOption::B),
            _ => Err(UnknownTag::new("binary option", s)),
        }
    }
}

/// How a date measurement is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    #[default]
    Deadline,
    Range,
}

impl FromStr for DateMode {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deadline" => Ok(DateMode::Deadline),
            "range" => Ok(DateMode::Range),
            _ => Err(UnknownTag::new("date mode", s)),
        }
    }
}

// ============================================================================
// VALIDATED CONFIGURATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberConfig {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CurrencyConfig {
    Threshold {
        operator: ThresholdOperator,
        amount: Decimal,
    },
    Range {
        min: Decimal,
        max: Decimal,
    },
}

impl CurrencyConfig {
    pub fn operator(&self) -> ComparisonOperator {
        match self {
            CurrencyConfig::Threshold { operator, .. } => (*operator).into(),
            CurrencyConfig::Range { .. } => ComparisonOperator::Range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageConfig {
    pub operator: ComparisonOperator,
    pub target: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryConfig {
    pub option_a: String,
    pub option_b: String,
    pub positive_is: BinaryOption,
    pub true_score: f64,
    pub false_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DateConfig {
    #[serde(rename_all = "camelCase")]
    Deadline { target_date: NaiveDate },
    #[serde(rename_all = "camelCase")]
    Range {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
}

impl DateConfig {
    pub fn mode(&self) -> DateMode {
        match self {
            DateConfig::Deadline { .. } => DateMode::Deadline,
            DateConfig::Range { .. } => DateMode::Range,
        }
    }
}

/// Per-measurement sub-expression over `x`, the measurement's raw value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomConfig {
    pub expression: String,
}

/// Typed configuration; the variant *is* the measurement type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "settings", rename_all = "lowercase")]
pub enum MeasurementConfig {
    Number(NumberConfig),
    Currency(CurrencyConfig),
    Percentage(PercentageConfig),
    Binary(BinaryConfig),
    Date(DateConfig),
    Custom(CustomConfig),
}

impl MeasurementConfig {
    pub fn measurement_type(&self) -> MeasurementType {
        match self {
            MeasurementConfig::Number(_) => MeasurementType::Number,
            MeasurementConfig::Currency(_) => MeasurementType::Currency,
            MeasurementConfig::Percentage(_) => MeasurementType::Percentage,
            MeasurementConfig::Binary(_) => MeasurementType::Binary,
            MeasurementConfig::Date(_) => MeasurementType::Date,
            MeasurementConfig::Custom(_) => MeasurementType::Custom,
        }
    }
}

// ============================================================================
// MEASUREMENT
// ============================================================================

/// One weighted, typed scoring component of a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: MeasurementId,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Share of the goal's total score, `0 < weight <= 100`
    pub weight: Decimal,
    pub config: MeasurementConfig,
}

impl Measurement {
    pub fn measurement_type(&self) -> MeasurementType {
        self.config.measurement_type()
    }

    /// Convert back into editable draft form
    pub fn to_draft(&self) -> MeasurementDraft {
        MeasurementDraft {
            name: self.name.clone(),
            unit: self.unit.clone(),
            weight: Some(self.weight),
            config: ConfigDraft::from(&self.config),
        }
    }
}

// ============================================================================
// DRAFTS (unvalidated input)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberDraft {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyDraft {
    pub operator: ComparisonOperator,
    pub amount: Option<Decimal>,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

impl Default for CurrencyDraft {
    fn default() -> Self {
        Self {
            operator: ComparisonOperator::AtLeast,
            amount: None,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PercentageDraft {
    pub operator: ComparisonOperator,
    pub target: Option<f64>,
    /// Defaults to 0 when absent
    pub min: Option<f64>,
    /// Defaults to 100 when absent
    pub max: Option<f64>,
}

impl Default for PercentageDraft {
    fn default() -> Self {
        Self {
            operator: ComparisonOperator::AtLeast,
            target: None,
            min: None,
            max: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BinaryDraft {
    pub option_a: String,
    pub option_b: String,
    pub positive_is: BinaryOption,
    pub true_score: Option<f64>,
    pub false_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DateDraft {
    pub mode: DateMode,
    pub target_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomDraft {
    pub expression: String,
}

/// Draft configuration, still keyed by type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "settings", rename_all = "lowercase")]
pub enum ConfigDraft {
    Number(NumberDraft),
    Currency(CurrencyDraft),
    Percentage(PercentageDraft),
    Binary(BinaryDraft),
    Date(DateDraft),
    Custom(CustomDraft),
}

impl ConfigDraft {
    /// An empty draft of the given type, as a freshly opened form would hold
    pub fn empty(measurement_type: MeasurementType) -> Self {
        match measurement_type {
            MeasurementType::Number => ConfigDraft::Number(NumberDraft::default()),
            MeasurementType::Currency => ConfigDraft::Currency(CurrencyDraft::default()),
            MeasurementType::Percentage => ConfigDraft::Percentage(PercentageDraft::default()),
            MeasurementType::Binary => ConfigDraft::Binary(BinaryDraft::default()),
            MeasurementType::Date => ConfigDraft::Date(DateDraft::default()),
            MeasurementType::Custom => ConfigDraft::Custom(CustomDraft::default()),
        }
    }

    pub fn measurement_type(&self) -> MeasurementType {
        match self {
            ConfigDraft::Number(_) => MeasurementType::Number,
            ConfigDraft::Currency(_) => MeasurementType::Currency,
            ConfigDraft::Percentage(_) => MeasurementType::Percentage,
            ConfigDraft::Binary(_) => MeasurementType::Binary,
            ConfigDraft::Date(_) => MeasurementType::Date,
            ConfigDraft::Custom(_) => MeasurementType::Custom,
        }
    }
}

impl From<&MeasurementConfig> for ConfigDraft {
    fn from(config: &MeasurementConfig) -> Self {
        match config {
            MeasurementConfig::Number(c) => ConfigDraft::Number(NumberDraft {
                min: Some(c.min),
                max: Some(c.max),
            }),
            MeasurementConfig::Currency(CurrencyConfig::Threshold { operator, amount }) => {
                ConfigDraft::Currency(CurrencyDraft {
                    operator: (*operator).into(),
                    amount: Some(*amount),
                    min: None,
                    max: None,
                })
            }
            MeasurementConfig::Currency(CurrencyConfig::Range { min, max }) => {
                ConfigDraft::Currency(CurrencyDraft {
                    operator: ComparisonOperator::Range,
                    amount: None,
                    min: Some(*min),
                    max: Some(*max),
                })
            }
            MeasurementConfig::Percentage(c) => ConfigDraft::Percentage(PercentageDraft {
                operator: c.operator,
                target: Some(c.target),
                min: Some(c.min),
                max: Some(c.max),
            }),
            MeasurementConfig::Binary(c) => ConfigDraft::Binary(BinaryDraft {
                option_a: c.option_a.clone(),
                option_b: c.option_b.clone(),
                positive_is: c.positive_is,
                true_score: Some(c.true_score),
                false_score: Some(c.false_score),
            }),
            MeasurementConfig::Date(DateConfig::Deadline { target_date }) => {
                ConfigDraft::Date(DateDraft {
                    mode: DateMode::Deadline,
                    target_date: Some(*target_date),
                    start_date: None,
                    end_date: None,
                })
            }
            MeasurementConfig::Date(DateConfig::Range {
                start_date,
                end_date,
            }) => ConfigDraft::Date(DateDraft {
                mode: DateMode::Range,
                target_date: None,
                start_date: Some(*start_date),
                end_date: Some(*end_date),
            }),
            MeasurementConfig::Custom(c) => ConfigDraft::Custom(CustomDraft {
                expression: c.expression.clone(),
            }),
        }
    }
}

/// A prospective measurement, new or edited, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementDraft {
    pub name: String,
    #[serde(default)]
    pub unit: String,
    pub weight: Option<Decimal>,
    pub config: ConfigDraft,
}

impl MeasurementDraft {
    pub fn new(name: impl Into<String>, weight: Decimal, config: ConfigDraft) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            weight: Some(weight),
            config,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn measurement_type(&self) -> MeasurementType {
        self.config.measurement_type()
    }
}

/// In-place edit of an existing measurement; `None` keeps the current value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementPatch {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub weight: Option<Decimal>,
    pub config: Option<ConfigDraft>,
}

impl MeasurementPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.unit.is_none() && self.weight.is_none() && self.config.is_none()
    }

    /// Overlay this patch onto a draft
    pub fn apply(self, mut draft: MeasurementDraft) -> MeasurementDraft {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(unit) = self.unit {
            draft.unit = unit;
        }
        if let Some(weight) = self.weight {
            draft.weight = Some(weight);
        }
        if let Some(config) = self.config {
            draft.config = config;
        }
        draft
    }
}

// ============================================================================
// TESTS
// ============================================================================
