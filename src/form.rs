//! Raw form input
//!
//! The editing surface hands over plain strings. This module reads them into a
//! [`MeasurementDraft`], turning blanks into absent fields and collecting a
//! [`FieldError::Unparseable`] for anything that cannot be read. Whether the
//! draft is complete is left to the validator.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use measure_types::{
    BinaryDraft, ComparisonOperator, ConfigDraft, CurrencyDraft, CustomDraft, DateDraft,
    MeasurementDraft, MeasurementType, NumberDraft, PercentageDraft,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::validator::{FieldError, ValidationReport};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Field keys used by the editing surface
pub mod keys {
    pub const MIN: &str = "min";
    pub const MAX: &str = "max";
    pub const OPERATOR: &str = "operator";
    pub const AMOUNT: &str = "amount";
    pub const TARGET: &str = "target";
    pub const OPTION_A: &str = "optionA";
    pub const OPTION_B: &str = "optionB";
    pub const POSITIVE_IS: &str = "positiveIs";
    pub const TRUE_SCORE: &str = "trueScore";
    pub const FALSE_SCORE: &str = "falseScore";
    pub const MODE: &str = "mode";
    pub const TARGET_DATE: &str = "targetDate";
    pub const START_DATE: &str = "startDate";
    pub const END_DATE: &str = "endDate";
    pub const EXPRESSION: &str = "expression";
}

/// One measurement as typed into the form
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeasurementForm {
    pub name: String,
    #[serde(rename = "type")]
    pub measurement_type: String,
    pub unit: String,
    pub weight: String,
    /// Type-specific fields keyed as in [`keys`]; keys the type does not use are ignored
    pub fields: BTreeMap<String, String>,
}

impl MeasurementForm {
    pub fn new(name: impl Into<String>, measurement_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            measurement_type: measurement_type.into(),
            ..Default::default()
        }
    }

    pub fn weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = weight.into();
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn to_draft(&self) -> Result<MeasurementDraft, ValidationReport> {
        let mut reader = Reader {
            fields: &self.fields,
            errors: Vec::new(),
        };

        let weight = reader.decimal_value("weight", self.weight.trim().trim_end_matches('%'));

        let measurement_type = match MeasurementType::from_str(&self.measurement_type) {
            Ok(t) => Some(t),
            Err(_) => {
                reader.errors.push(FieldError::Unparseable {
                    field: "type",
                    value: self.measurement_type.clone(),
                });
                None
            }
        };

        let config = measurement_type.map(|t| reader.config(t));

        match config {
            Some(config) if reader.errors.is_empty() => Ok(MeasurementDraft {
                name: self.name.clone(),
                unit: self.unit.clone(),
                weight,
                config,
            }),
            _ => Err(ValidationReport {
                errors: reader.errors,
                warnings: Vec::new(),
            }),
        }
    }
}

struct Reader<'a> {
    fields: &'a BTreeMap<String, String>,
    errors: Vec<FieldError>,
}

impl<'a> Reader<'a> {
    fn config(&mut self, measurement_type: MeasurementType) -> ConfigDraft {
        match measurement_type {
            MeasurementType::Number => ConfigDraft::Number(NumberDraft {
                min: self.number(keys::MIN),
                max: self.number(keys::MAX),
            }),
            MeasurementType::Currency => ConfigDraft::Currency(CurrencyDraft {
                operator: self.tag(keys::OPERATOR).unwrap_or(ComparisonOperator::AtLeast),
                amount: self.decimal(keys::AMOUNT),
                min: self.decimal(keys::MIN),
                max: self.decimal(keys::MAX),
            }),
            MeasurementType::Percentage => ConfigDraft::Percentage(PercentageDraft {
                operator: self.tag(keys::OPERATOR).unwrap_or(ComparisonOperator::AtLeast),
                target: self.number(keys::TARGET),
                min: self.number(keys::MIN),
                max: self.number(keys::MAX),
            }),
            MeasurementType::Binary => ConfigDraft::Binary(BinaryDraft {
                option_a: self.text(keys::OPTION_A).unwrap_or_default().to_string(),
                option_b: self.text(keys::OPTION_B).unwrap_or_default().to_string(),
                positive_is: self.tag(keys::POSITIVE_IS).unwrap_or_default(),
                true_score: self.number(keys::TRUE_SCORE),
                false_score: self.number(keys::FALSE_SCORE),
            }),
            MeasurementType::Date => ConfigDraft::Date(DateDraft {
                mode: self.tag(keys::MODE).unwrap_or_default(),
                target_date: self.date(keys::TARGET_DATE),
                start_date: self.date(keys::START_DATE),
                end_date: self.date(keys::END_DATE),
            }),
            MeasurementType::Custom => ConfigDraft::Custom(CustomDraft {
                expression: self.text(keys::EXPRESSION).unwrap_or_default().to_string(),
            }),
        }
    }

    fn text(&self, key: &str) -> Option<&'a str> {
        self.fields
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&mut self, key: &'static str, read: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = self.text(key)?;
        let value = read(raw);
        if value.is_none() {
            self.errors.push(FieldError::Unparseable {
                field: key,
                value: raw.to_string(),
            });
        }
        value
    }

    fn number(&mut self, key: &'static str) -> Option<f64> {
        self.parse(key, |s| s.replace(',', "").parse().ok())
    }

    fn decimal(&mut self, key: &'static str) -> Option<Decimal> {
        self.parse(key, read_decimal)
    }

    fn decimal_value(&mut self, field: &'static str, raw: &str) -> Option<Decimal> {
        if raw.is_empty() {
            return None;
        }
        let value = read_decimal(raw);
        if value.is_none() {
            self.errors.push(FieldError::Unparseable {
                field,
                value: raw.to_string(),
            });
        }
        value
    }

    fn date(&mut self, key: &'static str) -> Option<NaiveDate> {
        self.parse(key, |s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
    }

    fn tag<T: FromStr>(&mut self, key: &'static str) -> Option<T> {
        self.parse(key, |s| s.parse().ok())
    }
}

fn read_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', "")).ok()
}
