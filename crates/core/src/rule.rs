use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::company::CompanyId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("Rule name must not be empty")]
    EmptyName,
    #[error("Rule needs at least one condition")]
    NoConditions,
    #[error("Operator '{operator}' cannot be used with field '{field}'")]
    IncompatibleOperator { field: RuleField, operator: RuleOperator },
    #[error("'{value}' is not a valid value for {field} {operator}")]
    InvalidValue {
        field: RuleField,
        operator: RuleOperator,
        value: String,
    },
    #[error("Range minimum {min} is greater than maximum {max}")]
    InvalidRange { min: Decimal, max: Decimal },
    #[error("Unknown rule field: '{0}'")]
    UnknownField(String),
    #[error("Unknown rule operator: '{0}'")]
    UnknownOperator(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Description,
    Amount,
    Payee,
    MerchantCategory,
}

impl RuleField {
    pub fn is_numeric(self) -> bool {
        matches!(self, RuleField::Amount)
    }

    /// Operators that make sense for this field, in the order they are offered.
    pub fn operators(self) -> &'static [RuleOperator] {
        if self.is_numeric() {
            &[
                RuleOperator::Equals,
                RuleOperator::GreaterThan,
                RuleOperator::LessThan,
                RuleOperator::IsBetween,
            ]
        } else {
            &[
                RuleOperator::Contains,
                RuleOperator::Equals,
                RuleOperator::StartsWith,
                RuleOperator::EndsWith,
            ]
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleField::Description => write!(f, "description"),
            RuleField::Amount => write!(f, "amount"),
            RuleField::Payee => write!(f, "payee"),
            RuleField::MerchantCategory => write!(f, "merchant_category"),
        }
    }
}

impl FromStr for RuleField {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "description" => Ok(RuleField::Description),
            "amount" => Ok(RuleField::Amount),
            "payee" => Ok(RuleField::Payee),
            "merchant_category" => Ok(RuleField::MerchantCategory),
            _ => Err(RuleError::UnknownField(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Contains,
    Equals,
    GreaterThan,
    LessThan,
    IsBetween,
    StartsWith,
    EndsWith,
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOperator::Contains => write!(f, "contains"),
            RuleOperator::Equals => write!(f, "equals"),
            RuleOperator::GreaterThan => write!(f, "greater_than"),
            RuleOperator::LessThan => write!(f, "less_than"),
            RuleOperator::IsBetween => write!(f, "is_between"),
            RuleOperator::StartsWith => write!(f, "starts_with"),
            RuleOperator::EndsWith => write!(f, "ends_with"),
        }
    }
}

impl FromStr for RuleOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "contains" => Ok(RuleOperator::Contains),
            "equals" | "=" => Ok(RuleOperator::Equals),
            "greater_than" | ">" => Ok(RuleOperator::GreaterThan),
            "less_than" | "<" => Ok(RuleOperator::LessThan),
            "is_between" | "between" => Ok(RuleOperator::IsBetween),
            "starts_with" => Ok(RuleOperator::StartsWith),
            "ends_with" => Ok(RuleOperator::EndsWith),
            _ => Err(RuleError::UnknownOperator(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleConditionValue {
    Text(String),
    Number(Decimal),
    Range { min: Decimal, max: Decimal },
}

impl RuleConditionValue {
    /// Parses free-text user input into the value shape `field` and
    /// `operator` require.
    pub fn parse(field: RuleField, operator: RuleOperator, input: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::InvalidValue {
            field,
            operator,
            value: input.to_string(),
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if !field.is_numeric() {
            return Ok(RuleConditionValue::Text(trimmed.to_string()));
        }

        if operator == RuleOperator::IsBetween {
            let lowered = trimmed.to_lowercase();
            let parts: Vec<&str> = if lowered.contains("..") {
                lowered.splitn(2, "..").collect()
            } else if lowered.contains(" and ") {
                lowered.splitn(2, " and ").collect()
            } else {
                lowered.splitn(2, '-').collect()
            };
            if parts.len() != 2 {
                return Err(invalid());
            }
            let min = parse_number(parts[0]).ok_or_else(invalid)?;
            let max = parse_number(parts[1]).ok_or_else(invalid)?;
            if min > max {
                return Err(RuleError::InvalidRange { min, max });
            }
            return Ok(RuleConditionValue::Range { min, max });
        }

        parse_number(trimmed)
            .map(RuleConditionValue::Number)
            .ok_or_else(invalid)
    }

    fn fits(&self, field: RuleField, operator: RuleOperator) -> bool {
        match self {
            RuleConditionValue::Text(_) => !field.is_numeric(),
            RuleConditionValue::Number(_) => {
                field.is_numeric() && operator != RuleOperator::IsBetween
            }
            RuleConditionValue::Range { .. } => {
                field.is_numeric() && operator == RuleOperator::IsBetween
            }
        }
    }
}

impl fmt::Display for RuleConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleConditionValue::Text(s) => write!(f, "\"{s}\""),
            RuleConditionValue::Number(n) => write!(f, "{n}"),
            RuleConditionValue::Range { min, max } => write!(f, "{min} and {max}"),
        }
    }
}

fn parse_number(s: &str) -> Option<Decimal> {
    let cleaned = s.trim().replace([',', '$', ' '], "");
    Decimal::from_str(&cleaned).ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: RuleField,
    pub operator: RuleOperator,
    pub value: RuleConditionValue,
}

impl RuleCondition {
    pub fn new(
        field: RuleField,
        operator: RuleOperator,
        value: RuleConditionValue,
    ) -> Result<Self, RuleError> {
        if !field.operators().contains(&operator) {
            return Err(RuleError::IncompatibleOperator { field, operator });
        }
        if !value.fits(field, operator) {
            return Err(RuleError::InvalidValue {
                field,
                operator,
                value: value.to_string(),
            });
        }
        Ok(RuleCondition { field, operator, value })
    }

    pub fn text(field: RuleField, operator: RuleOperator, value: &str) -> Result<Self, RuleError> {
        Self::new(field, operator, RuleConditionValue::Text(value.to_string()))
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRule {
    pub id: String,
    pub company_id: CompanyId,
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    pub apply_to_account_id: String,
    pub apply_to_account_name: String,
    pub is_enabled: bool,
    /// User confidence in the rule, 0 to 100.
    pub confidence: u8,
    pub times_applied: u64,
    pub accuracy: f32,
    pub created_at: DateTime<Utc>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub suggested: bool,
}

impl TransactionRule {
    pub fn new(
        company_id: CompanyId,
        name: &str,
        conditions: Vec<RuleCondition>,
        account_id: &str,
        account_name: &str,
    ) -> Result<Self, RuleError> {
        if name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        if conditions.is_empty() {
            return Err(RuleError::NoConditions);
        }
        Ok(TransactionRule {
            id: format!("rule_{}", uuid::Uuid::new_v4().simple()),
            company_id,
            name: name.trim().to_string(),
            conditions,
            apply_to_account_id: account_id.to_string(),
            apply_to_account_name: account_name.to_string(),
            is_enabled: true,
            confidence: 100,
            times_applied: 0,
            accuracy: 1.0,
            created_at: Utc::now(),
            last_applied_at: None,
            suggested: false,
        })
    }

    pub fn record_application(&mut self, at: DateTime<Utc>) {
        self.times_applied += 1;
        self.last_applied_at = Some(at);
    }
}
