use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Money leaving the business account.
    Debit,
    /// Money arriving in the business account.
    Credit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Debit => write!(f, "debit"),
            Direction::Credit => write!(f, "credit"),
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debit" | "dr" => Ok(Direction::Debit),
            "credit" | "cr" => Ok(Direction::Credit),
            _ => Err(CoreError::UnknownDirection(s.to_string())),
        }
    }
}

/// One line of an uploaded bank statement. `amount` is always a magnitude;
/// the sign lives in `direction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: String,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub direction: Direction,
    pub contact: Option<String>,
    pub merchant_category: Option<String>,
}

impl BankTransaction {
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        description: &str,
        amount: Money,
        direction: Direction,
    ) -> Self {
        BankTransaction {
            id: id.into(),
            date,
            description: description.to_string(),
            amount: amount.abs(),
            direction,
            contact: None,
            merchant_category: None,
        }
    }

    /// Builds a transaction from a signed statement amount: negative is a debit.
    pub fn from_signed(
        id: impl Into<String>,
        date: NaiveDate,
        description: &str,
        signed: Money,
    ) -> Self {
        let direction = if signed.is_negative() {
            Direction::Debit
        } else {
            Direction::Credit
        };
        Self::new(id, date, description, signed, direction)
    }

    pub fn with_contact(mut self, contact: &str) -> Self {
        self.contact = Some(contact.to_string());
        self
    }

    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Debit => Money::zero() - self.amount,
            Direction::Credit => self.amount,
        }
    }
}

/// A transaction after categorization, kept for learning and rule suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalTransaction {
    pub transaction: BankTransaction,
    pub run_id: String,
    pub account_id: String,
    pub account_name: String,
    pub confidence: f32,
    pub was_exception: bool,
    pub rule_applied: Option<String>,
}
