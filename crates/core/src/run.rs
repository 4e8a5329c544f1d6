use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::company::CompanyId;
use crate::money::Money;
use crate::period::DateRange;
use crate::transaction::BankTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

/// One bank statement processed for a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub id: String,
    pub company_id: CompanyId,
    pub file_name: String,
    pub period: DateRange,
    pub processed_at: DateTime<Utc>,
    pub status: RunStatus,
    pub transaction_count: usize,
    pub exceptions_count: usize,
    pub rules_applied: Vec<String>,
    pub summary: String,
}

impl ProcessingRun {
    pub fn start(company_id: CompanyId, file_name: &str, period: DateRange) -> Self {
        ProcessingRun {
            id: format!("run_{}", uuid::Uuid::new_v4().simple()),
            company_id,
            file_name: file_name.to_string(),
            period,
            processed_at: Utc::now(),
            status: RunStatus::InProgress,
            transaction_count: 0,
            exceptions_count: 0,
            rules_applied: Vec::new(),
            summary: String::new(),
        }
    }

    pub fn complete(
        &mut self,
        transaction_count: usize,
        exceptions_count: usize,
        rules_applied: Vec<String>,
    ) {

        self.status = RunStatus::Completed;
        self.transaction_count = transaction_count;
        self.exceptions_count = exceptions_count;
        self.rules_applied = rules_applied;
        self.summary = format!(
            "Processed {transaction_count} transactions with {exceptions_count} exceptions"
        );
    }
}

/// A pattern-backed hint offered alongside an exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionSuggestion {
    pub account_id: String,
    pub account_name: String,
    pub frequency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExceptionStatus {
    Pending,
    Assigned { account_id: String },
    RuleCreated { rule_id: String, account_id: String },
    Ignored,
}

impl ExceptionStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ExceptionStatus::Pending)
    }
}

impl fmt::Display for ExceptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExceptionStatus::Pending => write!(f, "pending"),
            ExceptionStatus::Assigned { account_id } => write!(f, "assigned to {account_id}"),
            ExceptionStatus::RuleCreated { rule_id, .. } => write!(f, "rule {rule_id} created"),
            ExceptionStatus::Ignored => write!(f, "ignored"),
        }
    }
}

/// A transaction the categorizer could not confidently resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionException {
    pub id: String,
    pub transaction_id: String,
    pub run_id: Option<String>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub reason: String,
    pub suggested_account: Option<String>,
    pub suggestion: Option<ExceptionSuggestion>,
    pub status: ExceptionStatus,
}

impl TransactionException {
    pub fn for_transaction(tx: &BankTransaction, reason: &str) -> Self {
        TransactionException {
            id: format!("ex_{}", tx.id),
            transaction_id: tx.id.clone(),
            run_id: None,
            date: tx.date,
            description: tx.description.clone(),
            amount: tx.signed_amount(),
            reason: reason.to_string(),
            suggested_account: None,
            suggestion: None,
            status: ExceptionStatus::Pending,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Direction;

    #[test]
    fn completing_a_run_writes_summary() {
        let period = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        let mut run = ProcessingRun::start(CompanyId("c1".into()), "jan.csv", period);
        assert_eq!(run.status, RunStatus::InProgress);
        run.complete(50, 2, vec!["rule_a".into()]);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.summary, "Processed 50 transactions with 2 exceptions");
    }

    #[test]
    fn exception_carries_signed_amount() {
        let tx = BankTransaction::new(
            "t9",
            NaiveDate::from_ymd_opt(2023, 1, 12).unwrap(),
            "Vague Vendor LLC",
            Money::from_cents(7500),
            Direction::Debit,
        );
        let ex = TransactionException::for_transaction(&tx, "Unknown Vendor");
        assert_eq!(ex.amount, Money::from_cents(-7500));
        assert_eq!(ex.status, ExceptionStatus::Pending);
        assert!(!ex.is_resolved());
    }
}
