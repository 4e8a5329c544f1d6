use saim_core::{DateRange, HistoricalTransaction, Money, ProcessingRun};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::exceptions::{ExceptionQueue, StatusCounts};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountLine {
    pub account_id: String,
    pub account_name: String,
    pub count: usize,
    /// Signed sum: credits positive, debits negative.
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionSummary {
    pub pending: usize,
    pub assigned: usize,
    pub rule_created: usize,
    pub ignored: usize,
}

impl From<StatusCounts> for ExceptionSummary {
    fn from(c: StatusCounts) -> Self {
        Self {
            pending: c.pending,
            assigned: c.assigned,
            rule_created: c.rule_created,
            ignored: c.ignored,
        }
    }
}

/// End-of-run summary: where the money went and how exceptions ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub file_name: String,
    pub period: DateRange,
    pub transaction_count: usize,
    pub accounts: Vec<AccountLine>,
    pub exceptions: ExceptionSummary,
    pub rules_applied: usize,
    pub summary: String,
}

impl RunReport {
    /// `history` is the run's categorized transactions after exception
    /// resolution; account lines are ordered by account code.
    pub fn build(
        run: &ProcessingRun,
        history: &[HistoricalTransaction],
        exceptions: &ExceptionQueue,
    ) -> Self {
        let mut lines: BTreeMap<&str, AccountLine> = BTreeMap::new();
        for h in history.iter().filter(|h| h.run_id == run.id) {
            let line = lines.entry(h.account_id.as_str()).or_insert_with(|| AccountLine {
                account_id: h.account_id.clone(),
                account_name: h.account_name.clone(),
                count: 0,
                total: Money::zero(),
            });
            line.count += 1;
            line.total = line.total + h.transaction.signed_amount();
        }
        Self {
            run_id: run.id.clone(),
            file_name: run.file_name.clone(),
            period: run.period,
            transaction_count: run.transaction_count,
            accounts: lines.into_values().collect(),
            exceptions: exceptions.counts().into(),
            rules_applied: run.rules_applied.len(),
            summary: run.summary.clone(),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Report for {} ({})", self.file_name, self.period)?;
        writeln!(f, "{}", self.summary)?;
        for line in &self.accounts {
            writeln!(
                f,
                "  {} {}: {} transactions, {}",
                line.account_id, line.account_name, line.count, line.total
            )?;
        }
        let e = &self.exceptions;
        writeln!(
            f,
            "Exceptions: {} assigned, {} rule created, {} ignored, {} pending",
            e.assigned, e.rule_created, e.ignored, e.pending
        )?;
        write!(f, "Rules applied: {}", self.rules_applied)
    }
}
