//! Runs a statement through the rule engine, falling back to the account
//! scorer, and turns weak results into exceptions.
//!
//! Rules always win: a matching enabled rule short-circuits the scorer. Every
//! result, whichever path produced it, is folded back into the pattern store
//! once the whole run has been categorized so that a run never learns from
//! itself mid-flight.

use chrono::Utc;
use saim_core::{
    BankTransaction, ChartOfAccounts, ExceptionSuggestion, HistoricalTransaction,
    TransactionException,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::context::{BusinessContext, ContextCache};
use crate::patterns::{Pattern, PatternStore, DEFAULT_PATTERN_WINDOW};
use crate::rules::RuleEngine;
use crate::scorer::{self, WarningFlag};

pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";
pub const AMBIGUOUS_DESCRIPTION: &str = "Ambiguous Description";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CategorizeError {
    #[error("The chart of accounts is empty; generate or upload one first")]
    EmptyChart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizerSettings {
    /// Results below this confidence become exceptions.
    pub exception_threshold: f32,
    pub pattern_window: usize,
}

impl Default for CategorizerSettings {
    fn default() -> Self {
        Self {
            exception_threshold: scorer::LOW_CONFIDENCE,
            pattern_window: DEFAULT_PATTERN_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategorizationSource {
    Rule { rule_id: String },
    Scorer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub account_id: String,
    pub account_name: String,
    pub confidence: f32,
    pub reasoning: String,
    pub warning_flags: Vec<WarningFlag>,
    pub source: CategorizationSource,
}

impl Categorization {
    pub fn rule_id(&self) -> Option<&str> {
        match &self.source {
            CategorizationSource::Rule { rule_id } => Some(rule_id),
            CategorizationSource::Scorer => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub transaction: BankTransaction,
    pub business_context: BusinessContext,
    pub categorization: Categorization,
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub results: Vec<CategorizationResult>,
    pub exceptions: Vec<TransactionException>,
    /// Ids of the rules that fired, in order of first use.
    pub rules_applied: Vec<String>,
}

impl RunOutcome {
    pub fn history(&self, run_id: &str) -> Vec<HistoricalTransaction> {
        self.results
            .iter()
            .map(|r| HistoricalTransaction {
                transaction: r.transaction.clone(),
                run_id: run_id.to_string(),
                account_id: r.categorization.account_id.clone(),
                account_name: r.categorization.account_name.clone(),
                confidence: r.categorization.confidence,
                was_exception: self
                    .exceptions
                    .iter()
                    .any(|e| e.transaction_id == r.transaction.id),
                rule_applied: r.categorization.rule_id().map(str::to_string),
            })
            .collect()
    }
}

pub fn scorer_reasoning(
    context: &BusinessContext,
    patterns: &[Pattern],
    account_name: &str,
    confidence: f32,
) -> String {
    let mut reasons = vec![format!(
        "Identified {} as {} in {} industry",
        context.contact_name, context.business_nature, context.industry
    )];
    if let Some(top) = patterns.first() {
        reasons.push(format!(
            "Found {} similar historical patterns with {:.1}% similarity",
            patterns.len(),
            top.confidence * 100.0
        ));
    }
    reasons.push(format!(
        "Selected {account_name} based on business relationship and transaction nature"
    ));
    reasons.push(
        if confidence >= 0.8 {
            "High confidence due to strong business context and historical patterns"
        } else if confidence >= 0.6 {
            "Medium confidence with good business context match"
        } else {
            "Lower confidence suggests manual review recommended"
        }
        .to_string(),
    );
    reasons.join(". ") + "."
}

fn suggestion_from(patterns: &[Pattern], chart: &ChartOfAccounts) -> Option<ExceptionSuggestion> {
    let top = patterns.first()?;
    let account_name = chart
        .get(&top.account_id)
        .map(|a| a.name.clone())
        .unwrap_or_else(|| top.account_id.clone());
    Some(ExceptionSuggestion {
        account_id: top.account_id.clone(),
        account_name,
        frequency: patterns
            .iter()
            .filter(|p| p.account_id == top.account_id)
            .count(),
    })
}

/// Borrows a company's rules and patterns for the length of one run.
pub struct Categorizer<'a> {
    settings: &'a CategorizerSettings,
    rules: &'a mut RuleEngine,
    patterns: &'a mut PatternStore,
    contexts: ContextCache,
}

impl<'a> Categorizer<'a> {
    pub fn new(
        settings: &'a CategorizerSettings,
        rules: &'a mut RuleEngine,
        patterns: &'a mut PatternStore,
    ) -> Self {
        Self {
            settings,
            rules,
            patterns,
            contexts: ContextCache::new(),
        }
    }

    /// Categorizes one transaction without learning from it.
    pub fn categorize(
        &mut self,
        tx: &BankTransaction,
        chart: &ChartOfAccounts,
    ) -> Result<CategorizationResult, CategorizeError> {
        if chart.is_empty() {
            return Err(CategorizeError::EmptyChart);
        }

        let business_context = self.contexts.get_or_classify(tx);
        let patterns = self.patterns.find_matches(tx);

        if let Some(rule) = self.rules.apply(tx, Utc::now()) {
            let confidence = f32::from(rule.confidence.min(100)) / 100.0;
            let warning_flags = scorer::warning_flags(tx, &business_context, &patterns, confidence)
                .into_iter()
                .filter(|f| *f == WarningFlag::HighAmount)
                .collect();
            debug!(
                tx = %tx.id,
                rule = %rule.id,
                account = %rule.apply_to_account_id,
                "rule matched"
            );
            return Ok(CategorizationResult {
                transaction: tx.clone(),
                business_context,
                categorization: Categorization {
                    account_id: rule.apply_to_account_id.clone(),
                    account_name: rule.apply_to_account_name.clone(),
                    confidence,
                    reasoning: format!(
                        "Applied rule \"{}\" to {}.",
                        rule.name, rule.apply_to_account_name
                    ),
                    warning_flags,
                    source: CategorizationSource::Rule { rule_id: rule.id },
                },
                patterns,
            });
        }

        let pick = scorer::score(tx, &business_context, &patterns, chart)
            .ok_or(CategorizeError::EmptyChart)?;
        debug!(
            tx = %tx.id,
            account = %pick.account.code,
            confidence = pick.confidence,
            "scored"
        );
        Ok(CategorizationResult {
            transaction: tx.clone(),
            categorization: Categorization {
                account_id: pick.account.code.clone(),
                account_name: pick.account.name.clone(),
                confidence: pick.confidence,
                reasoning: scorer_reasoning(
                    &business_context,
                    &patterns,
                    &pick.account.name,
                    pick.confidence,
                ),
                warning_flags: pick.warning_flags,
                source: CategorizationSource::Scorer,
            },
            business_context,
            patterns,
        })
    }

    /// Categorizes a whole statement, raises exceptions and then learns.
    pub fn run(
        &mut self,
        transactions: &[BankTransaction],
        chart: &ChartOfAccounts,
    ) -> Result<RunOutcome, CategorizeError> {
        if chart.is_empty() {
            return Err(CategorizeError::EmptyChart);
        }
        info!(count = transactions.len(), rules = self.rules.len(), "categorizing statement");

        let mut outcome = RunOutcome::default();
        for tx in transactions {
            let result = self.categorize(tx, chart)?;
            let categorization = &result.categorization;

            if let Some(rule_id) = categorization.rule_id() {
                if !outcome.rules_applied.iter().any(|r| r == rule_id) {
                    outcome.rules_applied.push(rule_id.to_string());
                }
            }

            if categorization.confidence < self.settings.exception_threshold {
                let reason = if result.patterns.is_empty() {
                    UNKNOWN_VENDOR
                } else {
                    AMBIGUOUS_DESCRIPTION
                };
                let mut exception = TransactionException::for_transaction(tx, reason);
                exception.suggested_account = Some(categorization.account_id.clone());
                exception.suggestion = suggestion_from(&result.patterns, chart);
                outcome.exceptions.push(exception);
            }

            outcome.results.push(result);
        }

        for result in &outcome.results {
            self.patterns.record(
                &result.transaction,
                &result.categorization.account_id,
                result.categorization.confidence,
            );
        }

        info!(
            categorized = outcome.results.len(),
            exceptions = outcome.exceptions.len(),
            rules_applied = outcome.rules_applied.len(),
            "statement categorized"
        );
        Ok(outcome)
    }
}
