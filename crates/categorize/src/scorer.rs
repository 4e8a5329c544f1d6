use saim_core::{AccountClass, BankTransaction, ChartOfAccount, ChartOfAccounts, Direction, Money};
use serde::{Deserialize, Serialize};

use crate::context::BusinessContext;
use crate::patterns::Pattern;

const KEYWORD_WEIGHT: f32 = 0.4;
const NATURE_WEIGHT: f32 = 0.3;
const DIRECTION_WEIGHT: f32 = 0.2;
const AMOUNT_WEIGHT: f32 = 0.1;

pub const MIN_BASE_CONFIDENCE: f32 = 0.3;
pub const MAX_BASE_CONFIDENCE: f32 = 0.95;
pub const MAX_CONFIDENCE: f32 = 0.99;
pub const LOW_CONFIDENCE: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningFlag {
    LowConfidence,
    HighAmount,
    NoHistoricalPattern,
    UncertainContext,
}

impl WarningFlag {
    pub fn describe(self) -> &'static str {
        match self {
            WarningFlag::LowConfidence => "Low confidence categorization",
            WarningFlag::HighAmount => "High amount transaction",
            WarningFlag::NoHistoricalPattern => "No historical pattern found",
            WarningFlag::UncertainContext => "Uncertain business context",
        }
    }
}

/// The scorer's pick for one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountScore {
    pub account: ChartOfAccount,
    pub raw_score: f32,
    pub confidence: f32,
    pub warning_flags: Vec<WarningFlag>,
}

fn name_has(account: &ChartOfAccount, words: &[&str]) -> bool {
    let name = account.name.to_lowercase();
    words.iter().any(|w| name.contains(w))
}

fn keyword_score(tx: &BankTransaction, account: &ChartOfAccount) -> f32 {
    let desc = tx.description.to_lowercase();
    let name = account.name.to_lowercase();
    let first_word = desc.split_whitespace().next().unwrap_or("");
    let hit = (!name.is_empty() && desc.contains(&name))
        || (!first_word.is_empty() && name.contains(first_word));
    if hit {
        KEYWORD_WEIGHT
    } else {
        0.0
    }
}

fn nature_score(context: &BusinessContext, account: &ChartOfAccount) -> f32 {
    let nature = context.business_nature;
    let vendor = nature.is_vendor() && name_has(account, &["expense", "cost", "purchase"]);
    let customer = nature.is_customer() && name_has(account, &["revenue", "sales", "income"]);
    if vendor || customer {
        NATURE_WEIGHT
    } else {
        0.0
    }
}

fn direction_score(tx: &BankTransaction, account: &ChartOfAccount) -> f32 {
    let fits = match tx.direction {
        Direction::Debit => matches!(account.class, AccountClass::Asset | AccountClass::Expense),
        Direction::Credit => matches!(
            account.class,
            AccountClass::Liability | AccountClass::Revenue | AccountClass::Equity
        ),
    };
    if fits {
        DIRECTION_WEIGHT
    } else {
        0.0
    }
}

fn amount_score(tx: &BankTransaction, account: &ChartOfAccount) -> f32 {
    if tx.amount > Money::from_major(1_000) && name_has(account, &["equipment", "asset"]) {
        AMOUNT_WEIGHT
    } else {
        0.0
    }
}

pub fn score_account(
    tx: &BankTransaction,
    context: &BusinessContext,
    account: &ChartOfAccount,
) -> f32 {

    keyword_score(tx, account)
        + nature_score(context, account)
        + direction_score(tx, account)
        + amount_score(tx, account)
}

/// Warnings raised on any categorization, whatever its source.
pub fn warning_flags(
    tx: &BankTransaction,
    context: &BusinessContext,
    patterns: &[Pattern],
    confidence: f32,
) -> Vec<WarningFlag> {
    let mut flags = Vec::new();
    if confidence < LOW_CONFIDENCE {
        flags.push(WarningFlag::LowConfidence);
    }
    if tx.amount > Money::from_major(10_000) {
        flags.push(WarningFlag::HighAmount);
    }
    if patterns.is_empty() {
        flags.push(WarningFlag::NoHistoricalPattern);
    }
    if context.confidence_score < 0.5 {
        flags.push(WarningFlag::UncertainContext);
    }
    flags
}

/// Picks the best account for `tx`. `patterns` must be sorted best first.
/// Returns `None` only for an empty chart.
pub fn score(
    tx: &BankTransaction,
    context: &BusinessContext,
    patterns: &[Pattern],
    chart: &ChartOfAccounts,
) -> Option<AccountScore> {
    let mut best: Option<(&ChartOfAccount, f32)> = None;
    for account in chart {
        let s = score_account(tx, context, account);
        // strictly greater: earlier accounts win ties
        if best.map_or(true, |(_, top)| s > top) {
            best = Some((account, s));
        }
    }
    let (account, raw_score) = best?;

    let mut confidence = raw_score.clamp(MIN_BASE_CONFIDENCE, MAX_BASE_CONFIDENCE);
    if let Some(top) = patterns.first() {
        confidence = (confidence + (top.confidence * 0.4).min(0.3)).min(MAX_CONFIDENCE);
    }
    confidence = (confidence + context.confidence_score * 0.2).min(MAX_CONFIDENCE);

    Some(AccountScore {
        account: account.clone(),
        raw_score,
        confidence,
        warning_flags: warning_flags(tx, context, patterns, confidence),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::classify;
    use chrono::{NaiveDate, Utc};

    fn tx(desc: &str, cents: i64, direction: Direction) -> BankTransaction {
        BankTransaction::new(
            "t1",
            NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
            desc,
            Money::from_cents(cents),
            direction,
        )
    }

    fn account(code: &str, name: &str, class: AccountClass) -> ChartOfAccount {
        ChartOfAccount::new(code, name, "General", class)
    }

    fn chart(accounts: Vec<ChartOfAccount>) -> ChartOfAccounts {
        ChartOfAccounts::from_accounts(accounts).unwrap()
    }

    fn pattern(confidence: f32) -> Pattern {
        Pattern {
            contact: "x".into(),
            contact_similarity: 1.0,
            amount_min: Money::zero(),
            amount_max: Money::from_major(1),
            direction: Direction::Debit,
            description: "x".into(),
            account_id: "6100".into(),
            confidence,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn keyword_match_on_account_name() {
        let t = tx("Office Supplies from Staples", 4500, Direction::Debit);
        let ctx = classify(&t);
        let c = chart(vec![
            account("1000", "Cash", AccountClass::Asset),
            account("6100", "Office Supplies", AccountClass::Expense),
        ]);
        let pick = score(&t, &ctx, &[], &c).unwrap();
        assert_eq!(pick.account.code, "6100");
        assert!((pick.raw_score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn vendor_payment_prefers_expense_accounts() {
        let t = tx("Invoice payment to ABC", 25000, Direction::Debit);
        let ctx = classify(&t);
        let c = chart(vec![
            account("4000", "Sales Revenue", AccountClass::Revenue),
            account("5000", "Cost of Goods Sold", AccountClass::Expense),
        ]);
        assert_eq!(score(&t, &ctx, &[], &c).unwrap().account.code, "5000");
    }

    #[test]
    fn customer_payment_prefers_revenue_accounts() {
        let t = tx("Invoice payment from client", 25000, Direction::Credit);
        let ctx = classify(&t);
        let c = chart(vec![
            account("5000", "Cost of Goods Sold", AccountClass::Expense),
            account("4000", "Sales Revenue", AccountClass::Revenue),
        ]);
        assert_eq!(score(&t, &ctx, &[], &c).unwrap().account.code, "4000");
    }

    #[test]
    fn large_amounts_lean_to_equipment() {
        let t = tx("Dell order", 250000, Direction::Debit);
        let ctx = classify(&t);
        let c = chart(vec![
            account("6200", "Utilities", AccountClass::Expense),
            account("1500", "Office Equipment", AccountClass::Asset),
        ]);
        assert_eq!(score(&t, &ctx, &[], &c).unwrap().account.code, "1500");
    }

    #[test]
    fn ties_go_to_first_account() {
        let t = tx("Mystery", 1000, Direction::Debit);
        let ctx = classify(&t);
        let c = chart(vec![
            account("6200", "Utilities", AccountClass::Expense),
            account("6300", "Travel", AccountClass::Expense),
        ]);
        assert_eq!(score(&t, &ctx, &[], &c).unwrap().account.code, "6200");
    }

    #[test]
    fn empty_chart_has_no_candidate() {
        let t = tx("Anything", 1000, Direction::Debit);
        assert!(score(&t, &classify(&t), &[], &ChartOfAccounts::new()).is_none());
    }

    #[test]
    fn confidence_stays_in_bounds() {
        let c = chart(vec![
            account("1000", "Cash", AccountClass::Asset),
            account("4000", "Sales Revenue", AccountClass::Revenue),
            account("6100", "Office Supplies", AccountClass::Expense),
        ]);
        let samples = [
            tx("x", 0, Direction::Credit),
            tx("Office Supplies invoice payment for the quarter", 5_000_000, Direction::Debit),
            tx("Sales", 100, Direction::Credit),
        ];
        for t in &samples {
            let ctx = classify(t);
            for patterns in [vec![], vec![pattern(0.99)], vec![pattern(0.1)]] {
                let pick = score(t, &ctx, &patterns, &c).unwrap();
                assert!(
                    (MIN_BASE_CONFIDENCE..=MAX_CONFIDENCE).contains(&pick.confidence),
                    "{} out of range",
                    pick.confidence
                );
            }
        }
    }

    #[test]
    fn pattern_boost_is_capped() {
        let t = tx("Mystery", 1000, Direction::Credit);
        let ctx = classify(&t);
        let c = chart(vec![account("6200", "Utilities", AccountClass::Expense)]);
        let without = score(&t, &ctx, &[], &c).unwrap().confidence;
        let with = score(&t, &ctx, &[pattern(0.95)], &c).unwrap().confidence;
        assert!((with - without - 0.3).abs() < 1e-6);
    }

    #[test]
    fn warnings_for_weak_large_unknown() {
        let t = tx("Wire", 2_000_000, Direction::Credit);
        let ctx = classify(&t);
        let flags = warning_flags(&t, &ctx, &[], 0.4);
        assert_eq!(
            flags,
            vec![
                WarningFlag::LowConfidence,
                WarningFlag::HighAmount,
                WarningFlag::NoHistoricalPattern,
            ]
        );
    }
}
