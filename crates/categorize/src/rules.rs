use chrono::{DateTime, Utc};
use saim_core::{
    BankTransaction, RuleCondition, RuleConditionValue, RuleField, RuleOperator, TransactionRule,
};

fn text_matches(operator: RuleOperator, haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    match operator {
        RuleOperator::Contains => haystack.contains(&needle),
        RuleOperator::Equals => haystack.trim() == needle.trim(),
        RuleOperator::StartsWith => haystack.starts_with(&needle),
        RuleOperator::EndsWith => haystack.ends_with(&needle),
        _ => false,
    }
}

pub fn condition_matches(condition: &RuleCondition, tx: &BankTransaction) -> bool {
    match (&condition.value, condition.field) {
        (RuleConditionValue::Text(needle), field) => {
            let haystack = match field {
                RuleField::Description => Some(tx.description.as_str()),
                RuleField::Payee => tx.contact.as_deref(),
                RuleField::MerchantCategory => tx.merchant_category.as_deref(),
                RuleField::Amount => None,
            };
            haystack.is_some_and(|h| text_matches(condition.operator, h, needle))
        }
        (RuleConditionValue::Number(n), RuleField::Amount) => {
            let amount = tx.amount.as_decimal();
            match condition.operator {
                RuleOperator::Equals => amount == *n,
                RuleOperator::GreaterThan => amount > *n,
                RuleOperator::LessThan => amount < *n,
                _ => false,
            }
        }
        (RuleConditionValue::Range { min, max }, RuleField::Amount) => {
            let amount = tx.amount.as_decimal();
            condition.operator == RuleOperator::IsBetween && amount >= *min && amount <= *max
        }
        _ => false,
    }
}

pub fn rule_matches(rule: &TransactionRule, tx: &BankTransaction) -> bool {
    rule.is_enabled
        && !rule.conditions.is_empty()
        && rule.conditions.iter().all(|c| condition_matches(c, tx))
}

/// A company's user-authored rules, evaluated in stored order.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<TransactionRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<TransactionRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[TransactionRule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<TransactionRule> {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn add(&mut self, rule: TransactionRule) {
        self.rules.push(rule);
    }

    pub fn remove(&mut self, rule_id: &str) -> Option<TransactionRule> {
        let idx = self.rules.iter().position(|r| r.id == rule_id)?;
        Some(self.rules.remove(idx))
    }

    /// Returns `false` when no rule has that id.
    pub fn set_enabled(&mut self, rule_id: &str, enabled: bool) -> bool {
        match self.rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.is_enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn find_matching_rule(&self, tx: &BankTransaction) -> Option<&TransactionRule> {
        self.rules.iter().find(|r| rule_matches(r, tx))
    }

    /// Like [`find_matching_rule`](Self::find_matching_rule), but counts the
    /// hit against the rule and returns a snapshot of it.
    pub fn apply(&mut self, tx: &BankTransaction, at: DateTime<Utc>) -> Option<TransactionRule> {
        let rule = self.rules.iter_mut().find(|r| rule_matches(r, tx))?;
        rule.record_application(at);
        Some(rule.clone())
    }

    /// Indices of `transactions` with the rule each one matched.
    pub fn apply_rules<'a>(
        &'a self,
        transactions: &[BankTransaction],
    ) -> Vec<(usize, &'a TransactionRule)> {
        transactions
            .iter()
            .enumerate()
            .filter_map(|(idx, tx)| self.find_matching_rule(tx).map(|r| (idx, r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use saim_core::{CompanyId, Direction, Money};

    fn make_tx(desc: &str, amount_cents: i64) -> BankTransaction {
        BankTransaction::new(
            "t1",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            desc,
            Money::from_cents(amount_cents),
            Direction::Debit,
        )
    }

    fn make_rule(conditions: Vec<RuleCondition>, account: &str) -> TransactionRule {
        TransactionRule::new(CompanyId("c1".into()), "test", conditions, account, "Account")
            .unwrap()
    }

    fn engine_with(condition: RuleCondition, account: &str) -> RuleEngine {
        RuleEngine::new(vec![make_rule(vec![condition], account)])
    }

    fn desc(op: RuleOperator, value: &str) -> RuleCondition {
        RuleCondition::text(RuleField::Description, op, value).unwrap()
    }

    fn amount(op: RuleOperator, input: &str) -> RuleCondition {
        let value = RuleConditionValue::parse(RuleField::Amount, op, input).unwrap();
        RuleCondition::new(RuleField::Amount, op, value).unwrap()
    }

    #[test]
    fn contains_match_case_insensitive() {
        let engine = engine_with(desc(RuleOperator::Contains, "AWS"), "6400");
        let rule = engine.find_matching_rule(&make_tx("aws cloud services", 9900)).unwrap();
        assert_eq!(rule.apply_to_account_id, "6400");
        assert!(engine.find_matching_rule(&make_tx("STARBUCKS", 500)).is_none());
    }

    #[test]
    fn equals_starts_ends() {
        let engine = RuleEngine::new(vec![
            make_rule(vec![desc(RuleOperator::Equals, "starbucks")], "a"),
            make_rule(vec![desc(RuleOperator::StartsWith, "amzn")], "b"),
            make_rule(vec![desc(RuleOperator::EndsWith, "payroll")], "c"),
        ]);
        let pick = |d: &str| {
            engine
                .find_matching_rule(&make_tx(d, 100))
                .map(|r| r.apply_to_account_id.clone())
        };
        assert_eq!(pick("STARBUCKS").as_deref(), Some("a"));
        assert_eq!(pick("STARBUCKS RESERVE"), None);
        assert_eq!(pick("AMZN*PRIME").as_deref(), Some("b"));
        assert_eq!(pick("March PAYROLL").as_deref(), Some("c"));
    }

    #[test]
    fn all_conditions_must_hold() {
        let engine = RuleEngine::new(vec![make_rule(
            vec![desc(RuleOperator::Contains, "amazon"), amount(RuleOperator::GreaterThan, "100")],
            "1500",
        )]);
        assert!(engine.find_matching_rule(&make_tx("AMAZON", 9_999)).is_none());
        assert!(engine.find_matching_rule(&make_tx("AMAZON", 10_001)).is_some());
    }

    #[test]
    fn between_is_inclusive() {
        let engine = engine_with(amount(RuleOperator::IsBetween, "100..150"), "x");
        assert!(engine.find_matching_rule(&make_tx("a", 10_000)).is_some());
        assert!(engine.find_matching_rule(&make_tx("a", 15_000)).is_some());
        assert!(engine.find_matching_rule(&make_tx("a", 15_001)).is_none());
    }

    #[test]
    fn amount_equals_and_less_than() {
        let eq = make_rule(vec![amount(RuleOperator::Equals, "49.99")], "x");
        let lt = make_rule(vec![amount(RuleOperator::LessThan, "10")], "y");
        assert!(rule_matches(&eq, &make_tx("a", 4999)));
        assert!(!rule_matches(&eq, &make_tx("a", 5000)));
        assert!(rule_matches(&lt, &make_tx("a", 999)));
        assert!(!rule_matches(&lt, &make_tx("a", 1000)));
    }

    #[test]
    fn payee_reads_contact() {
        let rule = make_rule(
            vec![RuleCondition::text(RuleField::Payee, RuleOperator::Equals, "Jane Smith")
                .unwrap()],
            "5100",
        );
        assert!(rule_matches(&rule, &make_tx("Transfer", 100).with_contact("jane smith")));
        assert!(!rule_matches(&rule, &make_tx("Transfer to Jane Smith", 100)));
    }

    #[test]
    fn first_enabled_rule_wins() {
        let mut first = make_rule(vec![desc(RuleOperator::Contains, "amazon")], "5100");
        first.is_enabled = false;
        let second = make_rule(vec![desc(RuleOperator::Contains, "amazon")], "5110");
        let third = make_rule(vec![desc(RuleOperator::Contains, "amazon")], "5120");
        let engine = RuleEngine::new(vec![first, second, third]);
        let rule = engine.find_matching_rule(&make_tx("AMAZON MARKETPLACE", 999)).unwrap();
        assert_eq!(rule.apply_to_account_id, "5110");
    }

    #[test]
    fn apply_counts_hits() {
        let mut engine = engine_with(desc(RuleOperator::Contains, "github"), "5110");
        let now = Utc::now();
        engine.apply(&make_tx("GITHUB", 1000), now).unwrap();
        let snapshot = engine.apply(&make_tx("GITHUB ACTIONS", 200), now).unwrap();
        assert_eq!(snapshot.times_applied, 2);
        assert_eq!(engine.rules()[0].last_applied_at, Some(now));
        assert!(engine.apply(&make_tx("STARBUCKS", 1), now).is_none());
    }

    #[test]
    fn apply_rules_returns_matched_indices() {
        let engine = engine_with(desc(RuleOperator::Contains, "github"), "5110");

        let txs = vec![
            make_tx("GITHUB SUBSCRIPTION", 1000),
            make_tx("STARBUCKS", 500),
            make_tx("GITHUB ACTIONS", 200),
        ];
        let results = engine.apply_rules(&txs);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 2);
    }

    #[test]
    fn toggling_and_removing() {
        let rule = make_rule(vec![desc(RuleOperator::Contains, "rent")], "6000");
        let id = rule.id.clone();
        let mut engine = RuleEngine::new(vec![rule]);
        assert!(engine.set_enabled(&id, false));
        assert!(engine.find_matching_rule(&make_tx("Office rent", 100)).is_none());
        assert!(!engine.set_enabled("missing", true));
        assert_eq!(engine.remove(&id).map(|r| r.apply_to_account_id), Some("6000".into()));
        assert!(engine.is_empty());
    }
}
