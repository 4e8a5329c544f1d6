use saim_core::{
    CompanyId, HistoricalTransaction, RuleCondition, RuleConditionValue, RuleError, RuleField,
    RuleOperator, TransactionRule,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_SUPPORT: usize = 3;
pub const MIN_AGREEMENT: f32 = 0.8;

/// A rule the user has not written yet but whose history argues for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRule {
    pub name: String,
    pub field: RuleField,
    pub pattern: String,
    pub target_account_id: String,
    pub target_account_name: String,
    /// Share of the group that went to the target account.
    pub confidence: f32,
    pub based_on: Vec<String>,
    pub potential_matches: usize,
}

impl SuggestedRule {
    pub fn condition(&self) -> Result<RuleCondition, RuleError> {
        let operator = match self.field {
            RuleField::Payee => RuleOperator::Equals,
            _ => RuleOperator::Contains,
        };
        RuleCondition::text(self.field, operator, &self.pattern)
    }

    pub fn into_rule(self, company_id: CompanyId) -> Result<TransactionRule, RuleError> {
        let condition = self.condition()?;
        let mut rule = TransactionRule::new(
            company_id,
            &self.name,
            vec![condition],
            &self.target_account_id,
            &self.target_account_name,
        )?;
        rule.suggested = true;
        rule.confidence = (self.confidence * 100.0).round().clamp(0.0, 100.0) as u8;
        rule.accuracy = self.confidence;
        Ok(rule)
    }
}

fn group_key(h: &HistoricalTransaction) -> Option<(RuleField, String)> {
    if let Some(payee) = h
        .transaction
        .contact
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        return Some((RuleField::Payee, payee.to_string()));
    }
    h.transaction
        .description
        .split_whitespace()
        .next()
        .map(|w| (RuleField::Description, w.to_lowercase()))
}

fn already_covered(rules: &[TransactionRule], key: &str) -> bool {
    let key = key.to_lowercase();
    rules.iter().any(|rule| {
        rule.conditions.iter().any(|c| {
            matches!(c.field, RuleField::Description | RuleField::Payee)
                && matches!(
                    &c.value,
                    RuleConditionValue::Text(v) if v.to_lowercase().contains(&key)
                )
        })
    })
}

/// Groups history by payee (or first description word) and proposes a rule
/// for every group of at least three transactions where four in five went
/// to the same account.
pub fn suggest_rules(
    history: &[HistoricalTransaction],
    existing: &[TransactionRule],
) -> Vec<SuggestedRule> {
    let mut groups: BTreeMap<(RuleField, String), Vec<&HistoricalTransaction>> = BTreeMap::new();
    for h in history {
        if let Some(key) = group_key(h) {
            groups.entry(key).or_default().push(h);
        }
    }

    let mut suggestions = Vec::new();
    for ((field, pattern), members) in groups {
        if members.len() < MIN_SUPPORT || already_covered(existing, &pattern) {
            continue;
        }

        // first-seen order breaks ties between equally common accounts
        let mut counts: Vec<(&str, &str, usize)> = Vec::new();
        for h in &members {
            match counts.iter_mut().find(|(id, _, _)| *id == h.account_id) {
                Some(entry) => entry.2 += 1,
                None => counts.push((h.account_id.as_str(), h.account_name.as_str(), 1)),
            }
        }
        let Some(&(account_id, account_name, hits)) = counts
            .iter()
            .reduce(|best, c| if c.2 > best.2 { c } else { best })
        else {
            continue;
        };

        let share = hits as f32 / members.len() as f32;
        if share < MIN_AGREEMENT {
            continue;
        }

        suggestions.push(SuggestedRule {
            name: format!("Auto-categorize {pattern} transactions"),
            field,
            pattern,
            target_account_id: account_id.to_string(),
            target_account_name: account_name.to_string(),
            confidence: share,
            based_on: members.iter().map(|h| h.transaction.id.clone()).collect(),
            potential_matches: members.len(),
        });
    }
    suggestions
}
