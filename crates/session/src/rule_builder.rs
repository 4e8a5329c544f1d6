//! Step-by-step rule creation from the chat.

use saim_core::{
    ChartOfAccount, ChartOfAccounts, CompanyId, RuleCondition, RuleConditionValue, RuleField,
    RuleOperator, TransactionRule,
};

use crate::error::SessionError;
use crate::message::{ChatAction, ChatMessage, ChatOption};

/// How many accounts the account step offers.
pub const ACCOUNT_CHOICES: usize = 6;

const OFFERED_FIELDS: [RuleField; 2] = [RuleField::Description, RuleField::Amount];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStep {
    Name,
    ConditionField,
    ConditionOperator,
    ConditionValue,
    Account,
    Confirm,
}

#[derive(Debug, Clone, Default)]
pub struct RuleDraft {
    pub name: String,
    pub field: Option<RuleField>,
    pub operator: Option<RuleOperator>,
    pub value: Option<RuleConditionValue>,
    pub account: Option<ChartOfAccount>,
    /// Exception the rule is being written for, if any.
    pub exception_id: Option<String>,
}

impl RuleDraft {
    pub fn step(&self) -> RuleStep {
        if self.name.is_empty() {
            RuleStep::Name
        } else if self.field.is_none() {
            RuleStep::ConditionField
        } else if self.operator.is_none() {
            RuleStep::ConditionOperator
        } else if self.value.is_none() {
            RuleStep::ConditionValue
        } else if self.account.is_none() {
            RuleStep::Account
        } else {
            RuleStep::Confirm
        }
    }
}

/// A finished rule plus the exception it resolves.
#[derive(Debug, Clone)]
pub struct BuiltRule {
    pub rule: TransactionRule,
    pub exception_id: Option<String>,
}

/// Holds at most one rule under construction.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    slot: Option<RuleDraft>,
}

fn label(s: &str) -> String {
    let mut out = String::new();
    for (i, word) in s.split('_').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn field_prompt(name: &str) -> ChatMessage {
    ChatMessage::saim_with(
        format!("Rule name: \"{name}\". What field should the condition be based on?"),
        OFFERED_FIELDS
            .iter()
            .map(|f| ChatOption::new(label(&f.to_string()), ChatAction::RuleField { field: *f }))
            .collect(),
    )
}

fn operator_prompt(field: RuleField) -> ChatMessage {
    ChatMessage::saim_with(
        format!("Field: {field}. Choose operator:"),
        field
            .operators()
            .iter()
            .map(|op| {
                ChatOption::new(
                    label(&op.to_string()),
                    ChatAction::RuleOperator { operator: *op },
                )
            })
            .collect(),
    )
}

fn value_prompt(operator: RuleOperator) -> ChatMessage {
    let hint = if operator == RuleOperator::IsBetween {
        " (e.g., 100-500)"
    } else {
        ""
    };
    ChatMessage::saim(format!("Operator: {operator}. Enter the value{hint}:"))
}

fn account_prompt(condition: String, chart: &ChartOfAccounts) -> ChatMessage {
    ChatMessage::saim_with(
        format!("Condition: {condition}. Which account should this rule apply to?"),
        chart
            .first_n(ACCOUNT_CHOICES)
            .iter()
            .map(|a| {
                ChatOption::new(
                    format!("{} - {}", a.code, a.name),
                    ChatAction::RuleAccount {
                        account_id: a.code.clone(),
                    },
                )
            })
            .collect(),
    )
}

fn confirm_prompt(draft: &RuleDraft, account: &ChartOfAccount) -> ChatMessage {
    ChatMessage::saim_with(
        format!("Target account: {}. Confirm rule \"{}\"?", account.name, draft.name),
        vec![
            ChatOption::new("Confirm", ChatAction::ConfirmRule),
            ChatOption::new("Cancel", ChatAction::CancelRule),
        ],
    )
}

fn is_yes(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "y" | "yes" | "confirm" | "ok" | "save")
}

fn is_no(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "n" | "no" | "cancel")
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    pub fn step(&self) -> Option<RuleStep> {
        self.slot.as_ref().map(RuleDraft::step)
    }

    pub fn draft(&self) -> Option<&RuleDraft> {
        self.slot.as_ref()
    }

    /// Opens the slot. `example` is the exception id and description the
    /// rule is being written for.
    pub fn start(&mut self, example: Option<(&str, &str)>) -> Result<ChatMessage, SessionError> {
        if self.slot.is_some() {
            return Err(SessionError::RuleInProgress);
        }
        let (exception_id, text) = match example {
            Some((id, description)) => (
                Some(id.to_string()),
                format!(
                    "Let's create a rule for transactions like \"{description}\". \
                     Give this rule a name:"
                ),
            ),
            None => (None, "Let's create a new rule. Give this rule a name:".to_string()),
        };
        self.slot = Some(RuleDraft {
            exception_id,
            ..RuleDraft::default()
        });
        Ok(ChatMessage::saim(text))
    }

    pub fn cancel(&mut self) -> Option<RuleDraft> {
        self.slot.take()
    }

    fn draft_mut(&mut self) -> Result<&mut RuleDraft, SessionError> {
        self.slot.as_mut().ok_or(SessionError::NoRuleInProgress)
    }

    /// Feeds typed text to whatever step is open. Unusable text re-prompts
    /// and leaves the step unchanged.
    pub fn input(
        &mut self,
        text: &str,
        chart: &ChartOfAccounts,
    ) -> Result<ChatMessage, SessionError> {
        let draft = self.draft_mut()?;
        match draft.step() {
            RuleStep::Name => {
                let name = text.trim();
                if name.is_empty() {
                    return Ok(ChatMessage::saim("The rule needs a name. Give this rule a name:"));
                }
                draft.name = name.to_string();
                Ok(field_prompt(name))
            }
            RuleStep::ConditionField => match text.parse::<RuleField>() {
                Ok(field) => self.choose_field(field),
                Err(err) => Ok(ChatMessage::saim(format!(
                    "{err}. Choose one of: description, amount, payee, merchant_category."
                ))),
            },
            RuleStep::ConditionOperator => match text.parse::<RuleOperator>() {
                Ok(operator) => self.choose_operator(operator),
                Err(err) => Ok(ChatMessage::saim(format!("{err}. Choose operator:"))),
            },
            RuleStep::ConditionValue => {
                let (Some(field), Some(operator)) = (draft.field, draft.operator) else {
                    return Err(SessionError::NoRuleInProgress);
                };
                match RuleConditionValue::parse(field, operator, text) {
                    Ok(value) => {
                        let condition = format!("{field} {operator} {value}");
                        draft.value = Some(value);
                        Ok(account_prompt(condition, chart))
                    }
                    Err(err) => Ok(ChatMessage::saim(format!("{err}. Enter the value:"))),
                }
            }
            RuleStep::Account => {
                let choice = text.trim();
                let offered = chart.first_n(ACCOUNT_CHOICES);
                let picked = choice
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| offered.get(i))
                    .or_else(|| offered.iter().find(|a| a.code == choice))
                    .map(|a| a.code.clone());
                match picked {
                    Some(code) => self.choose_account(&code, chart),
                    None => Ok(ChatMessage::saim(format!(
                        "Please pick one of the {} accounts listed.",
                        offered.len()
                    ))),
                }
            }
            RuleStep::Confirm => {
                if is_no(text) {
                    self.cancel();
                    Ok(ChatMessage::saim("Rule creation cancelled."))
                } else if is_yes(text) {
                    Ok(ChatMessage::saim("Choose Confirm to save the rule."))
                } else {
                    Ok(ChatMessage::saim("Please answer yes to save the rule or no to cancel."))
                }
            }
        }
    }

    pub fn choose_field(&mut self, field: RuleField) -> Result<ChatMessage, SessionError> {
        let draft = self.draft_mut()?;
        if draft.step() != RuleStep::ConditionField {
            return Ok(ChatMessage::saim("That choice does not fit the current step."));
        }
        draft.field = Some(field);
        Ok(operator_prompt(field))
    }

    pub fn choose_operator(&mut self, operator: RuleOperator) -> Result<ChatMessage, SessionError> {
        let draft = self.draft_mut()?;
        let Some(field) = draft.field.filter(|_| draft.step() == RuleStep::ConditionOperator) else {
            return Ok(ChatMessage::saim("That choice does not fit the current step."));
        };
        if !field.operators().contains(&operator) {
            return Ok(operator_prompt(field));
        }
        draft.operator = Some(operator);
        Ok(value_prompt(operator))
    }

    pub fn choose_account(
        &mut self,
        account_id: &str,
        chart: &ChartOfAccounts,
    ) -> Result<ChatMessage, SessionError> {
        let draft = self.draft_mut()?;
        if draft.step() != RuleStep::Account {
            return Ok(ChatMessage::saim("That choice does not fit the current step."));
        }
        let account = chart
            .first_n(ACCOUNT_CHOICES)
            .iter()
            .find(|a| a.code == account_id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownAccount(account_id.to_string()))?;
        let prompt = confirm_prompt(draft, &account);
        draft.account = Some(account);
        Ok(prompt)
    }

    /// Builds the rule and empties the slot. A draft that is not at the
    /// confirm step stays in place.
    pub fn confirm(&mut self, company_id: CompanyId) -> Result<BuiltRule, SessionError> {
        let draft = self.slot.take().ok_or(SessionError::NoRuleInProgress)?;
        let (Some(field), Some(operator), Some(value), Some(account)) =
            (draft.field, draft.operator, draft.value.clone(), draft.account.clone())
        else {
            self.slot = Some(draft);
            return Err(SessionError::NoRuleInProgress);
        };
        let condition = RuleCondition::new(field, operator, value)?;
        let rule = TransactionRule::new(
            company_id,
            &draft.name,
            vec![condition],
            &account.code,
            &account.name,
        )?;

        Ok(BuiltRule {
            rule,
            exception_id: draft.exception_id,
        })
    }
}
