use chrono::{DateTime, Utc};
use saim_core::{RuleField, RuleOperator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Saim,
    User,
}

/// Everything a user can do by picking an option instead of typing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChatAction {
    UseCorrection,
    KeepOriginal,
    GenerateChart,
    UploadContacts,
    SkipContacts,
    UploadStatement,
    Categorize,
    ChooseAccountFor { exception_id: String },
    AssignAccount { exception_id: String, account_id: String },
    CreateRuleFor { exception_id: String },
    IgnoreException { exception_id: String },
    AcceptSuggestion { exception_id: String },
    StartRule,
    RuleField { field: RuleField },
    RuleOperator { operator: RuleOperator },
    RuleAccount { account_id: String },
    ConfirmRule,
    CancelRule,
    GenerateReport,
    SuggestRules,
    AcceptSuggestedRule { index: usize },
    ViewProfile,
    ViewRules,
    ViewHistory,
    NewRun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOption {
    pub label: String,
    pub action: ChatAction,
}

impl ChatOption {
    pub fn new(label: impl Into<String>, action: ChatAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ChatOption>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(sender: Sender, text: impl Into<String>, options: Vec<ChatOption>) -> Self {
        Self {
            id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            sender,
            text: text.into(),
            options,
            timestamp: Utc::now(),
        }
    }

    pub fn saim(text: impl Into<String>) -> Self {
        Self::new(Sender::Saim, text, Vec::new())
    }

    pub fn saim_with(text: impl Into<String>, options: Vec<ChatOption>) -> Self {
        Self::new(Sender::Saim, text, options)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, Vec::new())
    }
}
