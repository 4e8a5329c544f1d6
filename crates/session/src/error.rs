use saim_assistant::ChartError;
use saim_categorize::{CategorizeError, ImportError};
use saim_core::{CoreError, RuleError};
use saim_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Categorize(#[from] CategorizeError),
    #[error("Could not read upload: {0}")]
    Import(#[from] ImportError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("No company profile found.")]
    NoProfile,
    #[error("No chart of accounts has been set up yet.")]
    NoChart,
    #[error("No active processing run found.")]
    NoRun,
    #[error("Unknown account '{0}'")]
    UnknownAccount(String),
    #[error("Unknown exception '{0}'")]
    UnknownException(String),
    #[error("Exception '{0}' has already been handled.")]
    ExceptionAlreadyResolved(String),
    #[error("A rule is already being created. Finish or cancel it first.")]
    RuleInProgress,
    #[error("No rule is being created.")]
    NoRuleInProgress,
    #[error("The uploaded statement has no transactions.")]
    EmptyStatement,
}
