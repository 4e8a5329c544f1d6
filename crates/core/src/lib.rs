pub mod account;
pub mod company;
pub mod error;
pub mod money;
pub mod period;
pub mod rule;
pub mod run;
pub mod transaction;

pub use account::{AccountClass, ChartOfAccount, ChartOfAccounts};
pub use company::{CompanyId, CompanyProfile, Contact, ContactType};
pub use error::CoreError;
pub use money::Money;
pub use period::{parse_date, DateRange};
pub use rule::{
    RuleCondition, RuleConditionValue, RuleError, RuleField, RuleOperator, TransactionRule,
};
pub use run::{
    ExceptionStatus, ExceptionSuggestion, ProcessingRun, RunStatus, TransactionException,
};
pub use transaction::{BankTransaction, Direction, HistoricalTransaction};
