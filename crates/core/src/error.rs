use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Duplicate account code: {0}")]
    DuplicateAccountCode(String),
    #[error("Unknown account class: '{0}'")]
    UnknownAccountClass(String),
    #[error("Unknown transaction direction: '{0}'")]
    UnknownDirection(String),
    #[error("Unknown contact type: '{0}'")]
    UnknownContactType(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}
