//! One-at-a-time review of the transactions a run could not settle.

use saim_core::{ExceptionStatus, TransactionException};

use crate::error::SessionError;
use crate::message::{ChatAction, ChatMessage, ChatOption};

pub const ALL_HANDLED: &str = "All exceptions handled.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub rule_created: usize,
    pub ignored: usize,
}

/// Exceptions in the order the run raised them. The cursor always rests on
/// the first unresolved one.
#[derive(Debug, Clone, Default)]
pub struct ExceptionQueue {
    items: Vec<TransactionException>,
    cursor: usize,
}

impl ExceptionQueue {
    pub fn new(items: Vec<TransactionException>) -> Self {
        let mut queue = Self { items, cursor: 0 };
        queue.settle();
        queue
    }

    fn settle(&mut self) {
        self.cursor = self
            .items
            .iter()
            .position(|e| !e.is_resolved())
            .unwrap_or(self.items.len());
    }

    pub fn items(&self) -> &[TransactionException] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current(&self) -> Option<&TransactionException> {
        self.items.get(self.cursor)
    }

    pub fn all_handled(&self) -> bool {
        self.current().is_none()
    }

    pub fn get(&self, exception_id: &str) -> Option<&TransactionException> {
        self.items.iter().find(|e| e.id == exception_id)
    }

    /// The exception with this id, provided it is still pending.
    pub fn pending(&self, exception_id: &str) -> Result<&TransactionException, SessionError> {
        let exception = self
            .get(exception_id)
            .ok_or_else(|| SessionError::UnknownException(exception_id.to_string()))?;
        if exception.is_resolved() {
            return Err(SessionError::ExceptionAlreadyResolved(exception_id.to_string()));
        }
        Ok(exception)
    }

    /// Sets the status of a pending exception and moves the cursor on.
    /// Handled exceptions are never reopened or changed.
    pub fn resolve(
        &mut self,
        exception_id: &str,
        status: ExceptionStatus,
    ) -> Result<&TransactionException, SessionError> {
        self.pending(exception_id)?;
        let index = self
            .items
            .iter()
            .position(|e| e.id == exception_id)
            .ok_or_else(|| SessionError::UnknownException(exception_id.to_string()))?;
        self.items[index].status = status;
        self.settle();
        Ok(&self.items[index])
    }

    pub fn assign(
        &mut self,
        exception_id: &str,
        account_id: &str,
    ) -> Result<&TransactionException, SessionError> {
        self.resolve(
            exception_id,
            ExceptionStatus::Assigned {
                account_id: account_id.to_string(),
            },
        )
    }

    pub fn ignore(&mut self, exception_id: &str) -> Result<&TransactionException, SessionError> {
        self.resolve(exception_id, ExceptionStatus::Ignored)
    }

    pub fn mark_rule_created(
        &mut self,
        exception_id: &str,
        rule_id: &str,
        account_id: &str,
    ) -> Result<&TransactionException, SessionError> {
        self.resolve(
            exception_id,
            ExceptionStatus::RuleCreated {
                rule_id: rule_id.to_string(),
                account_id: account_id.to_string(),
            },
        )
    }

    /// Assigns the pattern-backed suggestion. Exceptions without one are
    /// left untouched.
    pub fn accept_suggestion(
        &mut self,
        exception_id: &str,
    ) -> Result<Option<&TransactionException>, SessionError> {
        let account_id = self
            .pending(exception_id)?
            .suggestion
            .as_ref()
            .map(|s| s.account_id.clone());
        match account_id {
            Some(account_id) => self.assign(exception_id, &account_id).map(Some),
            None => Ok(None),
        }
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for e in &self.items {
            match e.status {
                ExceptionStatus::Pending => counts.pending += 1,
                ExceptionStatus::Assigned { .. } => counts.assigned += 1,
                ExceptionStatus::RuleCreated { .. } => counts.rule_created += 1,
                ExceptionStatus::Ignored => counts.ignored += 1,
            }
        }
        counts
    }

    /// The chat message for the exception under the cursor.
    pub fn present(&self) -> ChatMessage {
        let Some(exception) = self.current() else {
            return ChatMessage::saim(ALL_HANDLED);
        };
        let suggestion_text = exception
            .suggestion
            .as_ref()
            .map(|s| {
                format!(
                    " Suggested: {} ({} similar transactions).",
                    s.account_name, s.frequency
                )
            })
            .unwrap_or_default();
        let id = exception.id.clone();
        let mut options = vec![
            ChatOption::new(
                "Assign Account",
                ChatAction::ChooseAccountFor {
                    exception_id: id.clone(),
                },
            ),
            ChatOption::new(
                "Create Rule",
                ChatAction::CreateRuleFor {
                    exception_id: id.clone(),
                },
            ),
            ChatOption::new(
                "Ignore This Time",
                ChatAction::IgnoreException {
                    exception_id: id.clone(),
                },
            ),
        ];
        if let Some(s) = &exception.suggestion {
            options.push(ChatOption::new(
                format!("Use Suggestion: {}", s.account_name),
                ChatAction::AcceptSuggestion { exception_id: id },
            ));
        }
        ChatMessage::saim_with(
            format!(
                "Exception {} of {}: \"{}\" ({}). {}.{suggestion_text} How to handle?",
                self.cursor + 1,
                self.items.len(),
                exception.description,
                exception.amount,
                exception.reason,
            ),
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use saim_core::{BankTransaction, Direction, ExceptionSuggestion, Money};

    fn exception(id: &str) -> TransactionException {
        let tx = BankTransaction::new(
            id,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            &format!("Mystery {id}"),
            Money::from_major(75),
            Direction::Debit,
        );
        TransactionException::for_transaction(&tx, "Unknown Vendor")
    }

    #[test]
    fn resolving_first_presents_second() {
        let mut queue = ExceptionQueue::new(vec![exception("tx_1"), exception("tx_2")]);
        assert_eq!(queue.current().unwrap().id, "ex_tx_1");
        assert!(queue.present().text.contains("Mystery tx_1"));

        queue.assign("ex_tx_1", "6100").unwrap();
        assert_eq!(queue.current().unwrap().id, "ex_tx_2");
        assert!(queue.present().text.contains("Mystery tx_2"));

        queue.ignore("ex_tx_2").unwrap();
        assert!(queue.all_handled());
        assert_eq!(queue.present().text, ALL_HANDLED);
    }

    #[test]
    fn cursor_returns_to_earliest_unresolved() {
        let mut queue =
            ExceptionQueue::new(vec![exception("tx_1"), exception("tx_2"), exception("tx_3")]);

        queue.ignore("ex_tx_2").unwrap();
        assert_eq!(queue.current().unwrap().id, "ex_tx_1");
        queue.mark_rule_created("ex_tx_1", "rule_1", "6100").unwrap();
        assert_eq!(queue.current().unwrap().id, "ex_tx_3");

        let counts = queue.counts();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                assigned: 0,
                rule_created: 1,
                ignored: 1
            }
        );
    }

    #[test]
    fn suggestion_only_offered_when_present() {
        let mut with = exception("tx_1");
        with.suggestion = Some(ExceptionSuggestion {
            account_id: "6400".into(),
            account_name: "Software Subscriptions".into(),
            frequency: 3,
        });
        let mut queue = ExceptionQueue::new(vec![exception("tx_0"), with]);

        assert_eq!(queue.present().options.len(), 3);
        assert!(queue.accept_suggestion("ex_tx_0").unwrap().is_none());
        assert_eq!(queue.current().unwrap().id, "ex_tx_0");

        queue.ignore("ex_tx_0").unwrap();
        let message = queue.present();
        assert_eq!(message.options.len(), 4);
        assert!(message.text.contains("3 similar transactions"));

        let resolved = queue.accept_suggestion("ex_tx_1").unwrap().unwrap();
        assert_eq!(
            resolved.status,
            ExceptionStatus::Assigned {
                account_id: "6400".into()
            }
        );
        assert!(matches!(queue.ignore("ex_nope"), Err(SessionError::UnknownException(_))));
    }

    #[test]
    fn handled_exceptions_stay_handled() {
        let mut queue = ExceptionQueue::new(vec![exception("tx_1"), exception("tx_2")]);
        queue.assign("ex_tx_1", "6100").unwrap();

        assert!(matches!(
            queue.ignore("ex_tx_1"),
            Err(SessionError::ExceptionAlreadyResolved(id)) if id == "ex_tx_1"
        ));
        assert!(matches!(
            queue.mark_rule_created("ex_tx_1", "rule_1", "6200"),
            Err(SessionError::ExceptionAlreadyResolved(_))
        ));
        assert!(matches!(
            queue.accept_suggestion("ex_tx_1"),
            Err(SessionError::ExceptionAlreadyResolved(_))
        ));
        assert_eq!(
            queue.get("ex_tx_1").unwrap().status,
            ExceptionStatus::Assigned {
                account_id: "6100".into()
            }
        );
        assert_eq!(queue.current().unwrap().id, "ex_tx_2");
        assert!(queue.pending("ex_tx_2").is_ok());
    }
}
