//! The conversational workflow: company setup, uploads, categorization
//! runs, exception review and rule creation, driven one chat turn at a time.

pub mod error;
pub mod exceptions;
pub mod interview;
pub mod message;
pub mod report;
pub mod rule_builder;
pub mod session;
pub mod workflow;

pub use error::SessionError;
pub use exceptions::{ExceptionQueue, StatusCounts, ALL_HANDLED};
pub use interview::{InterviewReply, ProfileInterview};
pub use message::{ChatAction, ChatMessage, ChatOption, Sender};
pub use report::{AccountLine, ExceptionSummary, RunReport};
pub use rule_builder::{BuiltRule, RuleBuilder, RuleDraft, RuleStep, ACCOUNT_CHOICES};
pub use session::{map_parties, Session, SessionSettings};
pub use workflow::{Workflow, WorkflowStep};
