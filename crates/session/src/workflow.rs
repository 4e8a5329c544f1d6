use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    CompanySetup,
    ChartOfAccounts,
    UploadContacts,
    UploadBankStatement,
    CategorizeTransactions,
    HandleExceptions,
    GenerateReport,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 7] = [
        WorkflowStep::CompanySetup,
        WorkflowStep::ChartOfAccounts,
        WorkflowStep::UploadContacts,
        WorkflowStep::UploadBankStatement,
        WorkflowStep::CategorizeTransactions,
        WorkflowStep::HandleExceptions,
        WorkflowStep::GenerateReport,
    ];

    pub fn title(self) -> &'static str {
        match self {
            WorkflowStep::CompanySetup => "Company Setup",
            WorkflowStep::ChartOfAccounts => "Chart of Accounts",
            WorkflowStep::UploadContacts => "Upload Contacts",
            WorkflowStep::UploadBankStatement => "Upload Bank Statement",
            WorkflowStep::CategorizeTransactions => "Categorize Transactions",
            WorkflowStep::HandleExceptions => "Handle Exceptions",
            WorkflowStep::GenerateReport => "Generate Report",
        }
    }

    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn next(self) -> Option<WorkflowStep> {
        WorkflowStep::ALL.get(self.number()).copied()
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.title())
    }
}

/// Where the user is in the seven-step flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    current: WorkflowStep,
    completed: Vec<WorkflowStep>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            current: WorkflowStep::CompanySetup,
            completed: Vec::new(),
        }
    }
}

impl Workflow {
    pub fn current(&self) -> WorkflowStep {
        self.current
    }

    pub fn is_completed(&self, step: WorkflowStep) -> bool {
        self.completed.contains(&step)
    }

    /// Marks `step` done and moves to the one after it.
    pub fn complete(&mut self, step: WorkflowStep) {
        if !self.completed.contains(&step) {
            self.completed.push(step);
        }
        if let Some(next) = step.next() {
            if next > self.current {
                self.current = next;
            }
        }
    }

    /// Starts another statement run for an already configured company.
    pub fn restart_run(&mut self) {
        self.completed.retain(|s| *s < WorkflowStep::UploadBankStatement);
        self.current = WorkflowStep::UploadBankStatement;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_numbered_in_order() {
        assert_eq!(WorkflowStep::CompanySetup.to_string(), "1. Company Setup");
        assert_eq!(WorkflowStep::GenerateReport.number(), 7);
        assert_eq!(WorkflowStep::GenerateReport.next(), None);
    }

    #[test]
    fn completing_advances_and_restart_keeps_setup() {
        let mut flow = Workflow::default();
        for step in WorkflowStep::ALL {
            flow.complete(step);
        }
        assert_eq!(flow.current(), WorkflowStep::GenerateReport);

        flow.restart_run();
        assert_eq!(flow.current(), WorkflowStep::UploadBankStatement);
        assert!(flow.is_completed(WorkflowStep::ChartOfAccounts));
        assert!(!flow.is_completed(WorkflowStep::HandleExceptions));
    }
}
