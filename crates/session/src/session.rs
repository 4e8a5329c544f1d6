use saim_assistant::{ChartGenerator, FieldValidator, DEFAULT_TIMEOUT_MS};
use saim_categorize::{
    import_contacts, import_statement, suggest_rules, Categorizer, CategorizerSettings,
    PatternStore, RuleEngine, StatementProfile, SuggestedRule,
};
use saim_core::{
    BankTransaction, CompanyId, CompanyProfile, Contact, DateRange, HistoricalTransaction,
    ProcessingRun, RunStatus, TransactionRule,
};
use saim_storage::{CompanyRepository, KeyValueStore};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::exceptions::{ExceptionQueue, ALL_HANDLED};
use crate::interview::{InterviewReply, ProfileInterview};
use crate::message::{ChatAction, ChatMessage, ChatOption};
use crate::report::RunReport;
use crate::rule_builder::RuleBuilder;
use crate::workflow::{Workflow, WorkflowStep};

/// Confidence recorded for a categorization the user chose themselves.
const USER_CONFIRMED: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub user_id: String,
    pub validation_timeout: Duration,
    pub categorizer: CategorizerSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            validation_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            categorizer: CategorizerSettings::default(),
        }
    }
}

/// A statement uploaded but not yet categorized.
#[derive(Debug, Clone)]
struct PendingStatement {
    transactions: Vec<BankTransaction>,
}

/// One user's conversation with S(ai)m Jr about one company.
///
/// Every entry point returns the assistant's replies. Failures never escape:
/// they are logged and turned into an `Error: ...` message.
pub struct Session<S> {
    repo: CompanyRepository<S>,
    validator: Box<dyn FieldValidator>,
    charts: Box<dyn ChartGenerator>,
    settings: SessionSettings,
    profile: Option<CompanyProfile>,
    interview: Option<ProfileInterview>,
    workflow: Workflow,
    rules: RuleEngine,
    patterns: PatternStore,
    builder: RuleBuilder,
    exceptions: ExceptionQueue,
    run: Option<ProcessingRun>,
    statement: Option<PendingStatement>,
    run_history: Vec<HistoricalTransaction>,
    suggestions: Vec<SuggestedRule>,
    assigning: Option<String>,
    transcript: Vec<ChatMessage>,
}

/// Fills in missing transaction contacts from known contact names found in
/// the description. Returns how many were mapped.
pub fn map_parties(contacts: &[Contact], transactions: &mut [BankTransaction]) -> usize {
    let mut mapped = 0;
    for tx in transactions.iter_mut().filter(|t| t.contact.is_none()) {
        let description = tx.description.to_lowercase();
        if let Some(contact) = contacts.iter().find(|c| {
            let name = c.name.trim();
            !name.is_empty() && description.contains(&name.to_lowercase())
        }) {
            tx.contact = Some(contact.name.clone());
            mapped += 1;
        }
    }
    mapped
}

fn parse_yes_no(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "y" | "yes" | "use" | "use it" => Some(true),
        "n" | "no" | "keep" => Some(false),
        _ => None,
    }
}

impl<S: KeyValueStore> Session<S> {
    pub fn new(
        repo: CompanyRepository<S>,
        validator: Box<dyn FieldValidator>,
        charts: Box<dyn ChartGenerator>,
        settings: SessionSettings,
    ) -> Self {
        let patterns = PatternStore::new(settings.categorizer.pattern_window);
        Self {
            repo,
            validator,
            charts,
            settings,
            profile: None,
            interview: None,
            workflow: Workflow::default(),
            rules: RuleEngine::default(),
            patterns,
            builder: RuleBuilder::new(),
            exceptions: ExceptionQueue::default(),
            run: None,
            statement: None,
            run_history: Vec::new(),
            suggestions: Vec::new(),
            assigning: None,
            transcript: Vec::new(),
        }
    }

    pub fn profile(&self) -> Option<&CompanyProfile> {
        self.profile.as_ref()
    }

    pub fn rules(&self) -> &[TransactionRule] {
        self.rules.rules()
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    pub fn exceptions(&self) -> &ExceptionQueue {
        &self.exceptions
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn rule_builder(&self) -> &RuleBuilder {
        &self.builder
    }

    pub fn current_run(&self) -> Option<&ProcessingRun> {
        self.run.as_ref()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn repository(&self) -> &CompanyRepository<S> {
        &self.repo
    }

    // ── Entry points ──────────────────────────────────────────────────────────

    /// Resumes `company` when it exists, otherwise starts the setup interview.
    pub async fn open(&mut self, company: Option<&CompanyId>) -> Vec<ChatMessage> {
        let result = self.load(company).await;
        self.respond(result).await
    }

    pub async fn send_text(&mut self, text: &str) -> Vec<ChatMessage> {
        self.transcript.push(ChatMessage::user(text));
        let result = self.handle_text(text).await;
        self.respond(result).await
    }

    pub async fn send_action(&mut self, action: ChatAction) -> Vec<ChatMessage> {
        let result = self.handle_action(action).await;
        self.respond(result).await
    }

    pub async fn upload_contacts<R: Read>(&mut self, file_name: &str, data: R) -> Vec<ChatMessage> {
        self.transcript
            .push(ChatMessage::user(format!("Uploaded {file_name} for contacts")));
        let result = self.import_contacts(file_name, data).await;
        self.respond(result).await
    }

    /// Reads a statement and opens a processing run for it. Without an
    /// explicit `period` the run spans the statement's first to last date.
    pub async fn upload_statement<R: Read>(
        &mut self,
        file_name: &str,
        data: R,
        format: &StatementProfile,
        period: Option<DateRange>,
    ) -> Vec<ChatMessage> {
        self.transcript
            .push(ChatMessage::user(format!("Uploaded {file_name} for bank statement")));
        let result = self.import_statement(file_name, data, format, period).await;
        self.respond(result).await
    }

    pub async fn report(&self) -> Result<RunReport, SessionError> {
        let profile = self.profile.as_ref().ok_or(SessionError::NoProfile)?;
        let run = self.run.as_ref().ok_or(SessionError::NoRun)?;
        let history = if run.status == RunStatus::Completed {
            self.repo.history(&profile.id).await?
        } else {
            self.run_history.clone()
        };
        Ok(RunReport::build(run, &history, &self.exceptions))
    }

    async fn respond(
        &mut self,
        result: Result<Vec<ChatMessage>, SessionError>,
    ) -> Vec<ChatMessage> {
        let replies = match result {
            Ok(replies) => replies,
            Err(err) => {
                error!(error = %err, "session request failed");
                vec![ChatMessage::saim(format!("Error: {err}"))]
            }
        };
        self.transcript.extend(replies.iter().cloned());
        if let Some(profile) = &self.profile {
            if let Err(err) = self.repo.save_chat(&profile.id, &self.transcript).await {
                warn!(error = %err, "could not persist chat transcript");
            }
        }
        replies
    }

    // ── Loading ───────────────────────────────────────────────────────────────

    async fn load(
        &mut self,
        company: Option<&CompanyId>,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let mut replies = Vec::new();
        if let Some(id) = company {
            match self.repo.load_profile(id).await? {
                Some(profile) => return self.resume(profile).await,
                None => replies.push(ChatMessage::saim(format!(
                    "No company profile found for {id}. Let's set one up."
                ))),
            }
        }
        replies.push(self.start_interview());
        Ok(replies)
    }

    fn start_interview(&mut self) -> ChatMessage {
        let interview = ProfileInterview::new(&self.settings.user_id);
        let question = interview.current_question().unwrap_or_default();
        self.interview = Some(interview);
        self.workflow = Workflow::default();
        ChatMessage::saim(question)
    }

    async fn resume(&mut self, profile: CompanyProfile) -> Result<Vec<ChatMessage>, SessionError> {
        self.rules = RuleEngine::new(self.repo.rules(&profile.id).await?);
        self.patterns = self
            .repo
            .load_patterns(&profile.id)
            .await?
            .unwrap_or_default();
        self.patterns.set_window(self.settings.categorizer.pattern_window);
        self.transcript = self.repo.load_chat(&profile.id).await?.unwrap_or_default();
        let runs = self.repo.runs(&profile.id).await?;
        let history = self.repo.history(&profile.id).await?;

        self.workflow = Workflow::default();
        self.workflow.complete(WorkflowStep::CompanySetup);
        if !profile.chart_of_accounts.is_empty() {
            self.workflow.complete(WorkflowStep::ChartOfAccounts);
            self.workflow.complete(WorkflowStep::UploadContacts);
        }
        info!(
            company = %profile.id,
            rules = self.rules.len(),
            runs = runs.len(),
            "company resumed"
        );

        let text = format!(
            "Welcome back to {}! I have {} processing runs and {} historical transactions to help with predictions. Ready for a new run?",
            profile.business_name,
            runs.len(),
            history.len()
        );
        let chart_ready = !profile.chart_of_accounts.is_empty();
        self.profile = Some(profile);

        let mut options = Vec::new();
        if chart_ready {
            options.push(ChatOption::new("Upload Bank Statement", ChatAction::UploadStatement));
        } else {
            options.push(ChatOption::new("Generate Chart of Accounts", ChatAction::GenerateChart));
        }
        options.extend([
            ChatOption::new("View Company Profile", ChatAction::ViewProfile),
            ChatOption::new("View Processing History", ChatAction::ViewHistory),
            ChatOption::new("View Rules", ChatAction::ViewRules),
        ]);
        Ok(vec![ChatMessage::saim_with(text, options)])
    }

    fn profile_or_err(&self) -> Result<&CompanyProfile, SessionError> {
        self.profile.as_ref().ok_or(SessionError::NoProfile)
    }

    fn company_id(&self) -> Result<CompanyId, SessionError> {
        Ok(self.profile_or_err()?.id.clone())
    }

    // ── Typed input ───────────────────────────────────────────────────────────

    async fn handle_text(&mut self, text: &str) -> Result<Vec<ChatMessage>, SessionError> {
        if let Some(interview) = self.interview.as_mut() {
            let reply = if interview.awaiting_correction() {
                parse_yes_no(text)
                    .and_then(|use_corrected| interview.resolve_correction(use_corrected))
                    .unwrap_or_else(|| {
                        InterviewReply::Clarify(
                            "Please answer yes to use the suggestion or no to keep your answer."
                                .to_string(),
                        )
                    })
            } else {
                interview
                    .answer(self.validator.as_ref(), self.settings.validation_timeout, text)
                    .await
            };
            return self.interview_reply(reply).await;
        }

        if self.profile.is_none() {
            return Ok(vec![self.start_interview()]);
        }

        if self.builder.is_active() {
            let chart = &self.profile.as_ref().ok_or(SessionError::NoProfile)?.chart_of_accounts;
            let reply = self.builder.input(text, chart)?;
            let mut replies = vec![reply];
            if !self.builder.is_active() {
                replies.extend(self.present_exception());
            }
            return Ok(replies);
        }

        if let Some(exception_id) = self.assigning.clone() {
            let chart = &self.profile_or_err()?.chart_of_accounts;
            let choice = text.trim();
            let account = chart
                .get(choice)
                .or_else(|| chart.find_by_name(choice))
                .map(|a| a.code.clone());
            return match account {
                Some(account_id) => {
                    self.assign_exception(&exception_id, &account_id).await
                }
                None => Ok(vec![ChatMessage::saim(format!(
                    "I couldn't find an account matching \"{choice}\". Enter an account code or name:"
                ))]),
            };
        }

        let command = text.trim().to_lowercase();
        let action = match command.as_str() {
            "report" => Some(ChatAction::GenerateReport),
            "rules" => Some(ChatAction::ViewRules),
            "history" => Some(ChatAction::ViewHistory),
            "profile" => Some(ChatAction::ViewProfile),
            "categorize" => Some(ChatAction::Categorize),
            "suggest" => Some(ChatAction::SuggestRules),
            "new rule" => Some(ChatAction::StartRule),
            "new run" => Some(ChatAction::NewRun),
            "chart" => Some(ChatAction::GenerateChart),
            _ => None,
        };
        match action {
            Some(action) => self.handle_action(action).await,
            None => {
                let mut replies = vec![ChatMessage::saim("Action not recognized.")];
                replies.push(self.step_prompt());
                Ok(replies)
            }
        }
    }

    async fn interview_reply(
        &mut self,
        reply: InterviewReply,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        match reply {
            InterviewReply::Next {
                acknowledgement,
                question,
            } => Ok(vec![ChatMessage::saim(acknowledgement), ChatMessage::saim(question)]),
            InterviewReply::OfferCorrection {
                message,
                original,
                corrected,
            } => Ok(vec![ChatMessage::saim_with(
                message,
                vec![
                    ChatOption::new(format!("Use \"{corrected}\""), ChatAction::UseCorrection),
                    ChatOption::new(format!("Keep \"{original}\""), ChatAction::KeepOriginal),
                ],
            )]),
            InterviewReply::Clarify(text) => Ok(vec![ChatMessage::saim(text)]),
            InterviewReply::Complete {
                acknowledgement,
                profile,
            } => {
                self.repo.save_profile(&profile).await?;
                info!(
                    company = %profile.id,
                    name = %profile.business_name,
                    "company profile created"
                );
                let done = format!(
                    "Perfect! {} is now set up. All future bank statement processing will use this profile and learn from your transaction patterns to improve predictions.",
                    profile.business_name
                );
                self.interview = None;
                self.profile = Some(profile);
                self.rules = RuleEngine::default();
                self.patterns = PatternStore::new(self.settings.categorizer.pattern_window);
                self.workflow.complete(WorkflowStep::CompanySetup);
                Ok(vec![
                    ChatMessage::saim(acknowledgement),
                    ChatMessage::saim(done),
                    self.step_prompt(),
                ])
            }
        }
    }

    /// What to offer for the step the workflow is on.
    fn step_prompt(&self) -> ChatMessage {
        match self.workflow.current() {
            WorkflowStep::CompanySetup => ChatMessage::saim(
                self.interview
                    .as_ref()
                    .and_then(ProfileInterview::current_question)
                    .unwrap_or("Let's set up your company profile."),
            ),
            WorkflowStep::ChartOfAccounts => ChatMessage::saim_with(
                "Company profile created! Now let's set up your Chart of Accounts.",
                vec![ChatOption::new("Generate Chart of Accounts", ChatAction::GenerateChart)],
            ),
            WorkflowStep::UploadContacts => ChatMessage::saim_with(
                "COA configured. Add your contacts to improve party mapping?",
                vec![
                    ChatOption::new("Upload Contacts", ChatAction::UploadContacts),
                    ChatOption::new("Skip", ChatAction::SkipContacts),
                ],
            ),
            WorkflowStep::UploadBankStatement => ChatMessage::saim_with(
                "Ready to process a bank statement. Please upload your file.",
                vec![ChatOption::new("Upload Bank Statement", ChatAction::UploadStatement)],
            ),
            WorkflowStep::CategorizeTransactions => ChatMessage::saim_with(
                "Statement loaded. Ready to categorize transactions.",
                vec![ChatOption::new("Categorize Transactions", ChatAction::Categorize)],
            ),
            WorkflowStep::HandleExceptions => self.exceptions.present(),
            WorkflowStep::GenerateReport => ChatMessage::saim_with(
                "Ready to generate the run report.",
                vec![ChatOption::new("Generate Report", ChatAction::GenerateReport)],
            ),
        }
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    async fn handle_action(
        &mut self,
        action: ChatAction,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        debug!(?action, "chat action");
        match action {
            ChatAction::UseCorrection | ChatAction::KeepOriginal => {
                let use_corrected = action == ChatAction::UseCorrection;
                let reply = self
                    .interview
                    .as_mut()
                    .and_then(|i| i.resolve_correction(use_corrected));
                match reply {
                    Some(reply) => self.interview_reply(reply).await,
                    None => Ok(vec![ChatMessage::saim("There is no correction to settle.")]),
                }
            }
            ChatAction::GenerateChart => self.generate_chart().await,
            ChatAction::UploadContacts => Ok(vec![ChatMessage::saim(
                "Upload a contacts CSV with Name and Type columns (Email, Phone and Address are optional).",
            )]),
            ChatAction::SkipContacts => {
                self.profile_or_err()?;
                self.workflow.complete(WorkflowStep::UploadContacts);
                Ok(vec![
                    ChatMessage::saim("Okay, we'll skip uploading contacts for now."),
                    self.step_prompt(),
                ])
            }
            ChatAction::UploadStatement => Ok(vec![ChatMessage::saim(
                "Upload a bank statement CSV with Date, Description and Amount (or Debit/Credit) columns.",
            )]),
            ChatAction::Categorize => self.categorize().await,
            ChatAction::ChooseAccountFor { exception_id } => self.choose_account_for(&exception_id),
            ChatAction::AssignAccount {
                exception_id,
                account_id,
            } => self.assign_exception(&exception_id, &account_id).await,
            ChatAction::CreateRuleFor { exception_id } => {
                let description = self.exceptions.pending(&exception_id)?.description.clone();
                self.assigning = None;
                Ok(vec![self.builder.start(Some((&exception_id, &description)))?])
            }
            ChatAction::IgnoreException { exception_id } => {
                let description = self.exceptions.ignore(&exception_id)?.description.clone();
                self.after_resolution(format!("Ignored \"{description}\" for this run."))
                    .await
            }
            ChatAction::AcceptSuggestion { exception_id } => {
                let no_suggestion =
                    || ChatMessage::saim("There is no suggestion for this exception.");

                let Some(resolved) = self.exceptions.accept_suggestion(&exception_id)? else {
                    return Ok(vec![no_suggestion()]);
                };
                let description = resolved.description.clone();
                let transaction_id = resolved.transaction_id.clone();
                let Some(suggestion) = resolved.suggestion.clone() else {
                    return Ok(vec![no_suggestion()]);
                };
                self.reassign_history(&transaction_id, &suggestion.account_id);
                self.after_resolution(format!(
                    "Applied suggestion: \"{description}\" → {}. This pattern will be reinforced for future predictions.",
                    suggestion.account_name
                ))
                .await
            }
            ChatAction::StartRule => {
                self.profile_or_err()?;
                Ok(vec![self.builder.start(None)?])
            }
            ChatAction::RuleField { field } => Ok(vec![self.builder.choose_field(field)?]),
            ChatAction::RuleOperator { operator } => {
                Ok(vec![self.builder.choose_operator(operator)?])
            }
            ChatAction::RuleAccount { account_id } => {
                let profile = self.profile.as_ref().ok_or(SessionError::NoProfile)?;
                let chart = &profile.chart_of_accounts;
                Ok(vec![self.builder.choose_account(&account_id, chart)?])
            }
            ChatAction::ConfirmRule => self.save_rule().await,
            ChatAction::CancelRule => {
                if self.builder.cancel().is_none() {
                    return Err(SessionError::NoRuleInProgress);
                }
                let mut replies = vec![ChatMessage::saim("Rule creation cancelled.")];
                replies.extend(self.present_exception());
                Ok(replies)
            }
            ChatAction::GenerateReport => self.generate_report().await,
            ChatAction::SuggestRules => self.suggest().await,
            ChatAction::AcceptSuggestedRule { index } => self.accept_suggested_rule(index).await,
            ChatAction::ViewProfile => Ok(vec![self.describe_profile()?]),
            ChatAction::ViewRules => Ok(vec![self.describe_rules()]),
            ChatAction::ViewHistory => self.describe_history().await,
            ChatAction::NewRun => {
                self.profile_or_err()?;
                self.workflow.restart_run();
                self.run = None;
                self.statement = None;
                self.run_history.clear();
                self.exceptions = ExceptionQueue::default();
                Ok(vec![self.step_prompt()])
            }
        }
    }

    // ── Setup steps ───────────────────────────────────────────────────────────

    async fn generate_chart(&mut self) -> Result<Vec<ChatMessage>, SessionError> {
        let mut profile = self.profile_or_err()?.clone();
        let chart = self.charts.generate(&profile).await?;
        let count = chart.len();
        profile.chart_of_accounts = chart;
        profile.updated_at = chrono::Utc::now();
        self.repo.save_profile(&profile).await?;
        let industry = if profile.industry.is_empty() {
            "general".to_string()
        } else {
            profile.industry.clone()
        };
        self.profile = Some(profile);
        self.workflow.complete(WorkflowStep::ChartOfAccounts);
        Ok(vec![
            ChatMessage::saim(format!(
                "Generated a Chart of Accounts with {count} accounts for your {industry} business."
            )),
            self.step_prompt(),
        ])
    }

    async fn import_contacts<R: Read>(
        &mut self,
        file_name: &str,
        data: R,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let mut profile = self.profile_or_err()?.clone();
        let contacts = import_contacts(data)?;
        let read = contacts.len();
        let added = profile.merge_contacts(contacts);
        profile.updated_at = chrono::Utc::now();
        self.repo.save_profile(&profile).await?;
        self.profile = Some(profile);
        self.workflow.complete(WorkflowStep::UploadContacts);
        info!(file = file_name, read, added, "contacts imported");
        Ok(vec![
            ChatMessage::saim(format!(
                "Read {read} contacts from {file_name}; {added} were new."
            )),
            self.step_prompt(),
        ])
    }

    async fn import_statement<R: Read>(
        &mut self,
        file_name: &str,
        data: R,
        format: &StatementProfile,
        period: Option<DateRange>,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let profile = self.profile_or_err()?;
        if profile.chart_of_accounts.is_empty() {
            return Err(SessionError::NoChart);
        }
        let mut transactions = import_statement(data, format)?;
        let period = period
            .or_else(|| DateRange::spanning(transactions.iter().map(|t| t.date)))
            .ok_or(SessionError::EmptyStatement)?;

        let run = ProcessingRun::start(profile.id.clone(), file_name, period);
        for tx in &mut transactions {
            tx.id = format!("{}_{}", run.id, tx.id);
        }
        let mapped = map_parties(&profile.contacts, &mut transactions);
        let history = self.repo.history(&profile.id).await?.len();
        let text = format!(
            "Processing {file_name} for {}: {} transactions from {period}. Mapped {mapped} parties from your contacts. Using {history} historical transactions and {} learned patterns for predictions.",
            profile.business_name,
            transactions.len(),
            self.patterns.len(),
        );

        self.repo.record_run(&run).await?;
        info!(run = %run.id, file = file_name, count = transactions.len(), "statement uploaded");
        self.run = Some(run);
        self.statement = Some(PendingStatement { transactions });
        self.run_history.clear();
        self.exceptions = ExceptionQueue::default();
        self.workflow.complete(WorkflowStep::UploadBankStatement);
        Ok(vec![ChatMessage::saim_with(
            text,
            vec![ChatOption::new("Categorize Transactions", ChatAction::Categorize)],
        )])
    }

    // ── Categorization and exceptions ─────────────────────────────────────────

    async fn categorize(&mut self) -> Result<Vec<ChatMessage>, SessionError> {
        let profile = self.profile.as_ref().ok_or(SessionError::NoProfile)?;
        let statement = self.statement.take().ok_or(SessionError::NoRun)?;
        let mut run = match self.run.clone() {
            Some(run) => run,
            None => {
                self.statement = Some(statement);
                return Err(SessionError::NoRun);
            }
        };

        let mut categorizer =
            Categorizer::new(&self.settings.categorizer, &mut self.rules, &mut self.patterns);
        let outcome = match categorizer.run(&statement.transactions, &profile.chart_of_accounts) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.statement = Some(statement);
                return Err(err.into());
            }
        };

        let company = profile.id.clone();
        let mut exceptions = outcome.exceptions.clone();
        for e in &mut exceptions {
            e.run_id = Some(run.id.clone());
        }
        run.rules_applied = outcome.rules_applied.clone();
        run.transaction_count = outcome.results.len();
        run.exceptions_count = exceptions.len();
        self.run_history = outcome.history(&run.id);
        self.exceptions = ExceptionQueue::new(exceptions);
        self.repo.save_rules(&company, self.rules.rules()).await?;
        self.repo.save_patterns(&company, &self.patterns).await?;
        self.repo.save_exceptions(&company, self.exceptions.items()).await?;
        self.repo.record_run(&run).await?;
        self.run = Some(run);
        self.workflow.complete(WorkflowStep::CategorizeTransactions);

        let by_rule = outcome
            .results
            .iter()
            .filter(|r| r.categorization.rule_id().is_some())
            .count();
        let mut replies = vec![ChatMessage::saim(format!(
            "Categorized {} transactions: {by_rule} by your rules, {} need your review.",
            outcome.results.len(),
            self.exceptions.len()
        ))];
        if self.exceptions.is_empty() {
            replies.push(ChatMessage::saim(
                "No exceptions found! Predictions were highly accurate.",
            ));
            replies.extend(self.finish_run().await?);
        } else {
            replies.push(self.exceptions.present());
        }
        Ok(replies)
    }

    fn choose_account_for(&mut self, exception_id: &str) -> Result<Vec<ChatMessage>, SessionError> {
        let exception = self.exceptions.pending(exception_id)?;
        let chart = &self.profile_or_err()?.chart_of_accounts;
        let options = chart
            .iter()
            .map(|a| {
                ChatOption::new(
                    format!("{} - {}", a.code, a.name),
                    ChatAction::AssignAccount {
                        exception_id: exception_id.to_string(),
                        account_id: a.code.clone(),
                    },
                )
            })
            .collect();
        let text = format!(
            "Which account should \"{}\" be assigned to?",
            exception.description
        );
        self.assigning = Some(exception_id.to_string());
        Ok(vec![ChatMessage::saim_with(text, options)])
    }

    async fn assign_exception(
        &mut self,
        exception_id: &str,
        account_id: &str,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let account_name = self
            .profile_or_err()?
            .chart_of_accounts
            .get(account_id)
            .map(|a| a.name.clone())
            .ok_or_else(|| SessionError::UnknownAccount(account_id.to_string()))?;
        let resolved = self.exceptions.assign(exception_id, account_id)?;
        let description = resolved.description.clone();
        let transaction_id = resolved.transaction_id.clone();
        self.assigning = None;
        self.reassign_history(&transaction_id, account_id);
        self.after_resolution(format!("Assigned \"{description}\" to {account_name}."))
            .await
    }

    /// Points the run's record of a transaction at the account the user
    /// chose and teaches the pattern store about it.
    fn reassign_history(&mut self, transaction_id: &str, account_id: &str) {
        let account_name = self
            .profile
            .as_ref()
            .and_then(|p| p.chart_of_accounts.get(account_id))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| account_id.to_string());
        if let Some(h) = self
            .run_history
            .iter_mut()
            .find(|h| h.transaction.id == transaction_id)
        {
            h.account_id = account_id.to_string();
            h.account_name = account_name;
            h.confidence = USER_CONFIRMED;
            self.patterns.record(&h.transaction, account_id, USER_CONFIRMED);
        }
    }

    async fn after_resolution(
        &mut self,
        acknowledgement: String,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let company = self.company_id()?;
        self.repo.save_exceptions(&company, self.exceptions.items()).await?;
        let mut replies = vec![ChatMessage::saim(acknowledgement)];
        if self.exceptions.all_handled() {
            replies.push(ChatMessage::saim(ALL_HANDLED));
            replies.extend(self.finish_run().await?);
        } else {
            replies.push(self.exceptions.present());
        }
        Ok(replies)
    }

    /// Re-shows the open exception when one is being worked through.
    fn present_exception(&self) -> Option<ChatMessage> {
        let reviewing = self.workflow.current() == WorkflowStep::HandleExceptions;
        (reviewing && !self.exceptions.all_handled()).then(|| self.exceptions.present())
    }

    async fn finish_run(&mut self) -> Result<Vec<ChatMessage>, SessionError> {
        let company = self.company_id()?;
        let mut run = self.run.clone().ok_or(SessionError::NoRun)?;
        run.complete(
            run.transaction_count,
            self.exceptions.len(),
            run.rules_applied.clone(),
        );
        self.repo.record_run(&run).await?;
        self.repo.append_history(&company, &self.run_history).await?;
        self.repo.save_patterns(&company, &self.patterns).await?;
        self.repo.save_rules(&company, self.rules.rules()).await?;
        self.profile = Some(self.repo.refresh_stats(&company).await?);
        info!(run = %run.id, summary = %run.summary, "processing run completed");
        self.run = Some(run);
        self.workflow.complete(WorkflowStep::HandleExceptions);
        Ok(vec![ChatMessage::saim_with(
            "All exceptions resolved. Ready to generate the final report.",
            vec![ChatOption::new("Generate Report", ChatAction::GenerateReport)],
        )])
    }

    // ── Rules ─────────────────────────────────────────────────────────────────

    async fn save_rule(&mut self) -> Result<Vec<ChatMessage>, SessionError> {
        let company = self.company_id()?;
        if let Some(exception_id) = self.builder.draft().and_then(|d| d.exception_id.as_deref()) {
            self.exceptions.pending(exception_id)?;
        }
        let built = self.builder.confirm(company.clone())?;
        let rule = built.rule;
        self.repo.add_rule(&rule).await?;
        self.rules.add(rule.clone());
        self.profile = Some(self.repo.refresh_stats(&company).await?);
        info!(rule = %rule.id, name = %rule.name, "rule saved");

        let saved = ChatMessage::saim(format!("Rule \"{}\" saved!", rule.name));
        match built.exception_id {
            Some(exception_id) => {
                let resolved = self.exceptions.mark_rule_created(
                    &exception_id,
                    &rule.id,
                    &rule.apply_to_account_id,
                )?;
                let transaction_id = resolved.transaction_id.clone();
                self.reassign_history(&transaction_id, &rule.apply_to_account_id);
                if let Some(h) = self
                    .run_history
                    .iter_mut()
                    .find(|h| h.transaction.id == transaction_id)
                {
                    h.rule_applied = Some(rule.id.clone());
                }
                let description = self
                    .exceptions
                    .get(&exception_id)
                    .map(|e| e.description.clone())
                    .unwrap_or_default();
                let mut replies = vec![saved];
                replies.extend(
                    self.after_resolution(format!(
                        "Categorized \"{description}\" as {} using the new rule.",
                        rule.apply_to_account_name
                    ))
                    .await?,
                );
                Ok(replies)
            }
            None => {
                let mut replies = vec![saved];
                replies.extend(self.present_exception());
                Ok(replies)
            }
        }
    }

    async fn suggest(&mut self) -> Result<Vec<ChatMessage>, SessionError> {
        let company = self.company_id()?;
        let history = self.repo.history(&company).await?;
        self.suggestions = suggest_rules(&history, self.rules.rules());
        if self.suggestions.is_empty() {
            return Ok(vec![ChatMessage::saim(
                "No rule suggestions yet. I need at least three consistent transactions per payee.",
            )]);
        }
        let options = self
            .suggestions
            .iter()
            .enumerate()
            .map(|(index, s)| {
                ChatOption::new(
                    format!(
                        "{} → {} ({} transactions, {:.0}% agreement)",
                        s.name,
                        s.target_account_name,
                        s.potential_matches,
                        s.confidence * 100.0
                    ),
                    ChatAction::AcceptSuggestedRule { index },
                )
            })
            .collect();
        Ok(vec![ChatMessage::saim_with(
            format!("I found {} rules you might want:", self.suggestions.len()),
            options,
        )])
    }

    async fn accept_suggested_rule(
        &mut self,
        index: usize,
    ) -> Result<Vec<ChatMessage>, SessionError> {
        let company = self.company_id()?;
        if index >= self.suggestions.len() {
            return Ok(vec![ChatMessage::saim("That suggestion is no longer available.")]);
        }
        let suggestion = self.suggestions.remove(index);
        let rule = suggestion.into_rule(company.clone())?;
        self.repo.add_rule(&rule).await?;
        self.rules.add(rule.clone());
        self.profile = Some(self.repo.refresh_stats(&company).await?);
        Ok(vec![ChatMessage::saim(format!("Rule \"{}\" saved!", rule.name))])
    }

    // ── Reports and views ─────────────────────────────────────────────────────

    async fn generate_report(&mut self) -> Result<Vec<ChatMessage>, SessionError> {
        let run = self.run.as_ref().ok_or(SessionError::NoRun)?;
        if run.status != RunStatus::Completed {
            let pending = self.exceptions.counts().pending;
            return Ok(vec![
                ChatMessage::saim(format!(
                    "There are still {pending} exceptions to handle before the report."
                )),
                self.step_prompt(),
            ]);
        }
        let report = self.report().await?;
        self.workflow.complete(WorkflowStep::GenerateReport);
        Ok(vec![
            ChatMessage::saim(report.to_string()),
            ChatMessage::saim_with(
                format!(
                    "Run complete! Applied {} rules. Historical data updated for better future predictions. What's next?",
                    report.rules_applied
                ),
                vec![
                    ChatOption::new("Process Another Statement", ChatAction::NewRun),
                    ChatOption::new("Suggest Rules", ChatAction::SuggestRules),
                    ChatOption::new("View Processing History", ChatAction::ViewHistory),
                    ChatOption::new("View Rules", ChatAction::ViewRules),
                ],
            ),
        ])
    }

    fn describe_profile(&self) -> Result<ChatMessage, SessionError> {
        let p = self.profile_or_err()?;
        Ok(ChatMessage::saim(format!(
            "{}\nNature: {}\nIndustry: {}\nLocation: {}\nType: {}\nFramework: {}\nCompliances: {}\nAccounts: {}, contacts: {}, transactions processed: {}, rules: {}",
            p.business_name,
            p.nature_of_business,
            p.industry,
            p.location,
            p.company_type,
            p.reporting_framework,
            p.statutory_compliances.join(", "),
            p.chart_of_accounts.len(),
            p.contacts.len(),
            p.total_transactions_processed,
            p.total_rules_created,
        )))
    }

    fn describe_rules(&self) -> ChatMessage {
        if self.rules.is_empty() {
            return ChatMessage::saim("No rules yet.");
        }
        let lines: Vec<String> = self
            .rules
            .rules()
            .iter()
            .map(|r| {
                let conditions: Vec<String> =
                    r.conditions.iter().map(ToString::to_string).collect();

                format!(
                    "{}: if {} then {} ({} applied{})",
                    r.name,
                    conditions.join(" and "),
                    r.apply_to_account_name,
                    r.times_applied,
                    if r.is_enabled { "" } else { ", disabled" }
                )
            })
            .collect();
        ChatMessage::saim(format!(
            "Displaying {} active rules.\n{}",
            self.rules.len(),
            lines.join("\n")
        ))
    }

    async fn describe_history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        let company = self.company_id()?;
        let runs = self.repo.runs(&company).await?;
        let mut text = format!("Showing {} processing runs.", runs.len());
        for run in &runs {
            text.push_str(&format!(
                "\n{} {} ({}): {}",
                run.processed_at.format("%Y-%m-%d"),
                run.file_name,
                run.period,
                if run.summary.is_empty() { "in progress" } else { run.summary.as_str() }
            ));
        }
        Ok(vec![ChatMessage::saim(text)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saim_assistant::{RuleBasedValidator, TemplateChartGenerator};
    use saim_core::{ContactType, ExceptionStatus};
    use saim_storage::{MemoryStore, SqliteStore};

    const STATEMENT: &str = "\
Date,Description,Amount
2024-03-01,Zorblax 7731,-50.00
2024-03-02,Quimby 2290,-80.00
2024-03-05,Client Payment - Project X,2500.00
";

    fn session<S: KeyValueStore>(store: S) -> Session<S> {
        Session::new(
            CompanyRepository::new(store),
            Box::new(RuleBasedValidator::new()),
            Box::new(TemplateChartGenerator::new()),
            SessionSettings {
                user_id: "user_1".into(),
                ..SessionSettings::default()
            },
        )
    }

    async fn set_up<S: KeyValueStore>(s: &mut Session<S>) {
        s.open(None).await;
        for answer in [
            "Acme Software",
            "Consulting",
            "Technology",
            "Austin, Texas, USA",
            "Private Limited",
            "US GAAP",
            "Sales Tax",
        ] {
            s.send_text(answer).await;
        }
        assert!(s.profile().is_some(), "interview should have completed");
        s.send_action(ChatAction::GenerateChart).await;
        s.send_action(ChatAction::SkipContacts).await;
        assert_eq!(s.workflow().current(), WorkflowStep::UploadBankStatement);
    }

    async fn upload<S: KeyValueStore>(s: &mut Session<S>) {
        s.upload_statement("march.csv", STATEMENT.as_bytes(), &StatementProfile::default(), None)
            .await;
        assert!(s.current_run().is_some());
    }

    #[tokio::test]
    async fn setup_generates_chart_and_persists_profile() {
        let mut s = session(MemoryStore::new());
        set_up(&mut s).await;

        let profile = s.profile().unwrap().clone();
        assert!(!profile.chart_of_accounts.is_empty());
        let stored = s.repository().load_profile(&profile.id).await.unwrap().unwrap();
        assert_eq!(stored.chart_of_accounts, profile.chart_of_accounts);
        assert_eq!(stored.statutory_compliances, vec!["Sales Tax"]);

        let chat: Option<Vec<ChatMessage>> = s.repository().load_chat(&profile.id).await.unwrap();
        assert_eq!(chat.unwrap().len(), s.transcript().len());
    }

    #[tokio::test]
    async fn start_then_cancel_persists_nothing() {
        let mut s = session(MemoryStore::new());
        set_up(&mut s).await;
        let company = s.profile().unwrap().id.clone();

        s.send_action(ChatAction::StartRule).await;
        s.send_text("Coffee runs").await;
        assert!(s.rule_builder().is_active());

        let replies = s.send_action(ChatAction::CancelRule).await;
        assert_eq!(replies[0].text, "Rule creation cancelled.");
        assert!(!s.rule_builder().is_active());
        assert!(s.rules().is_empty());
        assert!(s.repository().rules(&company).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn two_exceptions_resolved_in_order() {
        let mut s = session(MemoryStore::new());
        set_up(&mut s).await;
        upload(&mut s).await;

        let replies = s.send_action(ChatAction::Categorize).await;
        assert_eq!(s.exceptions().len(), 2, "{replies:?}");
        assert!(replies.last().unwrap().text.contains("Zorblax"));

        let first = s.exceptions().current().unwrap().id.clone();
        let account = s.profile().unwrap().chart_of_accounts.iter().next().unwrap().code.clone();
        let replies = s
            .send_action(ChatAction::AssignAccount {
                exception_id: first,
                account_id: account,
            })
            .await;
        assert!(replies.last().unwrap().text.contains("Quimby"));

        let second = s.exceptions().current().unwrap().id.clone();
        let replies = s.send_action(ChatAction::IgnoreException { exception_id: second }).await;
        assert!(replies.iter().any(|m| m.text == ALL_HANDLED));
        assert!(s.exceptions().all_handled());

        let company = s.profile().unwrap().id.clone();
        let runs = s.repository().runs(&company).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(s.repository().history(&company).await.unwrap().len(), 3);
        assert_eq!(s.profile().unwrap().total_transactions_processed, 3);

        let replies = s.send_action(ChatAction::GenerateReport).await;
        assert!(replies[0].text.contains("1 assigned"));
        assert!(replies[0].text.contains("1 ignored"));
        assert_eq!(s.workflow().current(), WorkflowStep::GenerateReport);
    }

    #[tokio::test]
    async fn handled_exception_cannot_be_resolved_again() {
        let mut s = session(MemoryStore::new());
        set_up(&mut s).await;
        upload(&mut s).await;
        s.send_action(ChatAction::Categorize).await;

        let first = s.exceptions().current().unwrap().id.clone();
        let account = s.profile().unwrap().chart_of_accounts.iter().next().unwrap().code.clone();
        s.send_action(ChatAction::AssignAccount {
            exception_id: first.clone(),
            account_id: account.clone(),
        })
        .await;
        let second = s.exceptions().current().unwrap().id.clone();
        s.send_action(ChatAction::IgnoreException { exception_id: second }).await;

        let company = s.profile().unwrap().id.clone();
        assert_eq!(s.repository().history(&company).await.unwrap().len(), 3);

        let replies = s
            .send_action(ChatAction::IgnoreException {
                exception_id: first.clone(),
            })
            .await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.starts_with("Error:"), "{replies:?}");
        assert!(replies[0].text.contains("already been handled"));

        s.send_action(ChatAction::AcceptSuggestion {
            exception_id: first.clone(),
        })
        .await;
        s.send_action(ChatAction::AssignAccount {
            exception_id: first.clone(),
            account_id: account.clone(),
        })
        .await;
        let replies = s
            .send_action(ChatAction::CreateRuleFor {
                exception_id: first.clone(),
            })
            .await;
        assert!(replies[0].text.starts_with("Error:"));
        assert!(!s.rule_builder().is_active());
        let replies = s
            .send_action(ChatAction::ChooseAccountFor {
                exception_id: first.clone(),
            })
            .await;
        assert!(replies[0].text.starts_with("Error:"));

        let replies = s
            .send_action(ChatAction::IgnoreException {
                exception_id: "ex_stale".into(),
            })
            .await;
        assert!(replies[0].text.contains("Unknown exception"));

        assert!(matches!(
            s.exceptions().get(&first).unwrap().status,
            ExceptionStatus::Assigned { .. }
        ));
        assert_eq!(s.repository().history(&company).await.unwrap().len(), 3);
        assert_eq!(s.profile().unwrap().total_transactions_processed, 3);
        assert_eq!(s.repository().runs(&company).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rule_from_exception_applies_next_run() {
        let mut s = session(MemoryStore::new());
        set_up(&mut s).await;
        upload(&mut s).await;
        s.send_action(ChatAction::Categorize).await;

        let first = s.exceptions().current().unwrap().id.clone();
        s.send_action(ChatAction::CreateRuleFor { exception_id: first.clone() }).await;
        s.send_text("Zorblax").await;
        s.send_text("description").await;
        s.send_text("contains").await;
        s.send_text("zorblax").await;
        s.send_text("1").await;
        let replies = s.send_action(ChatAction::ConfirmRule).await;
        assert!(replies[0].text.contains("saved"));
        assert!(matches!(
            s.exceptions().get(&first).unwrap().status,
            ExceptionStatus::RuleCreated { .. }
        ));
        assert_eq!(s.rules().len(), 1);
        assert_eq!(s.profile().unwrap().total_rules_created, 1);

        let second = s.exceptions().current().unwrap().id.clone();
        s.send_action(ChatAction::IgnoreException { exception_id: second }).await;

        s.send_action(ChatAction::NewRun).await;
        upload(&mut s).await;
        s.send_action(ChatAction::Categorize).await;
        assert!(s
            .exceptions()
            .items()
            .iter()
            .all(|e| !e.description.contains("Zorblax")));
        assert_eq!(s.rules()[0].times_applied, 1);
        assert_eq!(s.current_run().unwrap().rules_applied, vec![s.rules()[0].id.clone()]);
    }

    #[tokio::test]
    async fn resumes_saved_company_from_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saim.db");
        let company = {
            let mut s = session(SqliteStore::open(&path).await.unwrap());
            set_up(&mut s).await;
            s.profile().unwrap().id.clone()
        };

        let mut s = session(SqliteStore::open(&path).await.unwrap());
        let replies = s.open(Some(&company)).await;
        assert!(replies[0].text.starts_with("Welcome back to Acme Software!"));
        assert_eq!(s.workflow().current(), WorkflowStep::UploadBankStatement);
        assert!(!s.transcript().is_empty());
    }

    #[tokio::test]
    async fn missing_state_becomes_a_chat_message() {
        let mut s = session(MemoryStore::new());
        let replies = s.send_action(ChatAction::GenerateReport).await;
        assert_eq!(replies[0].text, "Error: No active processing run found.");

        let replies = s.send_action(ChatAction::GenerateChart).await;
        assert_eq!(replies[0].text, "Error: No company profile found.");
    }

    #[test]
    fn parties_mapped_from_contacts() {
        let contacts = vec![Contact::new("Staples", ContactType::Vendor)];
        let mut txs = vec![
            BankTransaction::from_signed(
                "tx_1",
                chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                "STAPLES #123 order",
                "-12.00".parse().unwrap(),
            ),
            BankTransaction::from_signed(
                "tx_2",
                chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                "Something else",
                "-5.00".parse().unwrap(),
            ),
        ];
        assert_eq!(map_parties(&contacts, &mut txs), 1);
        assert_eq!(txs[0].contact.as_deref(), Some("Staples"));
        assert_eq!(txs[1].contact, None);
    }
}
