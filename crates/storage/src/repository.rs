use chrono::Utc;
use saim_categorize::PatternStore;
use saim_core::{
    CompanyId, CompanyProfile, HistoricalTransaction, ProcessingRun, TransactionException,
    TransactionRule,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::kv::KeyValueStore;

pub const KEY_PREFIX: &str = "saimjr";

/// What a key holds. Every company-scoped blob lives under
/// `saimjr:<kind>:<company id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Profile,
    Runs,
    History,
    Rules,
    Chat,
    Patterns,
    Exceptions,
}

impl RecordKind {
    pub const ALL: [RecordKind; 7] = [
        RecordKind::Profile,
        RecordKind::Runs,
        RecordKind::History,
        RecordKind::Rules,
        RecordKind::Chat,
        RecordKind::Patterns,
        RecordKind::Exceptions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Profile => "profile",
            RecordKind::Runs => "runs",
            RecordKind::History => "history",
            RecordKind::Rules => "rules",
            RecordKind::Chat => "chat",
            RecordKind::Patterns => "patterns",
            RecordKind::Exceptions => "exceptions",
        }
    }

    pub fn key(self, company: &CompanyId) -> String {
        format!("{KEY_PREFIX}:{}:{}", self.as_str(), company)
    }
}

fn user_index_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}:companies:{user_id}")
}

/// Everything stored for one company, as a single portable document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyExport {
    pub profile: CompanyProfile,
    #[serde(default)]
    pub runs: Vec<ProcessingRun>,
    #[serde(default)]
    pub history: Vec<HistoricalTransaction>,
    #[serde(default)]
    pub rules: Vec<TransactionRule>,
    #[serde(default)]
    pub exceptions: Vec<TransactionException>,
    #[serde(default)]
    pub patterns: Option<PatternStore>,
    #[serde(default)]
    pub chat: Option<serde_json::Value>,
}

/// Typed access to company data on top of any [`KeyValueStore`].
pub struct CompanyRepository<S> {
    store: S,
}

impl<S: KeyValueStore> CompanyRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw).await
    }

    async fn read_list<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        company: &CompanyId,
    ) -> Result<Vec<T>, StorageError> {
        Ok(self.read(&kind.key(company)).await?.unwrap_or_default())
    }

    // --- Profiles ---

    pub async fn save_profile(&self, profile: &CompanyProfile) -> Result<(), StorageError> {
        self.write(&RecordKind::Profile.key(&profile.id), profile).await?;

        let key = user_index_key(&profile.user_id);
        let mut index: Vec<CompanyId> = self.read(&key).await?.unwrap_or_default();
        if !index.contains(&profile.id) {
            index.push(profile.id.clone());
            self.write(&key, &index).await?;
        }
        Ok(())
    }

    pub async fn load_profile(
        &self,
        company: &CompanyId,
    ) -> Result<Option<CompanyProfile>, StorageError> {
        self.read(&RecordKind::Profile.key(company)).await
    }

    /// Companies owned by `user_id`, in creation order. Index entries whose
    /// profile has since been removed are skipped.
    pub async fn companies_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<CompanyProfile>, StorageError> {
        let index: Vec<CompanyId> = self.read(&user_index_key(user_id)).await?.unwrap_or_default();
        let mut profiles = Vec::with_capacity(index.len());
        for id in &index {
            if let Some(profile) = self.load_profile(id).await? {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    // --- Runs, history, exceptions ---

    pub async fn record_run(&self, run: &ProcessingRun) -> Result<(), StorageError> {
        let mut runs: Vec<ProcessingRun> = self.read_list(RecordKind::Runs, &run.company_id).await?;
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => runs.push(run.clone()),
        }
        self.write(&RecordKind::Runs.key(&run.company_id), &runs).await
    }

    pub async fn runs(&self, company: &CompanyId) -> Result<Vec<ProcessingRun>, StorageError> {
        self.read_list(RecordKind::Runs, company).await
    }

    pub async fn append_history(
        &self,
        company: &CompanyId,
        entries: &[HistoricalTransaction],
    ) -> Result<usize, StorageError> {
        let mut history: Vec<HistoricalTransaction> =
            self.read_list(RecordKind::History, company).await?;
        history.extend_from_slice(entries);
        self.write(&RecordKind::History.key(company), &history).await?;
        Ok(history.len())
    }

    pub async fn history(
        &self,
        company: &CompanyId,
    ) -> Result<Vec<HistoricalTransaction>, StorageError> {
        self.read_list(RecordKind::History, company).await
    }

    pub async fn save_exceptions(
        &self,
        company: &CompanyId,
        exceptions: &[TransactionException],
    ) -> Result<(), StorageError> {
        self.write(&RecordKind::Exceptions.key(company), exceptions).await
    }

    pub async fn exceptions(
        &self,
        company: &CompanyId,
    ) -> Result<Vec<TransactionException>, StorageError> {
        self.read_list(RecordKind::Exceptions, company).await
    }

    // --- Rules ---

    pub async fn save_rules(
        &self,
        company: &CompanyId,
        rules: &[TransactionRule],
    ) -> Result<(), StorageError> {
        self.write(&RecordKind::Rules.key(company), rules).await
    }

    pub async fn rules(&self, company: &CompanyId) -> Result<Vec<TransactionRule>, StorageError> {
        self.read_list(RecordKind::Rules, company).await
    }

    /// Appends a rule, replacing any stored rule with the same id.
    pub async fn add_rule(&self, rule: &TransactionRule) -> Result<(), StorageError> {
        let mut rules = self.rules(&rule.company_id).await?;
        rules.retain(|r| r.id != rule.id);
        rules.push(rule.clone());
        self.save_rules(&rule.company_id, &rules).await
    }

    // --- Learning state and chat ---

    pub async fn save_patterns(
        &self,
        company: &CompanyId,
        patterns: &PatternStore,
    ) -> Result<(), StorageError> {
        self.write(&RecordKind::Patterns.key(company), patterns).await
    }

    pub async fn load_patterns(
        &self,
        company: &CompanyId,
    ) -> Result<Option<PatternStore>, StorageError> {
        self.read(&RecordKind::Patterns.key(company)).await
    }

    pub async fn save_chat<T: Serialize + Sync>(
        &self,
        company: &CompanyId,
        chat: &T,
    ) -> Result<(), StorageError> {
        self.write(&RecordKind::Chat.key(company), chat).await
    }

    pub async fn load_chat<T: DeserializeOwned>(
        &self,
        company: &CompanyId,
    ) -> Result<Option<T>, StorageError> {
        self.read(&RecordKind::Chat.key(company)).await
    }

    // --- Whole-company operations ---

    /// Recomputes the profile counters from stored history and rules.
    pub async fn refresh_stats(&self, company: &CompanyId) -> Result<CompanyProfile, StorageError> {
        let mut profile = self
            .load_profile(company)
            .await?
            .ok_or_else(|| StorageError::CompanyNotFound(company.to_string()))?;
        profile.total_transactions_processed = self.history(company).await?.len() as u64;
        profile.total_rules_created = self.rules(company).await?.len() as u64;
        profile.updated_at = Utc::now();
        self.save_profile(&profile).await?;
        Ok(profile)
    }

    pub async fn export_company(&self, company: &CompanyId) -> Result<CompanyExport, StorageError> {
        let profile = self
            .load_profile(company)
            .await?
            .ok_or_else(|| StorageError::CompanyNotFound(company.to_string()))?;
        Ok(CompanyExport {
            profile,
            runs: self.runs(company).await?,
            history: self.history(company).await?,
            rules: self.rules(company).await?,
            exceptions: self.exceptions(company).await?,
            patterns: self.load_patterns(company).await?,
            chat: self.load_chat(company).await?,
        })
    }

    /// Writes an export back, overwriting whatever the company had.
    pub async fn import_company(&self, data: &CompanyExport) -> Result<(), StorageError> {
        let company = &data.profile.id;
        self.clear_company(company).await?;
        self.save_profile(&data.profile).await?;
        self.write(&RecordKind::Runs.key(company), &data.runs).await?;
        self.write(&RecordKind::History.key(company), &data.history).await?;
        self.save_rules(company, &data.rules).await?;
        self.save_exceptions(company, &data.exceptions).await?;
        if let Some(patterns) = &data.patterns {
            self.save_patterns(company, patterns).await?;
        }
        if let Some(chat) = &data.chat {
            self.save_chat(company, chat).await?;
        }
        tracing::info!(company = %company, rules = data.rules.len(), "imported company data");
        Ok(())
    }

    /// Removes every record of the company and drops it from its owner's index.
    pub async fn clear_company(&self, company: &CompanyId) -> Result<(), StorageError> {
        if let Some(profile) = self.load_profile(company).await? {
            let key = user_index_key(&profile.user_id);
            let mut index: Vec<CompanyId> = self.read(&key).await?.unwrap_or_default();
            index.retain(|id| id != company);
            self.write(&key, &index).await?;
        }
        for kind in RecordKind::ALL {
            self.store.remove(&kind.key(company)).await?;
        }
        tracing::debug!(company = %company, "cleared company data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::sqlite::SqliteStore;
    use chrono::NaiveDate;
    use saim_core::{
        AccountClass, BankTransaction, ChartOfAccount, ContactType, Contact, DateRange, Direction,
        Money, RuleCondition, RuleField, RuleOperator,
    };

    fn profile() -> CompanyProfile {
        let mut profile = CompanyProfile::new("user_1", "Acme Traders");
        profile.industry = "Retail".into();
        profile.statutory_compliances = vec!["GST".into()];
        for (code, name, class) in [
            ("1000", "Cash", AccountClass::Asset),
            ("4000", "Sales Revenue", AccountClass::Revenue),
            ("6100", "Office Supplies", AccountClass::Expense),
        ] {
            profile
                .chart_of_accounts
                .insert(ChartOfAccount::new(code, name, "General", class))
                .unwrap();
        }
        let mut vendor = Contact::new("Staples", ContactType::Vendor);
        vendor.email = Some("ap@staples.example".into());
        profile.contacts.push(vendor);
        profile.contacts.push(Contact::new("Jane Smith", ContactType::Employee));
        profile
    }

    fn rule(company: &CompanyId, name: &str) -> TransactionRule {
        TransactionRule::new(
            company.clone(),
            name,
            vec![
                RuleCondition::text(RuleField::Description, RuleOperator::Contains, "aws")
                    .unwrap(),
            ],
            "6400",
            "Software Subscriptions",
        )
        .unwrap()
    }

    fn hist(id: &str) -> HistoricalTransaction {
        HistoricalTransaction {
            transaction: BankTransaction::new(
                id,
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                "Staples order",
                Money::from_major(42),
                Direction::Debit,
            ),
            run_id: "run_1".into(),
            account_id: "6100".into(),
            account_name: "Office Supplies".into(),
            confidence: 0.8,
            was_exception: false,
            rule_applied: None,
        }
    }

    async fn profile_round_trip<S: KeyValueStore>(repo: CompanyRepository<S>) {
        let original = profile();
        repo.save_profile(&original).await.unwrap();
        let loaded = repo.load_profile(&original.id).await.unwrap().unwrap();

        assert_eq!(
            serde_json::to_string(&loaded.chart_of_accounts).unwrap(),
            serde_json::to_string(&original.chart_of_accounts).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&loaded.contacts).unwrap(),
            serde_json::to_string(&original.contacts).unwrap()
        );
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn profile_round_trip_in_memory() {
        profile_round_trip(CompanyRepository::new(MemoryStore::new())).await;
    }

    #[tokio::test]
    async fn profile_round_trip_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("saim.db")).await.unwrap();
        profile_round_trip(CompanyRepository::new(store)).await;
    }

    #[tokio::test]
    async fn user_index_lists_companies_once() {
        let repo = CompanyRepository::new(MemoryStore::new());
        let first = profile();
        let second = CompanyProfile::new("user_1", "Second Co");
        repo.save_profile(&first).await.unwrap();
        repo.save_profile(&first).await.unwrap();
        repo.save_profile(&second).await.unwrap();

        let names: Vec<_> = repo
            .companies_for_user("user_1")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.business_name)
            .collect();
        assert_eq!(names, vec!["Acme Traders", "Second Co"]);
        assert!(repo.companies_for_user("someone_else").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn runs_are_upserted_by_id() {
        let repo = CompanyRepository::new(MemoryStore::new());
        let company = CompanyId("c1".into());
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut run =
            ProcessingRun::start(company.clone(), "march.csv", DateRange::new(day, day).unwrap());
        repo.record_run(&run).await.unwrap();
        run.complete(10, 2, vec!["rule_1".into()]);
        repo.record_run(&run).await.unwrap();

        let runs = repo.runs(&company).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].transaction_count, 10);
    }

    #[tokio::test]
    async fn refresh_stats_counts_history_and_rules() {
        let repo = CompanyRepository::new(MemoryStore::new());
        let original = profile();
        let company = original.id.clone();
        repo.save_profile(&original).await.unwrap();
        repo.append_history(&company, &[hist("tx_1"), hist("tx_2")]).await.unwrap();
        assert_eq!(repo.append_history(&company, &[hist("tx_3")]).await.unwrap(), 3);
        repo.add_rule(&rule(&company, "AWS")).await.unwrap();

        let refreshed = repo.refresh_stats(&company).await.unwrap();
        assert_eq!(refreshed.total_transactions_processed, 3);
        assert_eq!(refreshed.total_rules_created, 1);

        let missing = repo.refresh_stats(&CompanyId("nope".into())).await;
        assert!(matches!(missing, Err(StorageError::CompanyNotFound(_))));
    }

    #[tokio::test]
    async fn export_then_import_into_another_store() {
        let source = CompanyRepository::new(MemoryStore::new());
        let original = profile();
        let company = original.id.clone();
        source.save_profile(&original).await.unwrap();
        source.append_history(&company, &[hist("tx_1")]).await.unwrap();
        source.add_rule(&rule(&company, "AWS")).await.unwrap();
        source.save_chat(&company, &vec!["hello"]).await.unwrap();
        let export = source.export_company(&company).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sqlite = SqliteStore::open(&dir.path().join("saim.db")).await.unwrap();
        let target = CompanyRepository::new(sqlite);

        target.import_company(&export).await.unwrap();

        assert_eq!(target.export_company(&company).await.unwrap(), export);
        let chat: Option<Vec<String>> = target.load_chat(&company).await.unwrap();
        assert_eq!(chat, Some(vec!["hello".to_string()]));
    }

    #[tokio::test]
    async fn clear_removes_records_and_index_entry() {
        let repo = CompanyRepository::new(MemoryStore::new());
        let original = profile();
        let company = original.id.clone();
        repo.save_profile(&original).await.unwrap();
        repo.add_rule(&rule(&company, "AWS")).await.unwrap();
        repo.save_patterns(&company, &PatternStore::default()).await.unwrap();

        repo.clear_company(&company).await.unwrap();
        assert!(repo.load_profile(&company).await.unwrap().is_none());
        assert!(repo.rules(&company).await.unwrap().is_empty());
        assert!(repo.load_patterns(&company).await.unwrap().is_none());
        assert!(repo.companies_for_user("user_1").await.unwrap().is_empty());
        assert!(repo
            .store()
            .keys_with_prefix(KEY_PREFIX)
            .await
            .unwrap()
            .iter()
            .all(|k| k.starts_with("saimjr:companies:")));
    }

    #[tokio::test]
    async fn corrupt_blob_is_reported_with_its_key() {
        let repo = CompanyRepository::new(MemoryStore::new());
        let company = CompanyId("c1".into());
        repo.store().set(&RecordKind::Rules.key(&company), "not json").await.unwrap();
        match repo.rules(&company).await {
            Err(StorageError::Corrupt { key, .. }) => assert_eq!(key, "saimjr:rules:c1"),
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }
}
