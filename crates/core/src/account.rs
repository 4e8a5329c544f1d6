use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountClass {
    #[serde(alias = "Assets")]
    Asset,
    #[serde(alias = "Liabilities")]
    Liability,
    Equity,
    #[serde(alias = "Income", alias = "Revenues")]
    Revenue,
    #[serde(alias = "Expenses")]
    Expense,
}

impl AccountClass {
    /// Conventional code band for generated charts.
    pub fn code_range(self) -> std::ops::RangeInclusive<u32> {
        match self {
            AccountClass::Asset => 1000..=1999,
            AccountClass::Liability => 2000..=2999,
            AccountClass::Equity => 3000..=3999,
            AccountClass::Revenue => 4000..=4999,
            AccountClass::Expense => 5000..=9999,
        }
    }

    pub fn statement(self) -> &'static str {
        match self {
            AccountClass::Asset | AccountClass::Liability | AccountClass::Equity => {
                "Balance Sheet"
            }
            AccountClass::Revenue | AccountClass::Expense => "Income Statement",
        }
    }
}

impl fmt::Display for AccountClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountClass::Asset => write!(f, "Asset"),
            AccountClass::Liability => write!(f, "Liability"),
            AccountClass::Equity => write!(f, "Equity"),
            AccountClass::Revenue => write!(f, "Revenue"),
            AccountClass::Expense => write!(f, "Expense"),
        }
    }
}

impl FromStr for AccountClass {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asset" | "assets" => Ok(AccountClass::Asset),
            "liability" | "liabilities" => Ok(AccountClass::Liability),
            "equity" => Ok(AccountClass::Equity),
            "revenue" | "revenues" | "income" => Ok(AccountClass::Revenue),
            "expense" | "expenses" => Ok(AccountClass::Expense),
            _ => Err(CoreError::UnknownAccountClass(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartOfAccount {
    pub code: String,
    pub name: String,
    pub category: String,
    pub class: AccountClass,
    pub statement: String,
}

impl ChartOfAccount {
    pub fn new(code: &str, name: &str, category: &str, class: AccountClass) -> Self {
        ChartOfAccount {
            code: code.to_string(),
            name: name.to_string(),
            category: category.to_string(),
            class,
            statement: class.statement().to_string(),
        }
    }
}

impl fmt::Display for ChartOfAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} ({})", self.code, self.name, self.class)
    }
}

/// A company's chart, kept in insertion order. Codes are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChartOfAccount>", into = "Vec<ChartOfAccount>")]
pub struct ChartOfAccounts(Vec<ChartOfAccount>);

impl TryFrom<Vec<ChartOfAccount>> for ChartOfAccounts {
    type Error = CoreError;

    fn try_from(accounts: Vec<ChartOfAccount>) -> Result<Self, Self::Error> {
        Self::from_accounts(accounts)
    }
}

impl From<ChartOfAccounts> for Vec<ChartOfAccount> {
    fn from(chart: ChartOfAccounts) -> Self {
        chart.0
    }
}

impl ChartOfAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_accounts(
        accounts: impl IntoIterator<Item = ChartOfAccount>,
    ) -> Result<Self, CoreError> {
        let mut chart = Self::new();
        for account in accounts {
            chart.insert(account)?;
        }
        Ok(chart)
    }

    pub fn insert(&mut self, account: ChartOfAccount) -> Result<(), CoreError> {
        if self.get(&account.code).is_some() {
            return Err(CoreError::DuplicateAccountCode(account.code));
        }
        self.0.push(account);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&ChartOfAccount> {
        self.0.iter().find(|a| a.code == code)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ChartOfAccount> {
        let needle = name.trim().to_lowercase();
        self.0.iter().find(|a| a.name.to_lowercase() == needle)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChartOfAccount> {
        self.0.iter()
    }

    pub fn first_n(&self, n: usize) -> &[ChartOfAccount] {
        &self.0[..n.min(self.0.len())]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[ChartOfAccount] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ChartOfAccounts {
    type Item = &'a ChartOfAccount;
    type IntoIter = std::slice::Iter<'a, ChartOfAccount>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_code_is_rejected() {
        let mut chart = ChartOfAccounts::new();
        chart
            .insert(ChartOfAccount::new("1000", "Cash", "Current Assets", AccountClass::Asset))
            .unwrap();
        let err = chart
            .insert(ChartOfAccount::new(
                "1000",
                "Petty Cash",
                "Current Assets",
                AccountClass::Asset,
            ))
            .unwrap_err();
        assert_eq!(err, CoreError::DuplicateAccountCode("1000".into()));
        assert_eq!(chart.len(), 1);
    }

    #[test]
    fn deserializing_rejects_duplicate_codes() {
        let json = r#"[
            {"code": "1000", "name": "Cash", "category": "Current Assets",
             "class": "Asset", "statement": "Balance Sheet"},
            {"code": "1000", "name": "Petty Cash", "category": "Current Assets",
             "class": "Asset", "statement": "Balance Sheet"}
        ]"#;
        let err = serde_json::from_str::<ChartOfAccounts>(json).unwrap_err();
        assert!(err.to_string().contains("Duplicate account code: 1000"));

        let chart = ChartOfAccounts::from_accounts([
            ChartOfAccount::new("1000", "Cash", "Current Assets", AccountClass::Asset),
            ChartOfAccount::new("4000", "Sales Revenue", "Revenue", AccountClass::Revenue),
        ])
        .unwrap();
        let json = serde_json::to_string(&chart).unwrap();
        assert!(json.starts_with('['));
        assert_eq!(serde_json::from_str::<ChartOfAccounts>(&json).unwrap(), chart);
    }

    #[test]
    fn insertion_order_is_kept() {
        let chart = ChartOfAccounts::from_accounts(vec![
            ChartOfAccount::new(
                "6000",
                "Rent Expense",
                "Operating Expenses",
                AccountClass::Expense,
            ),
            ChartOfAccount::new("1000", "Cash", "Current Assets", AccountClass::Asset),
        ])
        .unwrap();
        let codes: Vec<_> = chart.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["6000", "1000"]);
    }

    #[test]
    fn first_n_truncates_without_panicking() {
        let chart = ChartOfAccounts::from_accounts(vec![ChartOfAccount::new(
            "1000",
            "Cash",
            "Current Assets",
            AccountClass::Asset,
        )])
        .unwrap();
        assert_eq!(chart.first_n(6).len(), 1);
    }

    #[test]
    fn class_parses_plural_and_income_forms() {
        assert_eq!("Assets".parse::<AccountClass>().unwrap(), AccountClass::Asset);
        assert_eq!("income".parse::<AccountClass>().unwrap(), AccountClass::Revenue);
        assert_eq!("EXPENSES".parse::<AccountClass>().unwrap(), AccountClass::Expense);
        assert!("widgets".parse::<AccountClass>().is_err());
    }

    #[test]
    fn class_deserializes_plural_alias() {
        let json = r#"{"code":"1000","name":"Cash","category":"Current Assets",
            "class":"Assets","statement":"Balance Sheet"}"#;

        let account: ChartOfAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.class, AccountClass::Asset);
    }

    #[test]
    fn find_by_name_ignores_case() {
        let chart = ChartOfAccounts::from_accounts(vec![ChartOfAccount::new(
            "6400",
            "Software Subscriptions",
            "Operating Expenses",
            AccountClass::Expense,
        )])
        .unwrap();
        assert_eq!(chart.find_by_name("software subscriptions").unwrap().code, "6400");
    }
}
