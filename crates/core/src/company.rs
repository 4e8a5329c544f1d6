use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::ChartOfAccounts;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub String);

impl CompanyId {
    pub fn generate() -> Self {
        CompanyId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactType {
    Client,
    Vendor,
    Employee,
    Other,
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactType::Client => write!(f, "Client"),
            ContactType::Vendor => write!(f, "Vendor"),
            ContactType::Employee => write!(f, "Employee"),
            ContactType::Other => write!(f, "Other"),
        }
    }
}

impl FromStr for ContactType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "client" | "customer" => Ok(ContactType::Client),
            "vendor" | "supplier" => Ok(ContactType::Vendor),
            "employee" => Ok(ContactType::Employee),
            "other" | "" => Ok(ContactType::Other),
            _ => Err(CoreError::UnknownContactType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub contact_type: ContactType,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Contact {
    pub fn new(name: &str, contact_type: ContactType) -> Self {
        Contact {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            contact_type,
            email: None,
            phone: None,
            address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: CompanyId,
    pub user_id: String,
    pub business_name: String,
    pub nature_of_business: String,
    pub industry: String,
    pub location: String,
    pub company_type: String,
    pub reporting_framework: String,
    pub statutory_compliances: Vec<String>,
    pub chart_of_accounts: ChartOfAccounts,
    pub contacts: Vec<Contact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_setup_complete: bool,
    pub total_transactions_processed: u64,
    pub total_rules_created: u64,
}

impl CompanyProfile {
    pub fn new(user_id: &str, business_name: &str) -> Self {
        let now = Utc::now();
        CompanyProfile {
            id: CompanyId::generate(),
            user_id: user_id.to_string(),
            business_name: business_name.to_string(),
            nature_of_business: String::new(),
            industry: String::new(),
            location: String::new(),
            company_type: String::new(),
            reporting_framework: String::new(),
            statutory_compliances: Vec::new(),
            chart_of_accounts: ChartOfAccounts::new(),
            contacts: Vec::new(),
            created_at: now,
            updated_at: now,
            is_setup_complete: false,
            total_transactions_processed: 0,
            total_rules_created: 0,
        }
    }

    pub fn has_compliance(&self, name: &str) -> bool {
        self.statutory_compliances
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Adds contacts whose names are not already present (case-insensitive).
    /// Returns how many were added.
    pub fn merge_contacts(&mut self, contacts: impl IntoIterator<Item = Contact>) -> usize {
        let mut added = 0;
        for contact in contacts {
            let exists = self
                .contacts
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&contact.name));
            if !exists {
                self.contacts.push(contact);
                added += 1;
            }
        }
        if added > 0 {
            self.updated_at = Utc::now();
        }
        added
    }

    pub fn find_contact(&self, name: &str) -> Option<&Contact> {
        self.contacts
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }
}
