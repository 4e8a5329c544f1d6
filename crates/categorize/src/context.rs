//! Keyword heuristics that guess who a counterparty is to the business.
//!
//! Everything here is a pure function of the transaction. Rules are checked
//! in a fixed order and the first hit wins; when nothing matches the caller
//! still gets a generic best-effort answer.

use saim_core::{BankTransaction, Direction, Money};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const UNKNOWN_CONTACT: &str = "Unknown Contact";

const BUSINESS_TERMS: &[&str] = &[
    "payment",
    "invoice",
    "service",
    "product",
    "consulting",
    "maintenance",
    "supply",
    "rental",
    "subscription",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessNature {
    SupplierVendor,
    CustomerPayment,
    Employee,
    PropertyLandlord,
    FinancialInstitution,
    GovernmentEntity,
    BusinessPartner,
}

impl BusinessNature {
    pub fn is_vendor(self) -> bool {
        matches!(self, BusinessNature::SupplierVendor)
    }

    pub fn is_customer(self) -> bool {
        matches!(self, BusinessNature::CustomerPayment)
    }
}

impl fmt::Display for BusinessNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusinessNature::SupplierVendor => "Supplier/Vendor",
            BusinessNature::CustomerPayment => "Customer Payment",
            BusinessNature::Employee => "Employee",
            BusinessNature::PropertyLandlord => "Property/Landlord",
            BusinessNature::FinancialInstitution => "Financial Institution",
            BusinessNature::GovernmentEntity => "Government Entity",
            BusinessNature::BusinessPartner => "Business Partner",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipType {
    Vendor,
    Customer,
    Employment,
    Business,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipType::Vendor => write!(f, "Vendor Relationship"),
            RelationshipType::Customer => write!(f, "Customer Relationship"),
            RelationshipType::Employment => write!(f, "Employment Relationship"),
            RelationshipType::Business => write!(f, "Business Relationship"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Industry {
    Technology,
    Construction,
    Healthcare,
    LegalServices,
    GeneralBusiness,
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Industry::Technology => write!(f, "Technology"),
            Industry::Construction => write!(f, "Construction"),
            Industry::Healthcare => write!(f, "Healthcare"),
            Industry::LegalServices => write!(f, "Legal Services"),
            Industry::GeneralBusiness => write!(f, "General Business"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AmountRange {
    Micro,
    Small,
    Medium,
    Large,
    Enterprise,
}

impl fmt::Display for AmountRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountRange::Micro => write!(f, "Micro ($0-$100)"),
            AmountRange::Small => write!(f, "Small ($100-$1K)"),
            AmountRange::Medium => write!(f, "Medium ($1K-$10K)"),
            AmountRange::Large => write!(f, "Large ($10K-$100K)"),
            AmountRange::Enterprise => write!(f, "Enterprise ($100K+)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessContext {
    pub contact_name: String,
    pub business_nature: BusinessNature,
    pub relationship_type: RelationshipType,
    pub industry: Industry,
    pub typical_amount_range: AmountRange,
    pub business_keywords: Vec<String>,
    pub confidence_score: f32,
}

pub fn infer_business_nature(description: &str, direction: Direction) -> BusinessNature {
    let desc = description.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| desc.contains(w));

    if has(&["payment", "invoice", "bill"]) {
        match direction {
            Direction::Debit => BusinessNature::SupplierVendor,
            Direction::Credit => BusinessNature::CustomerPayment,
        }
    } else if has(&["salary", "wage", "payroll"]) {
        BusinessNature::Employee
    } else if has(&["rent", "lease"]) {
        BusinessNature::PropertyLandlord
    } else if has(&["loan", "interest"]) {
        BusinessNature::FinancialInstitution
    } else if has(&["tax", "government"]) {
        BusinessNature::GovernmentEntity
    } else {
        BusinessNature::BusinessPartner
    }
}

pub fn infer_relationship_type(nature: BusinessNature) -> RelationshipType {
    match nature {
        BusinessNature::SupplierVendor => RelationshipType::Vendor,
        BusinessNature::CustomerPayment => RelationshipType::Customer,
        BusinessNature::Employee => RelationshipType::Employment,
        _ => RelationshipType::Business,
    }
}

pub fn infer_industry(description: &str) -> Industry {
    let desc = description.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| desc.contains(w));

    let it_word = desc
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == "it");

    if has(&["tech", "software"]) || it_word {
        Industry::Technology
    } else if has(&["construction", "building"]) {
        Industry::Construction
    } else if has(&["medical", "health"]) {
        Industry::Healthcare
    } else if has(&["legal", "law"]) {
        Industry::LegalServices
    } else {
        Industry::GeneralBusiness
    }
}

pub fn calculate_amount_range(amount: Money) -> AmountRange {
    let amount = amount.abs();
    if amount < Money::from_major(100) {
        AmountRange::Micro
    } else if amount < Money::from_major(1_000) {
        AmountRange::Small
    } else if amount < Money::from_major(10_000) {
        AmountRange::Medium
    } else if amount < Money::from_major(100_000) {
        AmountRange::Large
    } else {
        AmountRange::Enterprise
    }
}

pub fn extract_business_keywords(description: &str) -> Vec<String> {
    let desc = description.to_lowercase();
    BUSINESS_TERMS
        .iter()
        .filter(|t| desc.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

/// The explicit contact, else the first two words of the description.
pub fn contact_key(tx: &BankTransaction) -> String {
    if let Some(contact) = tx.contact.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return contact.to_string();
    }
    let words: Vec<&str> = tx.description.split_whitespace().take(2).collect();
    if words.is_empty() {
        UNKNOWN_CONTACT.to_string()
    } else {
        words.join(" ")
    }
}

fn context_confidence(tx: &BankTransaction) -> f32 {
    let mut confidence: f32 = 0.5;
    if tx.description.chars().count() > 20 {
        confidence += 0.2;
    }
    let known_contact = tx
        .contact
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty() && c != UNKNOWN_CONTACT);
    if known_contact {
        confidence += 0.2;
    }
    if tx.amount > Money::zero() {
        confidence += 0.1;
    }
    confidence.min(0.95)
}

pub fn classify(tx: &BankTransaction) -> BusinessContext {
    let business_nature = infer_business_nature(&tx.description, tx.direction);
    BusinessContext {
        contact_name: contact_key(tx),
        business_nature,
        relationship_type: infer_relationship_type(business_nature),
        industry: infer_industry(&tx.description),
        typical_amount_range: calculate_amount_range(tx.amount),
        business_keywords: extract_business_keywords(&tx.description),
        confidence_score: context_confidence(tx),
    }
}

/// Remembers the first context inferred for each contact.
#[derive(Debug, Default)]
pub struct ContextCache {
    by_contact: HashMap<String, BusinessContext>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_classify(&mut self, tx: &BankTransaction) -> BusinessContext {
        let key = contact_key(tx).to_lowercase();
        self.by_contact
            .entry(key)
            .or_insert_with(|| classify(tx))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.by_contact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_contact.is_empty()
    }
}
