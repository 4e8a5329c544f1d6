//! Chart of accounts generation from a company profile.
//!
//! [`TemplateChartGenerator`] builds a deterministic chart from a baseline
//! plus accounts driven by the profile's industry, company type, statutory
//! compliances and reporting framework. [`RemoteChartGenerator`] asks a
//! remote model for a chart and falls back to the template whenever the
//! reply cannot be turned into a valid chart.

use async_trait::async_trait;
use regex::Regex;
use saim_core::{AccountClass, ChartOfAccount, ChartOfAccounts, CompanyProfile, CoreError};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::reconnect::{send_with_reconnect, ReconnectPolicy};

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Chart request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Chart service returned status {0}")]
    Status(u16),
    #[error("Chart reply was not usable: {0}")]
    Malformed(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[async_trait]
pub trait ChartGenerator: Send + Sync {
    async fn generate(&self, profile: &CompanyProfile) -> Result<ChartOfAccounts, ChartError>;
}

// ── Template ──────────────────────────────────────────────────────────────────

type Seed = (&'static str, &'static str, &'static str, AccountClass);

use saim_core::AccountClass::{Asset, Equity, Expense, Liability, Revenue};

const BASELINE: &[Seed] = &[
    ("1000", "Cash in Hand", "Current Assets", Asset),
    ("1010", "Bank Account", "Current Assets", Asset),
    ("1100", "Accounts Receivable", "Current Assets", Asset),
    ("1200", "Prepaid Expenses", "Current Assets", Asset),
    ("1500", "Office Equipment", "Fixed Assets", Asset),
    ("1510", "Accumulated Depreciation", "Fixed Assets", Asset),
    ("2000", "Accounts Payable", "Current Liabilities", Liability),
    ("2100", "Accrued Expenses", "Current Liabilities", Liability),
    ("2200", "Short-term Loans", "Current Liabilities", Liability),
    ("2500", "Long-term Loans", "Non-current Liabilities", Liability),
    ("3900", "Retained Earnings", "Equity", Equity),
    ("4000", "Sales Revenue", "Operating Revenue", Revenue),
    ("4100", "Service Revenue", "Operating Revenue", Revenue),
    ("4900", "Interest Income", "Other Income", Revenue),
    ("5000", "Cost of Goods Sold", "Cost of Sales", Expense),
    ("6000", "Rent Expense", "Operating Expenses", Expense),
    ("6100", "Office Supplies", "Operating Expenses", Expense),
    ("6200", "Utilities", "Operating Expenses", Expense),
    ("6300", "Travel Expense", "Operating Expenses", Expense),
    ("6400", "Software Subscriptions", "Operating Expenses", Expense),
    ("6500", "Salaries and Wages", "Operating Expenses", Expense),
    ("6600", "Professional Fees", "Operating Expenses", Expense),
    ("6700", "Bank Charges", "Operating Expenses", Expense),
    ("6800", "Depreciation Expense", "Operating Expenses", Expense),
    ("6900", "Insurance Expense", "Operating Expenses", Expense),
    ("7000", "Marketing Expense", "Operating Expenses", Expense),
    ("9000", "Income Tax Expense", "Taxes", Expense),
];

const MANUFACTURING: &[Seed] = &[
    ("1300", "Raw Materials", "Inventory", Asset),
    ("1310", "Work in Progress", "Inventory", Asset),
    ("1320", "Finished Goods", "Inventory", Asset),
    ("4200", "Scrap Sales", "Operating Revenue", Revenue),
    ("5100", "Direct Labor", "Cost of Sales", Expense),
    ("5200", "Factory Overheads", "Cost of Sales", Expense),
    ("5300", "Power and Fuel", "Cost of Sales", Expense),
];

const TRADING: &[Seed] = &[
    ("1330", "Merchandise Inventory", "Inventory", Asset),
    ("4300", "Sales Returns", "Operating Revenue", Revenue),
    ("5400", "Freight Inward", "Cost of Sales", Expense),
    ("6350", "Freight Outward", "Operating Expenses", Expense),
];

const CONSTRUCTION: &[Seed] = &[
    ("1400", "Contract Work in Progress", "Current Assets", Asset),
    ("1410", "Retention Money Receivable", "Current Assets", Asset),
    ("5500", "Site Expenses", "Cost of Sales", Expense),
];

const TECHNOLOGY: &[Seed] = &[
    ("1150", "Unbilled Revenue", "Current Assets", Asset),
    ("1600", "Capitalized Development Costs", "Intangible Assets", Asset),
    ("2300", "Deferred Revenue", "Current Liabilities", Liability),
    ("6410", "Cloud Hosting", "Operating Expenses", Expense),
    ("6450", "Research and Development Expense", "Operating Expenses", Expense),
];

const RETAIL: &[Seed] = &[
    ("1020", "POS Clearing", "Current Assets", Asset),
    ("1030", "Payment Gateway Clearing", "Current Assets", Asset),
    ("2350", "Returns Reserve", "Current Liabilities", Liability),
    ("5600", "Packaging Materials", "Cost of Sales", Expense),
];

const CORPORATE: &[Seed] = &[
    ("2400", "Dividend Payable", "Current Liabilities", Liability),
    ("2600", "Deferred Tax Liability", "Non-current Liabilities", Liability),
    ("3000", "Share Capital", "Equity", Equity),
    ("3100", "Securities Premium", "Equity", Equity),
    ("3200", "Reserves and Surplus", "Equity", Equity),
];

const PARTNERSHIP: &[Seed] = &[
    ("3000", "Partners' Capital", "Equity", Equity),
    ("3010", "Partners' Current Accounts", "Equity", Equity),
    ("3050", "Partners' Drawings", "Equity", Equity),
    ("6950", "Interest on Partners' Capital", "Finance Costs", Expense),
];

const PROPRIETORSHIP: &[Seed] = &[
    ("3000", "Owner's Capital", "Equity", Equity),
    ("3050", "Owner's Drawings", "Equity", Equity),
];

const GST: &[Seed] = &[
    ("1700", "CGST Input", "Tax Assets", Asset),
    ("1710", "SGST Input", "Tax Assets", Asset),
    ("1720", "IGST Input", "Tax Assets", Asset),
    ("1730", "GST Refund Receivable", "Tax Assets", Asset),
    ("2700", "CGST Output", "Duties and Taxes", Liability),
    ("2710", "SGST Output", "Duties and Taxes", Liability),
    ("2720", "IGST Output", "Duties and Taxes", Liability),
    ("2730", "GST Payable - Net", "Duties and Taxes", Liability),
    ("6960", "Ineligible Input Tax Credit Expense", "Taxes", Expense),
];

const TDS: &[Seed] = &[
    ("1740", "Advance Tax Paid", "Tax Assets", Asset),
    ("2740", "TDS Payable", "Duties and Taxes", Liability),
];

const PF: &[Seed] = &[
    ("2750", "PF Payable", "Payroll Liabilities", Liability),
    ("2755", "EPS Payable", "Payroll Liabilities", Liability),
];

const ESI: &[Seed] = &[("2760", "ESI Payable", "Payroll Liabilities", Liability)];

const PROFESSIONAL_TAX: &[Seed] = &[(
    "2770",
    "Professional Tax Payable",
    "Payroll Liabilities",
    Liability,
)];

const SALES_TAX: &[Seed] = &[("2780", "Sales Tax Payable", "Duties and Taxes", Liability)];

const LEASE_ACCOUNTING: &[Seed] = &[
    ("1800", "Right-of-Use Asset", "Non-current Assets", Asset),
    ("2800", "Lease Liability", "Non-current Liabilities", Liability),
    ("3300", "OCI Reserve", "Equity", Equity),
    ("6850", "Depreciation - ROU Asset", "Operating Expenses", Expense),
];

const LOCAL_GAAP: &[Seed] = &[(
    "1160",
    "Provision for Doubtful Debts",
    "Current Assets",
    Asset,
)];

fn mentions(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == word)
}

/// Deterministic chart built from the profile alone.
#[derive(Debug, Default, Clone)]
pub struct TemplateChartGenerator;

impl TemplateChartGenerator {
    pub fn new() -> Self {
        Self
    }

    fn seeds(&self, profile: &CompanyProfile) -> Vec<&'static [Seed]> {
        let mut groups = vec![BASELINE];

        let business =
            format!("{} {}", profile.nature_of_business, profile.industry).to_lowercase();
        if mentions(&business, &["manufactur", "factory", "production"]) {
            groups.push(MANUFACTURING);
        }
        if mentions(&business, &["trading", "wholesale", "distribution"]) {
            groups.push(TRADING);
        }
        if mentions(&business, &["construction", "building", "contractor"]) {
            groups.push(CONSTRUCTION);
        }
        if mentions(&business, &["software", "saas", "tech"]) || has_word(&business, "it") {
            groups.push(TECHNOLOGY);
        }
        if mentions(&business, &["retail", "ecommerce", "e-commerce", "shop", "store"]) {
            groups.push(RETAIL);
        }

        let company_type = profile.company_type.to_lowercase();
        if mentions(&company_type, &["llp", "partnership"]) {
            groups.push(PARTNERSHIP);
        } else if mentions(&company_type, &["limited", "ltd", "corporation", "inc", "llc", "plc"]) {
            groups.push(CORPORATE);
        } else {
            groups.push(PROPRIETORSHIP);
        }

        if profile.has_compliance("GST") {
            groups.push(GST);
        }
        if profile.has_compliance("TDS") {
            groups.push(TDS);
        }
        if profile.has_compliance("PF") {
            groups.push(PF);
        }
        if profile.has_compliance("ESI") {
            groups.push(ESI);
        }
        if profile.has_compliance("Professional Tax") {
            groups.push(PROFESSIONAL_TAX);
        }
        if profile.has_compliance("VAT") || profile.has_compliance("Sales Tax") {
            groups.push(SALES_TAX);
        }

        let framework = profile.reporting_framework.to_lowercase();
        if mentions(&framework, &["ifrs", "ind as"]) {
            groups.push(LEASE_ACCOUNTING);
        } else {
            groups.push(LOCAL_GAAP);
        }

        groups
    }

    /// Builds the chart synchronously; codes come out sorted.
    pub fn build(&self, profile: &CompanyProfile) -> Result<ChartOfAccounts, CoreError> {
        let mut accounts: Vec<ChartOfAccount> = Vec::new();
        for group in self.seeds(profile) {
            for (code, name, category, class) in group {
                if accounts.iter().all(|a| a.code != *code) {
                    accounts.push(ChartOfAccount::new(code, name, category, *class));
                }
            }
        }
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        ChartOfAccounts::from_accounts(accounts)
    }
}

#[async_trait]
impl ChartGenerator for TemplateChartGenerator {
    async fn generate(&self, profile: &CompanyProfile) -> Result<ChartOfAccounts, ChartError> {
        let chart = self.build(profile)?;
        info!(accounts = chart.len(), "chart of accounts generated from template");
        Ok(chart)
    }
}

// ── Remote ────────────────────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "You are an expert chartered accountant. \
    Return ONLY a valid JSON array of chart of accounts objects.";

#[derive(Debug, Deserialize)]
struct RemoteReply {
    response: String,
}

#[derive(Debug, Deserialize)]
struct RemoteAccount {
    code: serde_json::Value,
    name: String,
    #[serde(default)]
    category: String,
    class: String,
}

fn json_array() -> Option<&'static Regex> {
    static ARRAY: OnceLock<Option<Regex>> = OnceLock::new();
    ARRAY.get_or_init(|| Regex::new(r"\[[\s\S]*\]").ok()).as_ref()
}

pub fn build_prompt(profile: &CompanyProfile) -> String {
    let profile_json = serde_json::json!({
        "companyName": profile.business_name,
        "natureOfBusiness": profile.nature_of_business,
        "industry": profile.industry,
        "location": profile.location,
        "companyType": profile.company_type,
        "reportingFramework": profile.reporting_framework,
        "statutoryCompliances": profile.statutory_compliances,
    });
    format!(
        "Generate a company-specific chart of accounts for this profile:\n{profile_json}\n\n\
         Return ONLY a JSON array of account objects with fields code, name, category and class \
         (one of Assets, Liabilities, Equity, Revenue, Expenses). Codes must be unique: \
         1000-1999 assets, 2000-2999 liabilities, 3000-3999 equity, 4000-4999 revenue, \
         5000-9999 expenses."
    )
}

/// Pulls the first JSON array out of a model reply and turns it into a chart.
pub fn parse_chart_reply(reply: &str) -> Result<ChartOfAccounts, ChartError> {
    let raw = json_array()
        .and_then(|re| re.find(reply))
        .ok_or_else(|| ChartError::Malformed("no JSON array in reply".into()))?;
    let accounts: Vec<RemoteAccount> = serde_json::from_str(raw.as_str())
        .map_err(|e| ChartError::Malformed(e.to_string()))?;
    if accounts.is_empty() {
        return Err(ChartError::Malformed("empty account list".into()));
    }

    let mut chart = ChartOfAccounts::new();
    for account in accounts {
        let code = match &account.code {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => return Err(ChartError::Malformed(format!("bad account code {other}"))),
        };
        if code.is_empty() || account.name.trim().is_empty() {
            return Err(ChartError::Malformed("account without code or name".into()));
        }
        let class = AccountClass::from_str(&account.class)?;
        chart.insert(ChartOfAccount::new(
            &code,
            account.name.trim(),
            account.category.trim(),
            class,
        ))?;
    }
    Ok(chart)
}

/// Asks a remote model for a chart, falling back to the template.
pub struct RemoteChartGenerator {
    client: reqwest::Client,
    endpoint: String,
    policy: ReconnectPolicy,
    fallback: TemplateChartGenerator,
}

impl RemoteChartGenerator {
    pub fn new(endpoint: &str, policy: ReconnectPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            policy,
            fallback: TemplateChartGenerator::new(),
        }
    }

    async fn request(&self, profile: &CompanyProfile) -> Result<ChartOfAccounts, ChartError> {
        let body = serde_json::json!({
            "message": build_prompt(profile),
            "systemPrompt": SYSTEM_PROMPT,
        });
        let builder = self.client.post(&self.endpoint).json(&body);
        let response = send_with_reconnect(builder, &self.policy).await?;
        if !response.status().is_success() {
            return Err(ChartError::Status(response.status().as_u16()));
        }
        let reply: RemoteReply = response.json().await?;
        parse_chart_reply(&reply.response)
    }
}

#[async_trait]
impl ChartGenerator for RemoteChartGenerator {
    async fn generate(&self, profile: &CompanyProfile) -> Result<ChartOfAccounts, ChartError> {
        match self.request(profile).await {
            Ok(chart) => {
                info!(accounts = chart.len(), "chart of accounts generated remotely");
                Ok(chart)
            }
            Err(err) => {
                warn!(error = %err, "remote chart generation failed, using template");
                self.fallback.generate(profile).await
            }
        }
    }
}
