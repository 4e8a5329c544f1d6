//! Checks and corrects the answers a user gives during company setup.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::reconnect::{send_with_reconnect, ReconnectPolicy};

pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;
const MAX_NAME_LEN: usize = 100;

const MISSPELLINGS: &[(&str, &str)] = &[
    ("expences", "expenses"),
    ("recievable", "receivable"),
    ("payabel", "payable"),
    ("depriciation", "depreciation"),
    ("assests", "assets"),
    ("liabilites", "liabilities"),
    ("reveue", "revenue"),
    ("inventry", "inventory"),
    ("seperate", "separate"),
    ("occured", "occurred"),
    ("begining", "beginning"),
    ("recieve", "receive"),
    ("consultancey", "consultancy"),
    ("technolgy", "technology"),
    ("manufacturng", "manufacturing"),
    ("healthcre", "healthcare"),
    ("servcies", "services"),
    ("privte", "private"),
    ("limted", "limited"),
];

const BUSINESS_TYPES: &[&str] = &[
    "consulting",
    "retail",
    "manufacturing",
    "technology",
    "healthcare",
    "finance",
    "education",
    "services",
    "trading",
    "construction",
    "software",
];

const SECTORS: &[&str] = &[
    "technology",
    "healthcare",
    "finance",
    "retail",
    "manufacturing",
    "consulting",
    "education",
    "government",
    "construction",
    "hospitality",
];

const COMPANY_TYPES: &[&str] = &[
    "private limited",
    "public limited",
    "llp",
    "llc",
    "partnership",
    "proprietorship",
    "sole proprietorship",
    "corporation",
    "nonprofit",
];

const FRAMEWORKS: &[&str] = &["ind as", "ifrs", "us gaap", "gaap", "frs 102", "aspe"];

const COMPLIANCE_ACRONYMS: &[&str] = &["GST", "TDS", "PF", "ESI", "VAT", "PAYE", "EPS"];

/// A question asked while setting up a company profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileField {
    #[serde(rename = "companyName")]
    BusinessName,
    #[serde(rename = "businessNature")]
    NatureOfBusiness,
    #[serde(rename = "industrySector")]
    Industry,
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "companyType")]
    CompanyType,
    #[serde(rename = "reportingFramework")]
    ReportingFramework,
    #[serde(rename = "statutoryCompliances")]
    StatutoryCompliances,
}

impl ProfileField {
    pub const ALL: [ProfileField; 7] = [
        ProfileField::BusinessName,
        ProfileField::NatureOfBusiness,
        ProfileField::Industry,
        ProfileField::Location,
        ProfileField::CompanyType,
        ProfileField::ReportingFramework,
        ProfileField::StatutoryCompliances,
    ];
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProfileField::BusinessName => "business name",
            ProfileField::NatureOfBusiness => "nature of business",
            ProfileField::Industry => "industry",
            ProfileField::Location => "location",
            ProfileField::CompanyType => "company type",
            ProfileField::ReportingFramework => "reporting framework",
            ProfileField::StatutoryCompliances => "statutory compliances",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub field_name: ProfileField,
    pub user_input: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl ValidationRequest {
    pub fn new(field_name: ProfileField, user_input: &str) -> Self {
        Self {
            field_name,
            user_input: user_input.to_string(),
            context: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    Spelling,
    LengthAdjustment,
    Whitespace,
    Formatting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    #[serde(rename = "type")]
    pub kind: CorrectionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f32,
    pub corrected_value: String,
    #[serde(default)]
    pub corrections_made: Vec<Correction>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default)]
    pub clarification_options: Vec<String>,
}

impl ValidationResult {
    /// The result used whenever a validator cannot answer: the input is
    /// taken as typed.
    pub fn accept(input: &str) -> Self {
        Self {
            is_valid: true,
            confidence: 0.7,
            corrected_value: input.trim().to_string(),
            corrections_made: Vec::new(),
            suggestions: vec!["Input accepted".to_string()],
            requires_clarification: false,
            clarification_options: Vec::new(),
        }
    }

    /// The value to store: the corrected value unless it came back empty.
    pub fn value_or<'a>(&'a self, input: &'a str) -> &'a str {
        let corrected = self.corrected_value.trim();
        if corrected.is_empty() {
            input.trim()
        } else {
            corrected
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Validation service returned status {0}")]
    Status(u16),
    #[error("Validation timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait FieldValidator: Send + Sync {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ValidationError>;
}

// ── Rule-based validator (always available) ───────────────────────────────────

fn misspelling_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        MISSPELLINGS
            .iter()
            .filter_map(|(wrong, right)| {
                Regex::new(&format!(r"(?i)\b{wrong}\b"))
                    .ok()
                    .map(|re| (re, *right))
            })
            .collect()
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_any(input: &str, words: &[&str]) -> bool {
    let lower = input.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

/// Dictionary- and keyword-driven validation with no network access.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedValidator;

impl RuleBasedValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, request: &ValidationRequest) -> ValidationResult {
        let input = request.user_input.as_str();
        let mut corrections = Vec::new();
        let mut suggestions = Vec::new();

        let mut value = collapse_whitespace(input);
        if value != input {
            corrections.push(Correction {
                original: input.to_string(),
                corrected: value.clone(),
                kind: CorrectionKind::Whitespace,
            });
        }

        if value.is_empty() {
            return ValidationResult {
                is_valid: false,
                confidence: 0.3,
                corrected_value: String::new(),
                corrections_made: corrections,
                suggestions,
                requires_clarification: true,
                clarification_options: vec![format!("Please provide your {}", request.field_name)],
            };
        }

        for (re, right) in misspelling_patterns() {
            if re.is_match(&value) {
                let fixed = re.replace_all(&value, *right).into_owned();
                corrections.push(Correction {
                    original: value.clone(),
                    corrected: fixed.clone(),
                    kind: CorrectionKind::Spelling,
                });
                suggestions.push(format!("Corrected spelling to '{right}'"));
                value = fixed;
            }
        }

        let mut is_valid = true;
        let mut clarification_options = Vec::new();

        match request.field_name {
            ProfileField::BusinessName => {
                if value.chars().count() < 2 {
                    is_valid = false;
                    clarification_options.push("Please provide a longer company name".to_string());
                } else if value.chars().count() > MAX_NAME_LEN {
                    let truncated: String = value.chars().take(MAX_NAME_LEN).collect();
                    let truncated = truncated.trim_end().to_string();
                    corrections.push(Correction {
                        original: value.clone(),
                        corrected: truncated.clone(),
                        kind: CorrectionKind::LengthAdjustment,
                    });
                    value = truncated;
                } else {
                    suggestions.push("Company name looks good!".to_string());
                }
            }
            ProfileField::NatureOfBusiness => suggestions.push(
                if contains_any(&value, BUSINESS_TYPES) {
                    "Business type recognized"
                } else {
                    "Unique business type noted"
                }
                .to_string(),
            ),
            ProfileField::Industry => suggestions.push(
                if contains_any(&value, SECTORS) {
                    "Industry sector recognized"
                } else {
                    "Industry sector noted"
                }
                .to_string(),
            ),
            ProfileField::Location => {}
            ProfileField::CompanyType => {
                if !contains_any(&value, COMPANY_TYPES) {
                    suggestions.push(format!(
                        "Unrecognised company type; common types are {}",
                        COMPANY_TYPES.join(", ")
                    ));
                }
            }
            ProfileField::ReportingFramework => {
                if !contains_any(&value, FRAMEWORKS) {
                    suggestions.push("Reporting framework noted".to_string());
                }
            }
            ProfileField::StatutoryCompliances => {
                let formatted = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        COMPLIANCE_ACRONYMS
                            .iter()
                            .find(|a| a.eq_ignore_ascii_case(s))
                            .map(|a| a.to_string())
                            .unwrap_or_else(|| s.to_string())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                if formatted != value {
                    corrections.push(Correction {
                        original: value.clone(),
                        corrected: formatted.clone(),
                        kind: CorrectionKind::Formatting,
                    });
                    value = formatted;
                }
            }
        }

        let confidence = if !is_valid {
            0.3
        } else if corrections.is_empty() {
            0.95
        } else {
            0.8
        };

        ValidationResult {
            is_valid,
            confidence,
            corrected_value: value,
            corrections_made: corrections,
            suggestions,
            requires_clarification: !is_valid,
            clarification_options,
        }
    }
}

#[async_trait]
impl FieldValidator for RuleBasedValidator {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ValidationError> {
        Ok(self.check(request))
    }
}

// ── HTTP validator ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ValidationEnvelope {
    validation_result: ValidationResult,
}

/// Posts each request to a remote validation endpoint.
pub struct HttpValidator {
    client: reqwest::Client,
    endpoint: String,
    policy: ReconnectPolicy,
}

impl HttpValidator {
    pub fn new(endpoint: &str, policy: ReconnectPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            policy,
        }
    }
}

#[async_trait]
impl FieldValidator for HttpValidator {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ValidationError> {
        let builder = self.client.post(&self.endpoint).json(request);
        let response = send_with_reconnect(builder, &self.policy).await?;
        if !response.status().is_success() {
            return Err(ValidationError::Status(response.status().as_u16()));
        }
        let envelope: ValidationEnvelope = response.json().await?;
        Ok(envelope.validation_result)
    }
}

/// Runs `validator` under `timeout`; any failure yields an accepting result.
pub async fn validate_or_accept(
    validator: &dyn FieldValidator,
    request: &ValidationRequest,
    timeout: Duration,
) -> ValidationResult {
    let outcome = match tokio::time::timeout(timeout, validator.validate(request)).await {
        Ok(result) => result,
        Err(_) => Err(ValidationError::Timeout(timeout)),
    };
    match outcome {
        Ok(result) => {
            debug!(field = %request.field_name, valid = result.is_valid, "validated");
            result
        }
        Err(err) => {
            warn!(
                field = %request.field_name,
                error = %err,
                "validation unavailable, accepting input"
            );
            ValidationResult::accept(&request.user_input)
        }
    }
}
