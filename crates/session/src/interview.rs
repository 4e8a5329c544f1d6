//! The company-setup question sequence.

use saim_assistant::{
    validate_or_accept, CorrectionKind, FieldValidator, ProfileField, ValidationRequest,
    ValidationResult,
};
use saim_core::CompanyProfile;
use std::time::Duration;

pub fn question(field: ProfileField) -> &'static str {
    match field {
        ProfileField::BusinessName => {
            "Hello! I'm S(ai)m Jr. Let's set up your company profile. What's the name of your business?"
        }
        ProfileField::NatureOfBusiness => {
            "Great! What is the nature of your business? (e.g., Consulting, Retail, Manufacturing)"
        }
        ProfileField::Industry => {
            "Which industry sector best describes your business? (e.g., Technology, Healthcare, Finance)"
        }
        ProfileField::Location => "Where is your business located? (City, State, Country)",
        ProfileField::CompanyType => {
            "What type of company is it? (e.g., Private Limited, Partnership, Proprietorship)"
        }
        ProfileField::ReportingFramework => {
            "Which Financial Reporting Framework do you use? (e.g., IFRS, US GAAP, Local GAAP)"
        }
        ProfileField::StatutoryCompliances => {
            "What are your statutory compliances? (e.g., GST, VAT, Sales Tax - separate multiple with commas)"
        }
    }
}

fn kind_label(kind: CorrectionKind) -> &'static str {
    match kind {
        CorrectionKind::Spelling => "spelling",
        CorrectionKind::LengthAdjustment => "length",
        CorrectionKind::Whitespace => "whitespace",
        CorrectionKind::Formatting => "formatting",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterviewReply {
    /// The answer was stored; ask the next question.
    Next { acknowledgement: String, question: &'static str },
    /// The validator changed the answer; the user picks which to keep.
    OfferCorrection { message: String, original: String, corrected: String },
    /// The answer was rejected; the same question stays open.
    Clarify(String),
    Complete { acknowledgement: String, profile: CompanyProfile },
}

#[derive(Debug, Clone)]
struct PendingCorrection {
    original: String,
    corrected: String,
}

/// Walks [`ProfileField::ALL`] in order, filling a draft profile.
#[derive(Debug, Clone)]
pub struct ProfileInterview {
    draft: CompanyProfile,
    index: usize,
    pending: Option<PendingCorrection>,
}

impl ProfileInterview {
    pub fn new(user_id: &str) -> Self {
        Self {
            draft: CompanyProfile::new(user_id, ""),
            index: 0,
            pending: None,
        }
    }

    pub fn current_field(&self) -> Option<ProfileField> {
        ProfileField::ALL.get(self.index).copied()
    }

    pub fn current_question(&self) -> Option<&'static str> {
        self.current_field().map(question)
    }

    pub fn awaiting_correction(&self) -> bool {
        self.pending.is_some()
    }

    pub fn draft(&self) -> &CompanyProfile {
        &self.draft
    }

    pub async fn answer(
        &mut self,
        validator: &dyn FieldValidator,
        timeout: Duration,
        input: &str,
    ) -> InterviewReply {
        let Some(field) = self.current_field() else {
            return InterviewReply::Clarify("Company setup is already complete.".to_string());
        };
        if self.pending.is_some() {
            return InterviewReply::Clarify(
                "Please choose whether to use the suggested correction or keep your answer."
                    .to_string(),
            );
        }

        let mut request = ValidationRequest::new(field, input);
        request.context = Some(format!("company_setup question {}", self.index + 1));
        let result = validate_or_accept(validator, &request, timeout).await;
        self.handle_result(field, input, result)
    }

    fn handle_result(
        &mut self,
        field: ProfileField,
        input: &str,
        result: ValidationResult,
    ) -> InterviewReply {
        if result.requires_clarification || !result.is_valid {
            let options = if result.clarification_options.is_empty() {
                format!("a valid {field}")
            } else {
                result.clarification_options.join(" or ")
            };
            return InterviewReply::Clarify(format!(
                "I need clarification. Did you mean: {options}? Please re-enter with the correct option."
            ));
        }

        let meaningful: Vec<_> = result
            .corrections_made
            .iter()
            .filter(|c| c.kind != CorrectionKind::Whitespace)
            .collect();
        let corrected = result.value_or(input).to_string();
        if !meaningful.is_empty() {
            let original = input.split_whitespace().collect::<Vec<_>>().join(" ");
            let listed = meaningful
                .iter()
                .map(|c| format!("{} → {} ({})", c.original, c.corrected, kind_label(c.kind)))
                .collect::<Vec<_>>()
                .join(", ");
            self.pending = Some(PendingCorrection {
                original: original.clone(),
                corrected: corrected.clone(),
            });
            return InterviewReply::OfferCorrection {
                message: format!(
                    "I have suggestions: {listed}. Would you like to use \"{corrected}\" or keep \"{original}\"?"
                ),
                original,
                corrected,
            };
        }

        let acknowledgement = if !result.suggestions.is_empty() {
            format!("\"{corrected}\" looks good! Suggestions: {}", result.suggestions.join(", "))
        } else if result.confidence > 0.8 {
            format!("Perfect! \"{corrected}\" looks correct.")
        } else {
            format!("Accepted \"{corrected}\"")
        };
        self.store(field, &corrected, acknowledgement)
    }

    /// Settles an offered correction. Returns `None` when none was offered.
    pub fn resolve_correction(&mut self, use_corrected: bool) -> Option<InterviewReply> {
        let field = self.current_field()?;
        let pending = self.pending.take()?;
        let (value, acknowledgement) = if use_corrected {
            (
                pending.corrected.clone(),
                format!("Perfect! Updated {field} to \"{}\".", pending.corrected),
            )
        } else {
            (
                pending.original.clone(),
                format!("Got it! Keeping \"{}\" for {field}.", pending.original),
            )
        };
        Some(self.store(field, &value, acknowledgement))
    }

    fn store(
        &mut self,
        field: ProfileField,
        value: &str,
        acknowledgement: String,
    ) -> InterviewReply {
        let value = value.trim().to_string();
        match field {
            ProfileField::BusinessName => self.draft.business_name = value,
            ProfileField::NatureOfBusiness => self.draft.nature_of_business = value,
            ProfileField::Industry => self.draft.industry = value,
            ProfileField::Location => self.draft.location = value,
            ProfileField::CompanyType => self.draft.company_type = value,
            ProfileField::ReportingFramework => self.draft.reporting_framework = value,
            ProfileField::StatutoryCompliances => {
                self.draft.statutory_compliances = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }
        self.index += 1;

        match self.current_field() {
            Some(next) => InterviewReply::Next {
                acknowledgement,
                question: question(next),
            },
            None => {
                let mut profile = self.draft.clone();
                profile.is_setup_complete = true;
                profile.updated_at = chrono::Utc::now();
                InterviewReply::Complete {
                    acknowledgement,
                    profile,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use saim_assistant::{RuleBasedValidator, ValidationError};

    const TIMEOUT: Duration = Duration::from_millis(200);

    struct Unreachable;

    #[async_trait]
    impl FieldValidator for Unreachable {
        async fn validate(
            &self,
            _: &ValidationRequest,
        ) -> Result<ValidationResult, ValidationError> {
            Err(ValidationError::Status(503))
        }
    }

    async fn answer(interview: &mut ProfileInterview, input: &str) -> InterviewReply {
        interview.answer(&RuleBasedValidator::new(), TIMEOUT, input).await
    }

    #[tokio::test]
    async fn full_interview_builds_profile() {
        let mut interview = ProfileInterview::new("user_1");
        assert_eq!(interview.current_field(), Some(ProfileField::BusinessName));

        let answers = [
            "Acme Traders",
            "Retail",
            "Technology",
            "Pune, Maharashtra, India",
            "Private Limited",
            "IFRS",
        ];
        for input in answers {
            assert!(matches!(answer(&mut interview, input).await, InterviewReply::Next { .. }));
        }
        match answer(&mut interview, "GST, TDS").await {
            InterviewReply::Complete { profile, .. } => {
                assert_eq!(profile.business_name, "Acme Traders");
                assert_eq!(profile.company_type, "Private Limited");
                assert_eq!(profile.statutory_compliances, vec!["GST", "TDS"]);
                assert!(profile.is_setup_complete);
                assert_eq!(profile.user_id, "user_1");
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_name_is_asked_again() {
        let mut interview = ProfileInterview::new("user_1");
        match answer(&mut interview, "A").await {
            InterviewReply::Clarify(msg) => {
                assert!(msg.contains("Please provide a longer company name"))
            }

            other => panic!("expected clarification, got {other:?}"),
        }
        assert_eq!(interview.current_field(), Some(ProfileField::BusinessName));
    }

    #[tokio::test]
    async fn correction_can_be_taken_or_declined() {
        let mut interview = ProfileInterview::new("user_1");
        for input in ["Acme", "Retail", "Technology", "Pune", "Partnership", "IFRS"] {
            answer(&mut interview, input).await;
        }

        match answer(&mut interview, "gst, vat").await {
            InterviewReply::OfferCorrection { corrected, original, .. } => {
                assert_eq!(corrected, "GST, VAT");
                assert_eq!(original, "gst, vat");
            }
            other => panic!("expected correction offer, got {other:?}"),
        }
        assert!(interview.awaiting_correction());
        assert!(matches!(answer(&mut interview, "again").await, InterviewReply::Clarify(_)));

        match interview.resolve_correction(true) {
            Some(InterviewReply::Complete { profile, .. }) => {
                assert_eq!(profile.statutory_compliances, vec!["GST", "VAT"]);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert!(interview.resolve_correction(true).is_none());
    }

    #[tokio::test]
    async fn keeping_original_stores_typed_answer() {
        let mut interview = ProfileInterview::new("user_1");
        assert!(matches!(
            answer(&mut interview, "Offise recievable co").await,
            InterviewReply::OfferCorrection { .. }
        ));
        interview.resolve_correction(false);
        assert_eq!(interview.draft().business_name, "Offise recievable co");
        assert_eq!(interview.current_field(), Some(ProfileField::NatureOfBusiness));
    }

    #[tokio::test]
    async fn validator_failure_accepts_input() {
        let mut interview = ProfileInterview::new("user_1");
        match interview.answer(&Unreachable, TIMEOUT, "Acme").await {
            InterviewReply::Next { acknowledgement, .. } => {
                assert!(acknowledgement.contains("Acme"));
            }
            other => panic!("expected next question, got {other:?}"),
        }
        assert_eq!(interview.draft().business_name, "Acme");
    }
}
