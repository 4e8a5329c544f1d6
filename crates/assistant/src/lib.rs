//! External-service seams for the assistant: profile answer validation and
//! chart of accounts generation. Each seam has a local implementation that
//! always answers and a remote one that falls back to it.

pub mod chart;
pub mod reconnect;
pub mod validation;

pub use chart::{ChartError, ChartGenerator, RemoteChartGenerator, TemplateChartGenerator};
pub use reconnect::ReconnectPolicy;
pub use validation::{
    validate_or_accept, Correction, CorrectionKind, FieldValidator, HttpValidator, ProfileField,
    RuleBasedValidator, ValidationError, ValidationRequest, ValidationResult,
    DEFAULT_TIMEOUT_MS,
};
