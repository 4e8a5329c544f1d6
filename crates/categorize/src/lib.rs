pub mod categorizer;
pub mod context;
pub mod csv;
pub mod patterns;
pub mod rules;
pub mod scorer;
pub mod suggest;
pub(crate) mod util;

pub use categorizer::{
    Categorization, CategorizationResult, CategorizationSource, CategorizeError, Categorizer,
    CategorizerSettings, RunOutcome,
};
pub use context::{
    classify, contact_key, AmountRange, BusinessContext, BusinessNature, ContextCache, Industry,
    RelationshipType,
};
pub use csv::{import_contacts, import_statement, CsvColumnMapping, ImportError, StatementProfile};
pub use patterns::{Pattern, PatternStore};
pub use rules::RuleEngine;
pub use scorer::{AccountScore, WarningFlag};
pub use suggest::{suggest_rules, SuggestedRule};
