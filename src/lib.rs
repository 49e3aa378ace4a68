// Transaction Categorizer - Core Library
// Exposes the categorization engine for use in the CLI, the review UI, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod grouping;   // Similarity clusters of uncategorized transactions
pub mod rules;      // Priority-ordered rule matching
pub mod session;    // Review session state machine
pub mod store;      // Boundary traits + in-memory store
pub mod suggestion; // Pattern mining → ranked rule suggestions
pub mod text;       // Normalization, keywords, similarity

// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use config::{EngineConfig, KnownVendors};
pub use db::{load_csv, setup_database, ImportSummary, SqliteStore};
pub use entities::{
    Category, CategoryId, CategoryTree, NewCategory, NewTransaction, RuleId, Transaction,
    TransactionId,
};
pub use error::{CategorizerError, Result};
pub use grouping::{ClusterSuggestion, SimilarityCluster, SimilarityGrouper};
pub use rules::{
    load_rules_json, Categorization, NewRule, PatternMatcher, Rule, RuleBasedCategorizer,
    RuleSet, RuleUpdate,
};
pub use session::{ReviewSession, SessionState, SessionStats, TransactionReview};
pub use store::{CategoryDirectory, InMemoryStore, RuleStore, TransactionSource};
pub use suggestion::{
    pattern_effectiveness, PatternEffectiveness, PatternKind, PatternSuggestionEngine, Suggestion,
};
pub use text::{similarity, TextAnalyzer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
