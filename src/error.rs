//! Error types for the categorization engine.

use crate::entities::{CategoryId, RuleId, TransactionId};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, CategorizerError>;

/// Errors surfaced by the engine and its storage boundaries.
#[derive(Error, Debug)]
pub enum CategorizerError {
    /// A regex rule pattern failed to compile
    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Rule pattern was empty or whitespace only
    #[error("rule pattern must not be empty")]
    EmptyPattern,

    /// decide()/skip() called while no transaction is under review
    #[error("no active review session")]
    NoActiveSession,

    /// decide() called for a transaction other than the current one
    #[error("transaction {got} is not under review (current: {expected})")]
    NotUnderReview {
        expected: TransactionId,
        got: TransactionId,
    },

    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("rule {0} not found")]
    RuleNotFound(RuleId),

    #[error("category {0} not found")]
    UnknownCategory(CategoryId),

    /// Underlying SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}
