//! Error types for docache operations

use crate::DocumentId;
use thiserror::Error;

/// Backing store errors.
///
/// A read of a missing document is not an error; stores return `Ok(None)`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found: {id}")]
    NotFound { id: DocumentId },

    #[error("Insert failed for {id}: {reason}")]
    InsertFailed { id: DocumentId, reason: String },

    #[error("Operation {operation} requires a document id")]
    MissingId { operation: String },

    #[error("Backend {operation} failed: {reason}")]
    Backend { operation: String, reason: String },

    #[error("Invalid query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Shorthand for a backend failure.
    pub fn backend(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_id(operation: impl Into<String>) -> Self {
        Self::MissingId {
            operation: operation.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all docache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation not implemented: {operation}")]
    NotImplemented { operation: String },

    #[error("No async runtime available: {reason}")]
    NoRuntime { reason: String },
}

impl DocacheError {
    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation: operation.into(),
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }
}

/// Result type alias for docache operations.
pub type DocacheResult<T> = Result<T, DocacheError>;

// =============================================================================
// TESTS
// =============================================================================
