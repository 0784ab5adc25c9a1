//! # Ledger Error Types
//!
//! The error type every `FolioService` operation returns.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Ledger Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────────┐  ┌─────────────────┐  ┌───────────────────┐   │
//! │  │  Folio (domain)     │  │  Storage        │  │  Config / Task /  │   │
//! │  │                     │  │                 │  │  Serialization    │   │
//! │  │                     │  │                 │  │                   │   │
//! │  │  UnknownSeries      │  │  DbError        │  │  bad TOML / env   │   │
//! │  │  SequenceExhausted  │  │  (busy, I/O,    │  │  critical section │   │
//! │  │  GateTimeout        │  │   constraints)  │  │  task panicked    │   │
//! │  │  DuplicateNumber ☠  │  │                 │  │                   │   │
//! │  │  AlreadyAnnulled    │  │                 │  │                   │   │
//! │  │  DocumentNotFound   │  │                 │  │  JSON rendering   │   │
//! │  │  IntegrityMismatch ☠│  │                 │  │                   │   │
//! │  │  Validation         │  │                 │  │                   │   │
//! │  └─────────────────────┘  └─────────────────┘  └───────────────────┘   │
//! │                                                                         │
//! │  ☠ = fatal: numbering invariant already broken, never retried          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use folio_core::{FolioError, ValidationError};
use folio_db::DbError;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors surfaced by the folio service.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Domain failure from the numbering taxonomy.
    #[error(transparent)]
    Folio(#[from] FolioError),

    /// Storage failure. Any open transaction was rolled back.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The task running a critical section did not complete.
    #[error("Critical section task failed: {0}")]
    Task(String),

    /// A report could not be rendered as JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Folio(FolioError::Validation(err))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(DbError::from(err))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LedgerError::Task(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl LedgerError {
    /// True for system faults that must be alerted and never retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            LedgerError::Folio(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// The domain error, if this is one.
    pub fn as_folio(&self) -> Option<&FolioError> {
        match self {
            LedgerError::Folio(e) => Some(e),
            _ => None,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Folio(e) => e.code(),
            LedgerError::Storage(DbError::Busy(_)) => "STORAGE_BUSY",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Config(_) => "CONFIG_ERROR",
            LedgerError::Task(_) => "TASK_FAILED",
            LedgerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::DocumentType;

    #[test]
    fn test_fatal_passthrough() {
        let err: LedgerError = FolioError::DuplicateNumber {
            document_type: DocumentType::Ticket,
            series: "A".into(),
            number: 1,
        }
        .into();
        assert!(err.is_fatal());
        assert_eq!(err.code(), "DUPLICATE_NUMBER");

        let err: LedgerError = DbError::PoolExhausted.into();
        assert!(!err.is_fatal());
        assert_eq!(err.code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_validation_lifts_to_folio() {
        let err: LedgerError = ValidationError::Required {
            field: "actor".into(),
        }
        .into();
        assert!(matches!(
            err.as_folio(),
            Some(FolioError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[test]
    fn test_json_failure_has_its_own_code() {
        let json_err = serde_json::from_str::<serde_json::Value>("{\"issued\":").unwrap_err();
        let err: LedgerError = json_err.into();
        assert!(matches!(err, LedgerError::Serialization(_)));
        assert_eq!(err.code(), "SERIALIZATION_ERROR");
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("Serialization error"));
    }

    #[test]
    fn test_transparent_display() {
        let err: LedgerError = FolioError::DocumentNotFound("doc-9".into()).into();
        assert_eq!(err.to_string(), "Document not found: doc-9");
    }
}
