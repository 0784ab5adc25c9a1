//! # Error Types
//!
//! The fiscal numbering error taxonomy.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  folio-core errors (this file)                                         │
//! │  ├── FolioError       - Numbering / ledger domain failures             │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  folio-db errors                                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  folio-ledger errors                                                   │
//! │  └── LedgerError      - What collaborators see                         │
//! │                                                                         │
//! │  Flow: ValidationError → FolioError → LedgerError ← DbError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Severity
//! `DuplicateNumber` and `IntegrityMismatch` mean the numbering invariant is
//! already broken. They are never retried; see [`FolioError::is_fatal`].

use thiserror::Error;

use crate::types::{DocumentState, DocumentType};

// =============================================================================
// Folio Error
// =============================================================================

/// Fiscal numbering errors.
#[derive(Debug, Error)]
pub enum FolioError {
    /// No active counter exists for the (type, series) pair.
    ///
    /// ## When This Occurs
    /// - Series was never configured
    /// - Series was deactivated
    #[error("Unknown series: {document_type}/{series}")]
    UnknownSeries {
        document_type: DocumentType,
        series: String,
    },

    /// The counter has passed its configured maximum.
    ///
    /// The allocation transaction was rolled back; `current` is unchanged.
    #[error("Sequence {document_type}/{series} exhausted: next {current} exceeds max {max}")]
    SequenceExhausted {
        document_type: DocumentType,
        series: String,
        current: i64,
        max: i64,
    },

    /// A queued caller gave up waiting for the allocation gate.
    ///
    /// The call never entered the store transaction.
    #[error("Timed out after {waited_ms}ms waiting for allocation gate {document_type}/{series}")]
    GateTimeout {
        document_type: DocumentType,
        series: String,
        waited_ms: u64,
    },

    /// The ledger already holds a document with this number.
    ///
    /// ## Severity
    /// Unreachable while allocation is correct. Seeing it means a number
    /// was handed out twice.
    #[error("Duplicate folio number {number} in {document_type}/{series}")]
    DuplicateNumber {
        document_type: DocumentType,
        series: String,
        number: i64,
    },

    /// The document is not in the `emitted` state.
    #[error("Document {document_id} is already {state}")]
    AlreadyAnnulled {
        document_id: String,
        state: DocumentState,
    },

    /// No document with this id exists.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Stored hashes do not match the recomputed ones.
    ///
    /// Raised by the integrity auditor only.
    #[error("Integrity hash mismatch for {} document(s): {document_ids:?}", document_ids.len())]
    IntegrityMismatch { document_ids: Vec<String> },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl FolioError {
    /// True for faults that mean the numbering invariant is already broken.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FolioError::DuplicateNumber { .. } | FolioError::IntegrityMismatch { .. }
        )
    }

    /// Stable machine-readable code, used in operation log descriptions.
    pub fn code(&self) -> &'static str {
        match self {
            FolioError::UnknownSeries { .. } => "UNKNOWN_SERIES",
            FolioError::SequenceExhausted { .. } => "SEQUENCE_EXHAUSTED",
            FolioError::GateTimeout { .. } => "GATE_TIMEOUT",
            FolioError::DuplicateNumber { .. } => "DUPLICATE_NUMBER",
            FolioError::AlreadyAnnulled { .. } => "ALREADY_ANNULLED",
            FolioError::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            FolioError::IntegrityMismatch { .. } => "INTEGRITY_MISMATCH",
            FolioError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any transaction is opened.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g. a series configured twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Totals do not add up.
    #[error("gross {gross} must equal net {net} plus tax {tax}")]
    UnbalancedTotals { gross: i64, net: i64, tax: i64 },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with FolioError.
pub type CoreResult<T> = Result<T, FolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = FolioError::SequenceExhausted {
            document_type: DocumentType::Ticket,
            series: "A".to_string(),
            current: 1000,
            max: 999,
        };
        assert_eq!(
            err.to_string(),
            "Sequence ticket/A exhausted: next 1000 exceeds max 999"
        );

        let err = FolioError::AlreadyAnnulled {
            document_id: "doc-1".to_string(),
            state: DocumentState::Annulled,
        };
        assert_eq!(err.to_string(), "Document doc-1 is already annulled");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(FolioError::DuplicateNumber {
            document_type: DocumentType::Invoice,
            series: "F1".to_string(),
            number: 7,
        }
        .is_fatal());
        assert!(FolioError::IntegrityMismatch {
            document_ids: vec!["x".to_string()],
        }
        .is_fatal());
        assert!(!FolioError::DocumentNotFound("x".to_string()).is_fatal());
    }

    #[test]
    fn test_validation_converts_to_folio_error() {
        let validation_err = ValidationError::Required {
            field: "reason".to_string(),
        };
        let err: FolioError = validation_err.into();
        assert!(matches!(err, FolioError::Validation(_)));
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
