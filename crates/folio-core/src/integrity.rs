//! # Integrity Hashing
//!
//! A deterministic fingerprint over the immutable fields of an issued
//! document. Recomputing it later and comparing against the stored value
//! detects edits made behind the ledger's back.
//!
//! ## Hash Input
//! ```text
//!   SHA-256( type | series | number | gross_cents | issued_at_millis )
//!
//!   "ticket|A|1|11900|1760868000123"  →  64 lowercase hex chars
//! ```
//!
//! `issued_at` enters as Unix milliseconds. Documents are stamped with
//! [`issue_timestamp`], which truncates to millisecond precision, so the value
//! read back from storage hashes identically.

use chrono::{DateTime, SubsecRound, Utc};
use sha2::{Digest, Sha256};

use crate::money::Money;
use crate::types::{DocumentType, IssuedDocument};

const FIELD_SEPARATOR: &str = "|";

/// Computes the integrity hash of a document's immutable fields.
pub fn compute_integrity_hash(
    document_type: DocumentType,
    series: &str,
    number: i64,
    gross: Money,
    issued_at: DateTime<Utc>,
) -> String {
    let canonical = [
        document_type.as_str().to_string(),
        series.to_string(),
        number.to_string(),
        gross.cents().to_string(),
        issued_at.timestamp_millis().to_string(),
    ]
    .join(FIELD_SEPARATOR);

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Recomputes the hash of a stored document.
pub fn recompute(document: &IssuedDocument) -> String {
    compute_integrity_hash(
        document.document_type,
        &document.series,
        document.number,
        document.gross(),
        document.issued_at,
    )
}

/// True when the stored hash matches the document's fields.
pub fn verify_document(document: &IssuedDocument) -> bool {
    recompute(document) == document.integrity_hash
}

/// Current time at the precision the integrity hash uses.
pub fn issue_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentState;
    use chrono::TimeZone;

    fn document(gross_cents: i64) -> IssuedDocument {
        let issued_at = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let mut doc = IssuedDocument {
            id: "doc-1".to_string(),
            document_type: DocumentType::Ticket,
            series: "A".to_string(),
            number: 1,
            formatted_number: "TKT-A-000001".to_string(),
            sale_ref: None,
            customer_ref: None,
            gross_cents,
            net_cents: 10000,
            tax_cents: gross_cents - 10000,
            state: DocumentState::Emitted,
            issued_at,
            issued_by: "cashier-1".to_string(),
            annulled_at: None,
            annul_reason: None,
            replaced_by: None,
            integrity_hash: String::new(),
            terminal_origin: "pos-01".to_string(),
        };
        doc.integrity_hash = recompute(&doc);
        doc
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let doc = document(11900);
        assert_eq!(doc.integrity_hash.len(), 64);
        assert!(doc.integrity_hash.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_eq!(recompute(&doc), doc.integrity_hash);
        assert!(verify_document(&doc));
    }

    #[test]
    fn test_tampered_total_is_detected() {
        let mut doc = document(11900);
        doc.gross_cents = 1190;
        assert!(!verify_document(&doc));
    }

    #[test]
    fn test_mutable_fields_do_not_affect_hash() {
        let mut doc = document(11900);
        doc.state = DocumentState::Annulled;
        doc.annul_reason = Some("customer cancelled".to_string());
        doc.annulled_at = Some(Utc::now());
        assert!(verify_document(&doc));
    }

    #[test]
    fn test_issue_timestamp_has_millisecond_precision() {
        let ts = issue_timestamp();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
