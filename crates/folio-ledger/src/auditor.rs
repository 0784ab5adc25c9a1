//! # Integrity Auditor
//!
//! Read-only scan of one series: missing numbers and tampered rows.
//! A row is tampered when its hash no longer matches its fields or its folio
//! is not the one the series format derives from its number.
//!
//! ```text
//! scan_series(key) ──► numbers 1 2 3 _ 5 6 _ _ 9
//!                                    │     │ │
//!                            gaps = [4, 7, 8]
//!
//!                      hashes  ok ok ✗ .. ok ok .. .. ok
//!                                    │
//!                       hash_mismatches = [id of 3]
//! ```
//!
//! Gaps are only searched between the lowest and highest issued number.
//! Allocated-but-never-issued numbers above the highest document are not
//! reported.

use tracing::{error, info, warn};

use folio_core::integrity::verify_document;
use folio_core::{FolioError, FolioFormat, IntegrityReport, IssuedDocument, SeriesKey};
use folio_db::Database;

use crate::error::{LedgerError, LedgerResult};
use crate::ALERT_TARGET;

#[derive(Debug, Clone)]
pub struct IntegrityAuditor {
    db: Database,
}

impl IntegrityAuditor {
    pub fn new(db: Database) -> Self {
        IntegrityAuditor { db }
    }

    /// Scans a series and reports gaps and tampered documents.
    pub async fn verify(&self, key: &SeriesKey) -> LedgerResult<IntegrityReport> {
        let counter = self
            .db
            .counters()
            .get(key)
            .await?
            .ok_or_else(|| FolioError::UnknownSeries {
                document_type: key.document_type,
                series: key.series.clone(),
            })?;

        let documents = self.db.documents().scan_series(key).await?;
        let mut report = scan(&documents, &counter.format());

        if !report.gaps.is_empty() {
            let reconciled = self.db.operations().reconciled_numbers(key).await?;
            report.reconciled_gaps = report
                .gaps
                .iter()
                .copied()
                .filter(|gap| reconciled.contains(gap))
                .collect();
        }

        if !report.hash_mismatches.is_empty() {
            error!(
                target: ALERT_TARGET,
                series = %key,
                mismatches = report.hash_mismatches.len(),
                document_ids = ?report.hash_mismatches,
                "Integrity mismatch"
            );
        }

        let unreconciled = report.unreconciled_gaps();
        if !unreconciled.is_empty() {
            warn!(series = %key, gaps = ?unreconciled, "Unreconciled numbering gaps");
        }

        info!(
            series = %key,
            checked = report.checked,
            gaps = report.gaps.len(),
            mismatches = report.hash_mismatches.len(),
            "Integrity scan finished"
        );
        Ok(report)
    }

    /// Like [`verify`](Self::verify) but fails on any tampered document.
    pub async fn verify_strict(&self, key: &SeriesKey) -> LedgerResult<IntegrityReport> {
        let report = self.verify(key).await?;
        if report.hash_mismatches.is_empty() {
            Ok(report)
        } else {
            Err(LedgerError::from(FolioError::IntegrityMismatch {
                document_ids: report.hash_mismatches,
            }))
        }
    }
}

/// Builds a report from documents sorted by number.
fn scan(documents: &[IssuedDocument], format: &FolioFormat) -> IntegrityReport {
    let numbers: Vec<i64> = documents.iter().map(|d| d.number).collect();

    IntegrityReport {
        checked: documents.len() as u64,
        first_number: numbers.first().copied(),
        last_number: numbers.last().copied(),
        gaps: find_gaps(&numbers),
        hash_mismatches: documents
            .iter()
            .filter(|d| {
                !verify_document(d) || d.formatted_number != format.format(&d.series, d.number)
            })
            .map(|d| d.id.clone())
            .collect(),
        reconciled_gaps: Vec::new(),
    }
}

/// Missing integers between consecutive entries of a sorted slice.
pub fn find_gaps(sorted: &[i64]) -> Vec<i64> {
    sorted
        .windows(2)
        .flat_map(|pair| (pair[0] + 1)..pair[1])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::build_document;
    use folio_core::{DocumentData, DocumentTotals, DocumentType, Money};

    #[test]
    fn test_scan_flags_rewritten_folio() {
        let key = SeriesKey::new(DocumentType::Ticket, "A");
        let format = FolioFormat::new("TKT-", 6, "");
        let data = DocumentData::new(DocumentTotals::from_net_and_tax(
            Money::from_cents(100),
            Money::from_cents(10),
        ));
        let honest = build_document(&key, 1, format.format("A", 1), &data, "cashier-1", "pos-01");
        let mut rewritten =
            build_document(&key, 2, format.format("A", 2), &data, "cashier-1", "pos-01");
        rewritten.formatted_number = "TKT-A-000099".to_string();

        let report = scan(&[honest, rewritten.clone()], &format);
        assert_eq!(report.checked, 2);
        assert!(report.gaps.is_empty());
        assert_eq!(report.hash_mismatches, vec![rewritten.id]);
    }

    #[test]
    fn test_find_gaps() {
        assert!(find_gaps(&[]).is_empty());
        assert!(find_gaps(&[7]).is_empty());
        assert!(find_gaps(&[1, 2, 3]).is_empty());
        assert_eq!(find_gaps(&[1, 2, 3, 5, 6, 9]), vec![4, 7, 8]);
        assert_eq!(find_gaps(&[10, 13]), vec![11, 12]);
    }
}
