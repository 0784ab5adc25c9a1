//! # Document Ledger
//!
//! Binds allocated numbers to documents and moves documents out of the
//! `emitted` state. Rows are never deleted.
//!
//! ## Document States
//! ```text
//!                 issue
//!   Allocation ───────────► emitted ──── annul ────► annulled
//!                              │
//!                              └─────── replace ───► replaced
//!                                                    (replaced_by = new id)
//! ```

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use folio_core::integrity::{compute_integrity_hash, issue_timestamp};
use folio_core::validation::{validate_actor, validate_reason, validate_reference, validate_totals};
use folio_core::{
    Allocation, DocumentData, DocumentState, FolioError, IssuedDocument, OperationKind, SeriesKey,
    ValidationError,
};
use folio_db::{Database, DbError};

use crate::error::{LedgerError, LedgerResult};
use crate::oplog::OperationLog;

// =============================================================================
// Shared Helpers
// =============================================================================

/// Checks caller input for an issue.
pub(crate) fn validate_issue(data: &DocumentData, actor: &str) -> Result<(), ValidationError> {
    validate_actor(actor)?;
    validate_totals(&data.totals)?;
    validate_reference("sale_ref", data.sale_ref.as_deref())?;
    validate_reference("customer_ref", data.customer_ref.as_deref())?;
    Ok(())
}

/// Builds a fresh `emitted` document with its integrity hash.
pub(crate) fn build_document(
    key: &SeriesKey,
    number: i64,
    formatted_number: String,
    data: &DocumentData,
    actor: &str,
    terminal_origin: &str,
) -> IssuedDocument {
    let issued_at = issue_timestamp();
    let integrity_hash = compute_integrity_hash(
        key.document_type,
        &key.series,
        number,
        data.totals.gross,
        issued_at,
    );

    IssuedDocument {
        id: Uuid::new_v4().to_string(),
        document_type: key.document_type,
        series: key.series.clone(),
        number,
        formatted_number,
        sale_ref: data.sale_ref.clone(),
        customer_ref: data.customer_ref.clone(),
        gross_cents: data.totals.gross.cents(),
        net_cents: data.totals.net.cents(),
        tax_cents: data.totals.tax.cents(),
        state: DocumentState::Emitted,
        issued_at,
        issued_by: actor.to_string(),
        annulled_at: None,
        annul_reason: None,
        replaced_by: None,
        integrity_hash,
        terminal_origin: terminal_origin.to_string(),
    }
}

/// Maps a failed document insert to the ledger taxonomy.
///
/// A uniqueness hit on the document table means the number is taken.
pub(crate) fn insert_error(err: DbError, key: &SeriesKey, number: i64) -> LedgerError {
    if err.is_unique_violation_on("issued_documents") {
        FolioError::DuplicateNumber {
            document_type: key.document_type,
            series: key.series.clone(),
            number,
        }
        .into()
    } else {
        err.into()
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone)]
pub struct DocumentLedger {
    db: Database,
    oplog: OperationLog,
}

impl DocumentLedger {
    pub fn new(db: Database, oplog: OperationLog) -> Self {
        DocumentLedger { db, oplog }
    }

    /// Binds an allocation to a new `emitted` document.
    ///
    /// The allocation is checked against the stored counter: its number must
    /// already have been handed out and its folio must match the series
    /// format.
    ///
    /// ## Errors
    /// - `UnknownSeries` when no counter exists for the allocation's series
    /// - `Validation` for a number the counter has not handed out, a folio
    ///   that does not match the series format, unbalanced totals or
    ///   oversized references
    /// - `DuplicateNumber` (fatal) when the number already has a document
    pub async fn issue(
        &self,
        allocation: &Allocation,
        data: &DocumentData,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        validate_issue(data, actor)?;

        let key = allocation.key();
        let formatted_number = match self.check_allocation(&key, allocation).await {
            Ok(formatted) => formatted,
            Err(err) => {
                warn!(
                    series = %key,
                    number = allocation.number,
                    error = %err,
                    "Allocation rejected at issue"
                );
                self.oplog.record_failure(Some(&key), actor, &err).await;
                return Err(err);
            }
        };

        let doc = build_document(
            &key,
            allocation.number,
            formatted_number,
            data,
            actor,
            self.oplog.terminal_id(),
        );

        if let Err(e) = self.db.documents().insert(&doc).await {
            let err = insert_error(e, &key, allocation.number);
            self.oplog.record_failure(Some(&key), actor, &err).await;
            return Err(err);
        }

        self.record_issued(&doc, actor).await;
        info!(
            document_id = %doc.id,
            formatted_number = %doc.formatted_number,
            gross = %doc.gross(),
            "Document issued"
        );
        Ok(doc)
    }

    /// Moves an `emitted` document to `annulled`.
    pub async fn annul(
        &self,
        document_id: &str,
        reason: &str,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        validate_actor(actor)?;
        validate_reason(reason)?;

        let doc = match self.db.documents().get_by_id(document_id).await? {
            Some(doc) => doc,
            None => {
                let err = LedgerError::from(FolioError::DocumentNotFound(document_id.to_string()));
                self.oplog.record_failure(None, actor, &err).await;
                return Err(err);
            }
        };
        let key = doc.key();

        let annulled = match self
            .db
            .documents()
            .annul(document_id, reason, Utc::now())
            .await
        {
            Ok(annulled) => annulled,
            Err(e) => {
                let err = LedgerError::from(e);
                self.oplog.record_failure(Some(&key), actor, &err).await;
                return Err(err);
            }
        };

        if !annulled {
            // Either it was never emitted or someone got there first.
            let state = self
                .db
                .documents()
                .get_by_id(document_id)
                .await?
                .map(|d| d.state)
                .unwrap_or(doc.state);
            let err = LedgerError::from(FolioError::AlreadyAnnulled {
                document_id: document_id.to_string(),
                state,
            });
            warn!(document_id, %state, "Annul rejected");
            self.oplog.record_failure(Some(&key), actor, &err).await;
            return Err(err);
        }

        let record = self
            .oplog
            .entry(
                OperationKind::Annul,
                actor,
                format!("annulled {}: {}", doc.formatted_number, reason),
            )
            .for_series(&key)
            .with_numbers(Some(doc.number), None);
        self.oplog.record(record).await;

        let updated = self
            .db
            .documents()
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| FolioError::DocumentNotFound(document_id.to_string()))?;

        info!(document_id, formatted_number = %updated.formatted_number, "Document annulled");
        Ok(updated)
    }

    /// Returns the folio the counter derives for `allocation`.
    ///
    /// Numbers at or above `current_value` were never handed out; issuing
    /// one would steal it from the caller that eventually allocates it.
    async fn check_allocation(
        &self,
        key: &SeriesKey,
        allocation: &Allocation,
    ) -> LedgerResult<String> {
        let counter = self
            .db
            .counters()
            .get(key)
            .await?
            .ok_or_else(|| FolioError::UnknownSeries {
                document_type: key.document_type,
                series: key.series.clone(),
            })?;

        if allocation.number < counter.min_value || allocation.number >= counter.current_value {
            return Err(ValidationError::OutOfRange {
                field: "number".to_string(),
                min: counter.min_value,
                max: counter.current_value - 1,
            }
            .into());
        }

        let expected = counter.format().format(&key.series, allocation.number);
        if allocation.formatted_number != expected {
            return Err(ValidationError::InvalidFormat {
                field: "formatted_number".to_string(),
                reason: format!("expected {expected}, got {}", allocation.formatted_number),
            }
            .into());
        }

        Ok(expected)
    }

    /// Writes the `issue` record for a committed document.
    pub(crate) async fn record_issued(&self, doc: &IssuedDocument, actor: &str) {
        let record = self
            .oplog
            .entry(
                OperationKind::Issue,
                actor,
                format!("issued {} ({}) gross {}", doc.formatted_number, doc.id, doc.gross()),
            )
            .for_series(&doc.key())
            .with_numbers(None, Some(doc.number));
        self.oplog.record(record).await;
    }
}
