//! # Folio Service
//!
//! The single entry point collaborators hold.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           FolioService                                  │
//! │                                                                         │
//! │  Numbering            allocate_next        issue_next                   │
//! │                       allocate_next_within issue_next_within            │
//! │  Documents            issue_document       annul_document               │
//! │                       replace_document                                  │
//! │  Audit                verify_integrity     verify_integrity_strict      │
//! │                       get_statistics       operation_history            │
//! │  Series admin         configure_series     raise_max                    │
//! │                       set_series_active    reconcile_gap                │
//! │  Lookups              get_series           list_series                  │
//! │                       get_document         find_by_number               │
//! │                       list_documents       fiscal_config                │
//! │                                                                         │
//! │  Every mutating call leaves an operation record, success or failure.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `allocate_next` followed by `issue_document` is the two-step flow: a
//! failure between the two leaves a gap the auditor will report.
//! `issue_next` allocates and issues in one transaction and leaves no gap.
//! The `_within` variants bound the wait behind other callers of the same
//! series instead of using the service-wide gate timeout.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use folio_core::validation::{
    validate_actor, validate_new_max, validate_reason, validate_series,
    validate_series_definition,
};
use folio_core::{
    Allocation, DocumentData, FiscalConfig, FolioError, IntegrityReport, IssuedDocument, Money,
    OperationKind, OperationRecord, SequenceCounter, SeriesDefinition, SeriesKey, SeriesPosition,
    Statistics, StatsPeriod, ValidationError,
};
use folio_db::{Database, DbError, DocumentRepository};

use crate::allocator::{take_next, SequenceAllocator};
use crate::auditor::IntegrityAuditor;
use crate::config::{LedgerConfig, ServiceSettings};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{build_document, insert_error, validate_issue, DocumentLedger};
use crate::oplog::OperationLog;

/// Facade over allocator, ledger, auditor and operation log.
///
/// Cheap to clone; clones share the gate, the cache and the pool.
#[derive(Debug, Clone)]
pub struct FolioService {
    db: Database,
    oplog: OperationLog,
    allocator: SequenceAllocator,
    ledger: DocumentLedger,
    auditor: IntegrityAuditor,
}

impl FolioService {
    pub fn new(db: Database, settings: ServiceSettings) -> Self {
        let oplog = OperationLog::new(&db, &settings.terminal_id, settings.oplog_alert_threshold);
        let allocator = SequenceAllocator::new(db.clone(), oplog.clone(), settings.gate_timeout);
        let ledger = DocumentLedger::new(db.clone(), oplog.clone());
        let auditor = IntegrityAuditor::new(db.clone());

        info!(terminal_id = %settings.terminal_id, "Folio service ready");

        FolioService {
            db,
            oplog,
            allocator,
            ledger,
            auditor,
        }
    }

    /// Opens the store described by `config` and builds a service on it.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(db, config.service_settings()))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.oplog
    }

    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }

    pub fn terminal_id(&self) -> &str {
        self.oplog.terminal_id()
    }

    // =========================================================================
    // Numbering
    // =========================================================================

    /// Reserves the next number of a series.
    pub async fn allocate_next(&self, key: &SeriesKey, actor: &str) -> LedgerResult<Allocation> {
        self.allocator.allocate(key, actor).await
    }

    /// Like [`allocate_next`](Self::allocate_next), but gives up with
    /// `GateTimeout` after waiting `timeout` behind other callers.
    pub async fn allocate_next_within(
        &self,
        key: &SeriesKey,
        actor: &str,
        timeout: Duration,
    ) -> LedgerResult<Allocation> {
        self.allocator.allocate_within(key, actor, Some(timeout)).await
    }

    /// Allocates and issues in one transaction.
    ///
    /// Either both the counter and the document are written or neither is.
    pub async fn issue_next(
        &self,
        key: &SeriesKey,
        data: DocumentData,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        self.issue_next_gated(key, data, actor, self.allocator.gate_timeout())
            .await
    }

    /// Like [`issue_next`](Self::issue_next) with its own gate wait.
    pub async fn issue_next_within(
        &self,
        key: &SeriesKey,
        data: DocumentData,
        actor: &str,
        timeout: Duration,
    ) -> LedgerResult<IssuedDocument> {
        self.issue_next_gated(key, data, actor, Some(timeout)).await
    }

    async fn issue_next_gated(
        &self,
        key: &SeriesKey,
        data: DocumentData,
        actor: &str,
        timeout: Option<Duration>,
    ) -> LedgerResult<IssuedDocument> {
        validate_series(&key.series)?;
        validate_issue(&data, actor)?;

        let this = self.clone();
        let owned_key = key.clone();
        let owned_actor = actor.to_string();

        self.allocator
            .exclusive(key, actor, timeout, move || async move {
                this.issue_next_locked(&owned_key, &data, &owned_actor).await
            })
            .await
    }

    async fn issue_next_locked(
        &self,
        key: &SeriesKey,
        data: &DocumentData,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        let result = async {
            let mut tx = self.db.begin().await?;
            let counter = take_next(&mut tx, key).await?;
            let number = counter.current_value;
            let doc = build_document(
                key,
                number,
                counter.format().format(&key.series, number),
                data,
                actor,
                self.terminal_id(),
            );
            DocumentRepository::insert_with(&mut tx, &doc)
                .await
                .map_err(|e| insert_error(e, key, number))?;
            tx.commit().await?;
            Ok::<_, LedgerError>((counter, doc))
        }
        .await;

        match result {
            Ok((counter, doc)) => {
                self.allocator.committed(key).await;
                self.allocator
                    .record_allocation(key, &counter, &doc.formatted_number, actor)
                    .await;
                self.ledger.record_issued(&doc, actor).await;
                info!(
                    document_id = %doc.id,
                    formatted_number = %doc.formatted_number,
                    "Document allocated and issued"
                );
                Ok(doc)
            }
            Err(err) => {
                self.allocator.failed(Some(key), actor, &err).await;
                Err(err)
            }
        }
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Binds a previous allocation to a new document.
    ///
    /// Allocations the series has not handed out, or whose folio does not
    /// match the series format, are rejected.
    pub async fn issue_document(
        &self,
        allocation: &Allocation,
        data: DocumentData,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        self.ledger.issue(allocation, &data, actor).await
    }

    /// Annuls an emitted document. The number stays consumed.
    pub async fn annul_document(
        &self,
        document_id: &str,
        reason: &str,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        self.ledger.annul(document_id, reason, actor).await
    }

    /// Issues a corrected document in the original's series and marks the
    /// original `replaced`, atomically.
    ///
    /// Returns the new document.
    pub async fn replace_document(
        &self,
        document_id: &str,
        data: DocumentData,
        reason: &str,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        validate_reason(reason)?;
        validate_issue(&data, actor)?;

        let original = match self.db.documents().get_by_id(document_id).await? {
            Some(doc) => doc,
            None => {
                let err = LedgerError::from(FolioError::DocumentNotFound(document_id.to_string()));
                self.oplog.record_failure(None, actor, &err).await;
                return Err(err);
            }
        };
        let key = original.key();

        if !original.is_emitted() {
            let err = LedgerError::from(FolioError::AlreadyAnnulled {
                document_id: original.id.clone(),
                state: original.state,
            });
            self.oplog.record_failure(Some(&key), actor, &err).await;
            return Err(err);
        }

        let this = self.clone();
        let owned_key = key.clone();
        let owned_reason = reason.to_string();
        let owned_actor = actor.to_string();

        self.allocator
            .exclusive(&key, actor, self.allocator.gate_timeout(), move || async move {
                this.replace_locked(&owned_key, &original, &data, &owned_reason, &owned_actor)
                    .await
            })
            .await
    }

    async fn replace_locked(
        &self,
        key: &SeriesKey,
        original: &IssuedDocument,
        data: &DocumentData,
        reason: &str,
        actor: &str,
    ) -> LedgerResult<IssuedDocument> {
        let result = async {
            let mut tx = self.db.begin().await?;
            let counter = take_next(&mut tx, key).await?;
            let number = counter.current_value;
            let doc = build_document(
                key,
                number,
                counter.format().format(&key.series, number),
                data,
                actor,
                self.terminal_id(),
            );
            DocumentRepository::insert_with(&mut tx, &doc)
                .await
                .map_err(|e| insert_error(e, key, number))?;

            let marked =
                DocumentRepository::mark_replaced_with(&mut tx, &original.id, &doc.id, reason, Utc::now())
                    .await?;
            if !marked {
                // Annulled or replaced by someone else since we looked.
                let state = DocumentRepository::get_by_id_with(&mut tx, &original.id)
                    .await?
                    .map(|d| d.state)
                    .unwrap_or(original.state);
                return Err(FolioError::AlreadyAnnulled {
                    document_id: original.id.clone(),
                    state,
                }
                .into());
            }

            tx.commit().await?;
            Ok::<_, LedgerError>((counter, doc))
        }
        .await;

        match result {
            Ok((counter, doc)) => {
                self.allocator.committed(key).await;
                self.allocator
                    .record_allocation(key, &counter, &doc.formatted_number, actor)
                    .await;
                self.ledger.record_issued(&doc, actor).await;

                let record = self
                    .oplog
                    .entry(
                        OperationKind::Annul,
                        actor,
                        format!(
                            "{} replaced by {} ({}): {}",
                            original.formatted_number, doc.formatted_number, doc.id, reason
                        ),
                    )
                    .for_series(key)
                    .with_numbers(Some(original.number), Some(doc.number));
                self.oplog.record(record).await;

                info!(
                    original = %original.formatted_number,
                    replacement = %doc.formatted_number,
                    "Document replaced"
                );
                Ok(doc)
            }
            Err(err) => {
                self.allocator.failed(Some(key), actor, &err).await;
                Err(err)
            }
        }
    }

    // =========================================================================
    // Audit
    // =========================================================================

    pub async fn verify_integrity(&self, key: &SeriesKey) -> LedgerResult<IntegrityReport> {
        self.auditor.verify(key).await
    }

    /// Fails with `IntegrityMismatch` when any stored hash is wrong.
    pub async fn verify_integrity_strict(&self, key: &SeriesKey) -> LedgerResult<IntegrityReport> {
        self.auditor.verify_strict(key).await
    }

    /// Aggregates for a reporting window.
    ///
    /// Counts and totals read the ledger; positions read the counters as
    /// they stand now.
    pub async fn get_statistics(&self, period: StatsPeriod) -> LedgerResult<Statistics> {
        let documents = self.db.documents();

        let issued_by_type = documents.count_issued_by_type(&period).await?.into_iter().collect();
        let annulled_by_type = documents
            .count_annulled_by_type(&period)
            .await?
            .into_iter()
            .collect();
        let emitted_gross_by_type = documents
            .emitted_gross_by_type(&period)
            .await?
            .into_iter()
            .map(|(document_type, cents)| (document_type, Money::from_cents(cents)))
            .collect();
        let current_numbers = self
            .db
            .counters()
            .list()
            .await?
            .iter()
            .map(SeriesPosition::from)
            .collect();

        Ok(Statistics {
            issued_by_type,
            annulled_by_type,
            emitted_gross_by_type,
            current_numbers,
        })
    }

    /// Latest operation records of a series, newest first.
    pub async fn operation_history(
        &self,
        key: &SeriesKey,
        limit: u32,
    ) -> LedgerResult<Vec<OperationRecord>> {
        Ok(self.db.operations().history(key, limit).await?)
    }

    // =========================================================================
    // Series Administration
    // =========================================================================

    /// Creates the counter for a new series.
    pub async fn configure_series(
        &self,
        definition: &SeriesDefinition,
        actor: &str,
    ) -> LedgerResult<SequenceCounter> {
        validate_actor(actor)?;
        validate_series_definition(definition)?;

        let key = definition.key();
        let now = Utc::now();
        let counter = SequenceCounter {
            document_type: definition.document_type,
            series: definition.series.clone(),
            current_value: definition.start_value(),
            min_value: definition.min,
            max_value: definition.max,
            prefix: definition.prefix.clone(),
            suffix: definition.suffix.clone(),
            width: definition.width,
            active: definition.active,
            created_at: now,
            updated_at: now,
        };

        match self.db.counters().insert(&counter).await {
            Ok(()) => {}
            Err(DbError::UniqueViolation { .. }) => {
                return Err(ValidationError::Duplicate {
                    field: "series".to_string(),
                    value: key.to_string(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        self.allocator.cache().put(counter.clone());
        let record = self
            .oplog
            .entry(
                OperationKind::Recover,
                actor,
                format!(
                    "series configured: start {} max {} width {}",
                    counter.current_value, counter.max_value, counter.width
                ),
            )
            .for_series(&key);
        self.oplog.record(record).await;

        info!(series = %key, start = counter.current_value, max = counter.max_value, "Series configured");
        Ok(counter)
    }

    /// Raises the upper bound of a series. Never lowers it.
    pub async fn raise_max(
        &self,
        key: &SeriesKey,
        new_max: i64,
        actor: &str,
    ) -> LedgerResult<SequenceCounter> {
        validate_actor(actor)?;
        let current = self.require_counter(key).await?;
        validate_new_max(current.max_value, new_max, current.width)?;

        if !self.db.counters().raise_max(key, new_max).await? {
            // Raised further by another terminal in the meantime.
            return Err(ValidationError::OutOfRange {
                field: "max".to_string(),
                min: current.max_value,
                max: current.format().max_number(),
            }
            .into());
        }

        let updated = self.refresh(key).await?;
        let record = self
            .oplog
            .entry(
                OperationKind::Recover,
                actor,
                format!("max raised from {} to {}", current.max_value, new_max),
            )
            .for_series(key)
            .with_numbers(Some(current.max_value), Some(new_max));
        self.oplog.record(record).await;

        info!(series = %key, from = current.max_value, to = new_max, "Series max raised");
        Ok(updated)
    }

    /// Activates or deactivates a series.
    ///
    /// Allocation in an inactive series fails with `UnknownSeries`.
    pub async fn set_series_active(
        &self,
        key: &SeriesKey,
        active: bool,
        actor: &str,
    ) -> LedgerResult<SequenceCounter> {
        validate_actor(actor)?;
        self.require_counter(key).await?;
        self.db.counters().set_active(key, active).await?;

        let updated = self.refresh(key).await?;
        let verb = if active { "activated" } else { "deactivated" };
        let record = self
            .oplog
            .entry(OperationKind::Recover, actor, format!("series {verb}"))
            .for_series(key);
        self.oplog.record(record).await;

        info!(series = %key, active, "Series {verb}");
        Ok(updated)
    }

    /// Records that a missing number was investigated.
    ///
    /// The number must have been handed out already and have no document.
    /// The returned record is what marks the gap reconciled, so a failed
    /// write is returned to the caller.
    pub async fn reconcile_gap(
        &self,
        key: &SeriesKey,
        number: i64,
        note: &str,
        actor: &str,
    ) -> LedgerResult<OperationRecord> {
        validate_actor(actor)?;
        validate_reason(note)?;
        let counter = self.require_counter(key).await?;

        if number < counter.min_value || number >= counter.current_value {
            return Err(ValidationError::OutOfRange {
                field: "number".to_string(),
                min: counter.min_value,
                max: counter.current_value - 1,
            }
            .into());
        }

        if self.db.documents().find_by_number(key, number).await?.is_some() {
            return Err(ValidationError::Duplicate {
                field: "number".to_string(),
                value: number.to_string(),
            }
            .into());
        }

        let record = self
            .oplog
            .entry(
                OperationKind::Recover,
                actor,
                format!("gap {number} reconciled: {note}"),
            )
            .for_series(key)
            .with_numbers(None, Some(number));
        self.db.operations().insert(&record).await?;

        warn!(series = %key, number, "Numbering gap reconciled");
        Ok(record)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Current state of a series, served from the cache when warm.
    pub async fn get_series(&self, key: &SeriesKey) -> LedgerResult<Option<SequenceCounter>> {
        self.allocator.counter(key).await
    }

    /// Every configured series, read from the store.
    pub async fn list_series(&self) -> LedgerResult<Vec<SequenceCounter>> {
        let counters = self.db.counters().list().await?;
        for counter in &counters {
            self.allocator.cache().put(counter.clone());
        }
        Ok(counters)
    }

    pub async fn get_document(&self, document_id: &str) -> LedgerResult<IssuedDocument> {
        self.db
            .documents()
            .get_by_id(document_id)
            .await?
            .ok_or_else(|| FolioError::DocumentNotFound(document_id.to_string()).into())
    }

    pub async fn find_by_number(
        &self,
        key: &SeriesKey,
        number: i64,
    ) -> LedgerResult<Option<IssuedDocument>> {
        Ok(self.db.documents().find_by_number(key, number).await?)
    }

    /// Latest documents of a series, highest number first.
    pub async fn list_documents(
        &self,
        key: &SeriesKey,
        limit: u32,
    ) -> LedgerResult<Vec<IssuedDocument>> {
        Ok(self.db.documents().list_for_series(key, limit).await?)
    }

    /// Issuer settings for document rendering.
    pub async fn fiscal_config(&self) -> LedgerResult<FiscalConfig> {
        Ok(self.db.fiscal_config().load().await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require_counter(&self, key: &SeriesKey) -> LedgerResult<SequenceCounter> {
        self.db.counters().get(key).await?.ok_or_else(|| {
            FolioError::UnknownSeries {
                document_type: key.document_type,
                series: key.series.clone(),
            }
            .into()
        })
    }

    async fn refresh(&self, key: &SeriesKey) -> LedgerResult<SequenceCounter> {
        let counter = self.require_counter(key).await?;
        self.allocator.cache().put(counter.clone());
        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{DocumentState, DocumentTotals, DocumentType};
    use folio_db::DbConfig;

    async fn service() -> FolioService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        FolioService::new(db, ServiceSettings::new("pos-01"))
    }

    fn ticket_a() -> SeriesDefinition {
        SeriesDefinition {
            document_type: DocumentType::Ticket,
            series: "A".to_string(),
            prefix: "TKT-".to_string(),
            suffix: String::new(),
            width: 6,
            min: 1,
            max: 999_999,
            start: None,
            active: true,
        }
    }

    fn data(net: i64, tax: i64) -> DocumentData {
        DocumentData::new(DocumentTotals::from_net_and_tax(
            Money::from_cents(net),
            Money::from_cents(tax),
        ))
    }

    #[tokio::test]
    async fn test_configure_twice_is_duplicate() {
        let svc = service().await;
        svc.configure_series(&ticket_a(), "admin").await.unwrap();

        let err = svc.configure_series(&ticket_a(), "admin").await.unwrap_err();
        assert!(matches!(
            err.as_folio(),
            Some(FolioError::Validation(ValidationError::Duplicate { .. }))
        ));
    }

    #[tokio::test]
    async fn test_issue_next_writes_counter_and_document() {
        let svc = service().await;
        let key = svc.configure_series(&ticket_a(), "admin").await.unwrap().key();

        let doc = svc.issue_next(&key, data(1000, 100), "cashier-1").await.unwrap();
        assert_eq!(doc.number, 1);
        assert_eq!(doc.formatted_number, "TKT-A-000001");

        let counter = svc.get_series(&key).await.unwrap().unwrap();
        assert_eq!(counter.current_value, 2);

        let kinds: Vec<OperationKind> = svc
            .operation_history(&key, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.operation)
            .collect();
        assert!(kinds.contains(&OperationKind::Allocate));
        assert!(kinds.contains(&OperationKind::Issue));
    }

    #[tokio::test]
    async fn test_replace_links_original() {
        let svc = service().await;
        let key = svc.configure_series(&ticket_a(), "admin").await.unwrap().key();
        let original = svc.issue_next(&key, data(1000, 100), "cashier-1").await.unwrap();

        let replacement = svc
            .replace_document(&original.id, data(900, 90), "wrong amount", "manager")
            .await
            .unwrap();
        assert_eq!(replacement.number, 2);

        let original = svc.get_document(&original.id).await.unwrap();
        assert_eq!(original.state, DocumentState::Replaced);
        assert_eq!(original.replaced_by.as_deref(), Some(replacement.id.as_str()));

        let err = svc
            .replace_document(&original.id, data(900, 90), "again", "manager")
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_folio(),
            Some(FolioError::AlreadyAnnulled {
                state: DocumentState::Replaced,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_deactivated_series_rejects_allocation() {
        let svc = service().await;
        let key = svc.configure_series(&ticket_a(), "admin").await.unwrap().key();

        svc.set_series_active(&key, false, "admin").await.unwrap();
        let err = svc.allocate_next(&key, "cashier-1").await.unwrap_err();
        assert!(matches!(err.as_folio(), Some(FolioError::UnknownSeries { .. })));

        svc.set_series_active(&key, true, "admin").await.unwrap();
        assert_eq!(svc.allocate_next(&key, "cashier-1").await.unwrap().number, 1);
    }

    #[tokio::test]
    async fn test_reconcile_gap_bounds() {
        let svc = service().await;
        let key = svc.configure_series(&ticket_a(), "admin").await.unwrap().key();
        svc.allocate_next(&key, "cashier-1").await.unwrap();

        // Never handed out.
        let err = svc.reconcile_gap(&key, 5, "lost", "admin").await.unwrap_err();
        assert!(matches!(
            err.as_folio(),
            Some(FolioError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let record = svc.reconcile_gap(&key, 1, "printer jam", "admin").await.unwrap();
        assert_eq!(record.operation, OperationKind::Recover);
        assert_eq!(record.new_number, Some(1));
        assert_eq!(record.prev_number, None);
    }

    #[tokio::test]
    async fn test_get_document_missing() {
        let svc = service().await;
        let err = svc.get_document("missing").await.unwrap_err();
        assert!(matches!(err.as_folio(), Some(FolioError::DocumentNotFound(_))));
    }
}
