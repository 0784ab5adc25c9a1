//! # Operation Log
//!
//! Append-only audit trail writer.
//!
//! ## Failure Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record(entry)                                                          │
//! │     │                                                                   │
//! │     ├── insert ok     → consecutive_failures = 0                        │
//! │     │                                                                   │
//! │     └── insert failed → warn!, consecutive_failures += 1                │
//! │                           │                                             │
//! │                           └── every `alert_threshold` failures in a row │
//! │                               → error!(target: "folio::alert")         │
//! │                                                                         │
//! │  The caller's primary operation never sees the failure.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, warn};

use folio_core::{OperationKind, OperationRecord, SeriesKey};
use folio_db::{Database, OperationLogRepository};

use crate::error::LedgerError;
use crate::ALERT_TARGET;

/// Writes operation records without ever failing the caller.
#[derive(Debug, Clone)]
pub struct OperationLog {
    repo: OperationLogRepository,
    terminal_id: Arc<str>,
    alert_threshold: u32,
    consecutive_failures: Arc<AtomicU32>,
    alerts_raised: Arc<AtomicU64>,
}

impl OperationLog {
    pub fn new(db: &Database, terminal_id: &str, alert_threshold: u32) -> Self {
        OperationLog {
            repo: db.operations(),
            terminal_id: Arc::from(terminal_id),
            alert_threshold: alert_threshold.max(1),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            alerts_raised: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a record stamped with this terminal.
    pub fn entry(
        &self,
        operation: OperationKind,
        actor: &str,
        description: impl Into<String>,
    ) -> OperationRecord {
        OperationRecord::new(operation, actor, self.terminal_id.as_ref(), description)
    }

    /// Appends a record. Failures are logged and counted, never returned.
    pub async fn record(&self, record: OperationRecord) {
        match self.repo.insert(&record).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                warn!(
                    operation = %record.operation,
                    error = %e,
                    consecutive_failures = failures,
                    "Failed to append operation record"
                );

                if failures % self.alert_threshold == 0 {
                    self.alerts_raised.fetch_add(1, Ordering::SeqCst);
                    error!(
                        target: ALERT_TARGET,
                        consecutive_failures = failures,
                        terminal_id = %self.terminal_id,
                        "Operation log is not persisting; audit trail has holes"
                    );
                }
            }
        }
    }

    /// Records a failed call as an `error` entry.
    ///
    /// Fatal errors are also raised on the alert target.
    pub async fn record_failure(&self, key: Option<&SeriesKey>, actor: &str, err: &LedgerError) {
        if err.is_fatal() {
            error!(
                target: ALERT_TARGET,
                code = err.code(),
                series = ?key,
                terminal_id = %self.terminal_id,
                error = %err,
                "Fiscal numbering invariant violated"
            );
        }

        let mut record = self.entry(
            OperationKind::Error,
            actor,
            format!("{}: {}", err.code(), err),
        );
        if let Some(key) = key {
            record = record.for_series(key);
        }
        self.record(record).await;
    }

    /// Failures since the last successful append.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Alerts raised since startup.
    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::SeqCst)
    }

    pub fn terminal_id(&self) -> &str {
        &self.terminal_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::{DocumentType, FolioError};
    use folio_db::DbConfig;

    #[tokio::test]
    async fn test_record_and_failure_entry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let log = OperationLog::new(&db, "pos-01", 3);
        let key = SeriesKey::new(DocumentType::Ticket, "A");

        log.record(log.entry(OperationKind::Allocate, "cashier-1", "allocated TKT-A-000001"))
            .await;
        let err: LedgerError = FolioError::UnknownSeries {
            document_type: DocumentType::Ticket,
            series: "A".into(),
        }
        .into();
        log.record_failure(Some(&key), "cashier-1", &err).await;

        let history = db.operations().history(&key, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation, OperationKind::Error);
        assert!(history[0].description.starts_with("UNKNOWN_SERIES"));
        assert_eq!(history[0].terminal_origin, "pos-01");
        assert_eq!(db.operations().count().await.unwrap(), 2);
        assert_eq!(log.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed_and_alerted() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let log = OperationLog::new(&db, "pos-01", 2);
        db.close().await;

        for _ in 0..5 {
            log.record(log.entry(OperationKind::Issue, "cashier-1", "issued"))
                .await;
        }

        assert_eq!(log.consecutive_failures(), 5);
        assert_eq!(log.alerts_raised(), 2);
    }
}
