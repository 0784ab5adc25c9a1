//! Shared fixtures for folio-ledger integration tests.

#![allow(dead_code)]

use std::time::Duration;

use tempfile::TempDir;

use folio_core::{DocumentData, DocumentTotals, DocumentType, Money, SeriesDefinition, SeriesKey};
use folio_db::{Database, DbConfig};
use folio_ledger::{FolioService, ServiceSettings};

pub const CASHIER: &str = "cashier-1";
pub const MANAGER: &str = "manager";

/// A file-backed store in a temporary directory.
///
/// File-backed rather than `:memory:` so several pools can share it.
pub struct TestStore {
    pub dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        TestStore {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.dir.path().join("folio.db"))
            .max_connections(4)
            .busy_timeout(Duration::from_secs(10))
    }

    pub async fn open(&self) -> Database {
        Database::new(self.db_config()).await.unwrap()
    }

    pub async fn service(&self, terminal_id: &str) -> FolioService {
        FolioService::new(self.open().await, ServiceSettings::new(terminal_id))
    }
}

pub async fn memory_service() -> FolioService {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    FolioService::new(db, ServiceSettings::new("pos-01"))
}

pub fn ticket_a() -> SeriesDefinition {
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

pub fn invoice_f1() -> SeriesDefinition {
    SeriesDefinition {
        document_type: DocumentType::Invoice,
        series: "F1".to_string(),
        prefix: "FAC-".to_string(),
        suffix: String::new(),
        width: 6,
        min: 1,
        max: 999_999,
        start: None,
        active: true,
    }
}

pub async fn configured(service: &FolioService, definition: SeriesDefinition) -> SeriesKey {
    service
        .configure_series(&definition, "admin")
        .await
        .unwrap()
        .key()
}

/// Net plus tax, gross derived.
pub fn totals(net: i64, tax: i64) -> DocumentData {
    DocumentData::new(DocumentTotals::from_net_and_tax(
        Money::from_cents(net),
        Money::from_cents(tax),
    ))
}
