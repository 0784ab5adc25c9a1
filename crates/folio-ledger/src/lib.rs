//! # folio-ledger: Fiscal Numbering Service
//!
//! Allocates gap-free document numbers, issues and annuls documents,
//! audits the ledger.
//!
//! ## Module Organization
//! ```text
//! folio_ledger/
//! ├── config.rs     ◄─── TOML file + FOLIO_* environment overrides
//! ├── error.rs      ◄─── LedgerError / LedgerResult
//! ├── gate.rs       ◄─── Per-series FIFO gate with optional timeout
//! ├── allocator.rs  ◄─── Gate + store transaction + counter cache
//! ├── ledger.rs     ◄─── Issue / annul
//! ├── auditor.rs    ◄─── Gap and hash scan
//! ├── oplog.rs      ◄─── Operation log writer, failure alerts
//! └── service.rs    ◄─── FolioService facade
//! ```
//!
//! ## Quick Start
//! ```rust,ignore
//! use folio_ledger::{FolioService, LedgerConfig};
//! use folio_core::{DocumentData, DocumentType, SeriesKey};
//!
//! let config = LedgerConfig::load(None)?;
//! let service = FolioService::open(&config).await?;
//!
//! let key = SeriesKey::new(DocumentType::Ticket, "A");
//! let allocation = service.allocate_next(&key, "cashier-7").await?;
//! let doc = service.issue_document(&allocation, data, "cashier-7").await?;
//! ```
//!
//! ## Alerts
//! Fatal conditions (duplicate numbers, hash mismatches, an operation log
//! that keeps failing) are logged at ERROR on the [`ALERT_TARGET`] target so
//! a subscriber can route them separately.

pub mod allocator;
pub mod auditor;
pub mod config;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod oplog;
pub mod service;

pub use allocator::{CounterCache, SequenceAllocator};
pub use auditor::IntegrityAuditor;
pub use config::{LedgerConfig, ServiceSettings};
pub use error::{LedgerError, LedgerResult};
pub use gate::{ConcurrencyGate, GatePermit};
pub use ledger::DocumentLedger;
pub use oplog::OperationLog;
pub use service::FolioService;

/// Tracing target for conditions that need a human.
pub const ALERT_TARGET: &str = "folio::alert";
