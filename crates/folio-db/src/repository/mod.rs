//! # Repository Module
//!
//! Database repository implementations for the folio ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  folio-ledger                                                          │
//! │       │                                                                 │
//! │       │  db.documents().get_by_id(&id)          pool-backed reads      │
//! │       │  CounterRepository::lock_active(&mut tx) transaction steps     │
//! │       ▼                                                                 │
//! │  ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐        │
//! │  │CounterRepository │ │DocumentRepository│ │OperationLogRepo  │        │
//! │  │sequence_counters │ │issued_documents  │ │operation_log     │        │
//! │  └──────────────────┘ └──────────────────┘ └──────────────────┘        │
//! │                     ┌──────────────────────┐                            │
//! │                     │FiscalConfigRepository│                            │
//! │                     │fiscal_config         │                            │
//! │                     └──────────────────────┘                            │
//! │                                                                         │
//! │  Methods on `&self` run on the pool (autocommit). Associated           │
//! │  functions taking `&mut SqliteConnection` run inside a caller-owned    │
//! │  transaction, so allocation and issuance can share one commit.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`counter::CounterRepository`] - Sequence counters and the allocation lock
//! - [`document::DocumentRepository`] - Issued documents and period aggregates
//! - [`operation_log::OperationLogRepository`] - Append-only audit trail
//! - [`fiscal_config::FiscalConfigRepository`] - Issuer identity key/values

pub mod counter;
pub mod document;
pub mod fiscal_config;
pub mod operation_log;
