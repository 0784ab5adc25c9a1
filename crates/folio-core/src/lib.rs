//! # folio-core: Pure Logic for Fiscal Document Numbering
//!
//! Everything about folios that can be decided without touching storage:
//! the domain types, how a number is rendered, how a document is
//! fingerprinted, and which inputs are acceptable.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Folio Ledger Architecture                           │
//! │                                                                         │
//! │  Sales module / annulment UI / audit reports                           │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            folio-ledger (FolioService facade)                   │   │
//! │  │   gate ─► allocator ─► ledger ─► auditor ─► operation log      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ folio-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌───────────┐ ┌────────────┐         │   │
//! │  │   │  types  │ │  folio  │ │ integrity │ │ validation │         │   │
//! │  │   │ Counter │ │ format  │ │  SHA-256  │ │   rules    │         │   │
//! │  │   │Document │ │ parse   │ │  hashing  │ │            │         │   │
//! │  │   └─────────┘ └─────────┘ └───────────┘ └────────────┘         │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    folio-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Counters, issued documents, operation records, reports
//! - [`folio`] - Folio number formatting and parsing
//! - [`integrity`] - Integrity hash over a document's immutable fields
//! - [`money`] - Fixed-point money in minor units
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use folio_core::folio::FolioFormat;
//!
//! let format = FolioFormat::new("TKT-", 6, "");
//! assert_eq!(format.format("A", 1), "TKT-A-000001");
//!
//! let parsed = format.parse("TKT-A-000001").unwrap();
//! assert_eq!(parsed.series, "A");
//! assert_eq!(parsed.number, 1);
//! ```

pub mod error;
pub mod folio;
pub mod integrity;
pub mod money;
pub mod types;
pub mod validation;

pub use error::{CoreResult, FolioError, ValidationError};
pub use folio::{FolioFormat, ParsedFolio};
pub use money::Money;
pub use types::*;

/// Widest zero-padding a counter may use.
///
/// 18 digits keep `10^width - 1` inside `i64`.
pub const MAX_FOLIO_WIDTH: u32 = 18;

/// Maximum length of a series identifier.
pub const MAX_SERIES_LEN: usize = 20;

/// Maximum length of an annulment/replacement reason.
pub const MAX_REASON_LEN: usize = 500;

/// Maximum length of an actor identifier.
pub const MAX_ACTOR_LEN: usize = 100;
