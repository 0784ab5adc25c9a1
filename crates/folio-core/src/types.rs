//! # Domain Types
//!
//! Core domain types for fiscal document numbering.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ SequenceCounter  │   │  IssuedDocument  │   │ OperationRecord  │    │
//! │  │ ───────────────  │   │ ───────────────  │   │ ───────────────  │    │
//! │  │ (type, series)   │──►│ (type, series,   │   │ operation        │    │
//! │  │ current          │   │  number)         │   │ prev/new number  │    │
//! │  │ min / max        │   │ formatted_number │   │ actor            │    │
//! │  │ prefix / width   │   │ state            │   │ terminal_origin  │    │
//! │  └──────────────────┘   │ integrity_hash   │   └──────────────────┘    │
//! │                         └──────────────────┘                            │
//! │                                                                         │
//! │  Allocation ── returned by the allocator, consumed by the ledger       │
//! │  IntegrityReport / Statistics ── read-only reports                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Counter Semantics
//! `current_value` is the NEXT number to hand out. A fresh counter starting
//! at 1 has `current_value = 1`; after one allocation it reads 2.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::folio::FolioFormat;
use crate::money::Money;

// =============================================================================
// Document Type
// =============================================================================

/// The kind of fiscal document a folio is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Simplified receipt handed over at the table.
    Ticket,
    /// Full invoice with customer identification.
    Invoice,
    /// Rectifying document that reverses (part of) a prior invoice.
    CreditNote,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [
        DocumentType::Ticket,
        DocumentType::Invoice,
        DocumentType::CreditNote,
    ];

    /// Storage / wire representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Ticket => "ticket",
            DocumentType::Invoice => "invoice",
            DocumentType::CreditNote => "credit_note",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ticket" => Ok(DocumentType::Ticket),
            "invoice" => Ok(DocumentType::Invoice),
            "credit_note" | "credit-note" | "creditnote" => Ok(DocumentType::CreditNote),
            _ => Err(ValidationError::NotAllowed {
                field: "document_type".to_string(),
                allowed: DocumentType::ALL.iter().map(|t| t.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Series Key
// =============================================================================

/// Composite identity of an independently numbered stream.
///
/// Used as the key of the allocation gate, the counter cache and every
/// repository lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SeriesKey {
    pub document_type: DocumentType,
    pub series: String,
}

impl SeriesKey {
    pub fn new(document_type: DocumentType, series: impl Into<String>) -> Self {
        SeriesKey {
            document_type,
            series: series.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_type, self.series)
    }
}

// =============================================================================
// Sequence Counter
// =============================================================================

/// Durable counter for one (document type, series).
///
/// ## Invariants
/// - `current_value` never decreases
/// - a number `n` is valid only if `min_value <= n <= max_value`
/// - `max_value <= 10^width - 1`, so every folio renders with exactly
///   `width` digits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SequenceCounter {
    pub document_type: DocumentType,
    pub series: String,
    /// Next number to hand out.
    pub current_value: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub prefix: String,
    pub suffix: String,
    /// Zero-padding width of the numeric part.
    pub width: u32,
    pub active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SequenceCounter {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.document_type, self.series.clone())
    }

    pub fn format(&self) -> FolioFormat {
        FolioFormat::new(self.prefix.clone(), self.width, self.suffix.clone())
    }

    /// True when the next allocation would exceed `max_value`.
    pub fn is_exhausted(&self) -> bool {
        self.current_value > self.max_value
    }

    /// Numbers still available before exhaustion.
    pub fn remaining(&self) -> i64 {
        (self.max_value - self.current_value + 1).max(0)
    }

    /// The number just below `current_value`, when it lies within bounds.
    ///
    /// For a counter that started at `min_value` this is the last number
    /// handed out.
    pub fn last_allocated(&self) -> Option<i64> {
        (self.current_value > self.min_value).then(|| self.current_value - 1)
    }
}

/// Configuration-time description of a series.
///
/// ## TOML Example
/// ```toml
/// [[series]]
/// document_type = "ticket"
/// series = "A"
/// prefix = "TKT-"
/// width = 6
/// min = 1
/// max = 999999
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SeriesDefinition {
    pub document_type: DocumentType,
    pub series: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    pub width: u32,
    #[serde(default = "default_min")]
    pub min: i64,
    pub max: i64,
    /// First number to hand out. Defaults to `min`.
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_min() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl SeriesDefinition {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.document_type, self.series.clone())
    }

    pub fn start_value(&self) -> i64 {
        self.start.unwrap_or(self.min)
    }
}

// =============================================================================
// Allocation
// =============================================================================

/// A number handed out by the allocator and not yet bound to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Allocation {
    pub document_type: DocumentType,
    pub series: String,
    pub number: i64,
    pub formatted_number: String,
    #[ts(as = "String")]
    pub allocated_at: DateTime<Utc>,
    pub terminal_origin: String,
}

impl Allocation {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.document_type, self.series.clone())
    }
}

// =============================================================================
// Document State
// =============================================================================

/// Lifecycle of an issued document.
///
/// ```text
///            ┌──────────► Annulled
///  Emitted ──┤
///            └──────────► Replaced
/// ```
/// Both terminal states keep the row and its number forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Emitted,
    Annulled,
    Replaced,
}

impl Default for DocumentState {
    fn default() -> Self {
        DocumentState::Emitted
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Emitted => write!(f, "emitted"),
            DocumentState::Annulled => write!(f, "annulled"),
            DocumentState::Replaced => write!(f, "replaced"),
        }
    }
}

// =============================================================================
// Document Data
// =============================================================================

/// Monetary totals of a document, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentTotals {
    pub gross: Money,
    pub net: Money,
    pub tax: Money,
}

impl DocumentTotals {
    pub fn new(gross: Money, net: Money, tax: Money) -> Self {
        DocumentTotals { gross, net, tax }
    }

    /// Builds totals from net and tax; gross is their sum.
    pub fn from_net_and_tax(net: Money, tax: Money) -> Self {
        DocumentTotals {
            gross: net + tax,
            net,
            tax,
        }
    }
}

/// Everything a caller supplies to issue a document for an allocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentData {
    pub sale_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub totals: DocumentTotals,
}

impl DocumentData {
    pub fn new(totals: DocumentTotals) -> Self {
        DocumentData {
            sale_ref: None,
            customer_ref: None,
            totals,
        }
    }

    pub fn with_sale(mut self, sale_ref: impl Into<String>) -> Self {
        self.sale_ref = Some(sale_ref.into());
        self
    }

    pub fn with_customer(mut self, customer_ref: impl Into<String>) -> Self {
        self.customer_ref = Some(customer_ref.into());
        self
    }
}

// =============================================================================
// Issued Document
// =============================================================================

/// A row of the fiscal ledger.
///
/// `document_type`, `series`, `number`, `formatted_number`, `gross_cents`
/// and `issued_at` are immutable after creation; the integrity hash covers
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct IssuedDocument {
    pub id: String,
    pub document_type: DocumentType,
    pub series: String,
    pub number: i64,
    pub formatted_number: String,
    pub sale_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub gross_cents: i64,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub state: DocumentState,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    pub issued_by: String,
    #[ts(as = "Option<String>")]
    pub annulled_at: Option<DateTime<Utc>>,
    pub annul_reason: Option<String>,
    /// Id of the document that replaced this one.
    pub replaced_by: Option<String>,
    pub integrity_hash: String,
    pub terminal_origin: String,
}

impl IssuedDocument {
    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.document_type, self.series.clone())
    }

    #[inline]
    pub fn gross(&self) -> Money {
        Money::from_cents(self.gross_cents)
    }

    pub fn totals(&self) -> DocumentTotals {
        DocumentTotals::new(
            Money::from_cents(self.gross_cents),
            Money::from_cents(self.net_cents),
            Money::from_cents(self.tax_cents),
        )
    }

    #[inline]
    pub fn is_emitted(&self) -> bool {
        self.state == DocumentState::Emitted
    }
}

// =============================================================================
// Operation Log
// =============================================================================

/// What an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Allocate,
    Issue,
    Annul,
    /// Administrative recovery: gap reconciliation, bound changes.
    Recover,
    Error,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::Allocate => "allocate",
            OperationKind::Issue => "issue",
            OperationKind::Annul => "annul",
            OperationKind::Recover => "recover",
            OperationKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// An append-only audit trail entry.
///
/// Error records for calls that never resolved a series (e.g. annulling an
/// unknown document id) carry no type/series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OperationRecord {
    pub id: String,
    pub operation: OperationKind,
    pub document_type: Option<DocumentType>,
    pub series: Option<String>,
    pub prev_number: Option<i64>,
    pub new_number: Option<i64>,
    pub actor: String,
    pub description: String,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
    pub terminal_origin: String,
}

impl OperationRecord {
    /// Starts a record stamped now with a fresh id.
    pub fn new(
        operation: OperationKind,
        actor: impl Into<String>,
        terminal_origin: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        OperationRecord {
            id: Uuid::new_v4().to_string(),
            operation,
            document_type: None,
            series: None,
            prev_number: None,
            new_number: None,
            actor: actor.into(),
            description: description.into(),
            recorded_at: Utc::now(),
            terminal_origin: terminal_origin.into(),
        }
    }

    pub fn for_series(mut self, key: &SeriesKey) -> Self {
        self.document_type = Some(key.document_type);
        self.series = Some(key.series.clone());
        self
    }

    pub fn with_numbers(mut self, prev: Option<i64>, new: Option<i64>) -> Self {
        self.prev_number = prev;
        self.new_number = new;
        self
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Result of an integrity scan over one series.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IntegrityReport {
    /// Rows scanned.
    pub checked: u64,
    pub first_number: Option<i64>,
    pub last_number: Option<i64>,
    /// Every missing integer between the lowest and highest issued number.
    pub gaps: Vec<i64>,
    /// Ids of documents whose stored hash or folio differs from the one
    /// recomputed from their fields.
    pub hash_mismatches: Vec<String>,
    /// Gaps with a recorded reconciliation.
    pub reconciled_gaps: Vec<i64>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.gaps.is_empty() && self.hash_mismatches.is_empty()
    }

    /// Gaps nobody has reconciled yet.
    pub fn unreconciled_gaps(&self) -> Vec<i64> {
        self.gaps
            .iter()
            .copied()
            .filter(|g| !self.reconciled_gaps.contains(g))
            .collect()
    }
}

/// 9999-12-31T23:59:59Z
const END_OF_YEAR_9999: i64 = 253_402_300_799;

/// Half-open reporting window `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatsPeriod {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
}

impl StatsPeriod {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        StatsPeriod { from, to }
    }

    /// From the Unix epoch to the end of year 9999.
    ///
    /// Bounds stay within four-digit years so they compare correctly against
    /// the RFC 3339 text SQLite stores.
    pub fn all_time() -> Self {
        StatsPeriod {
            from: DateTime::<Utc>::default(),
            to: DateTime::from_timestamp(END_OF_YEAR_9999, 0).unwrap_or_default(),
        }
    }
}

/// Where a series currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SeriesPosition {
    pub document_type: DocumentType,
    pub series: String,
    /// Next number to hand out.
    pub current: i64,
    pub max: i64,
    pub active: bool,
}

impl From<&SequenceCounter> for SeriesPosition {
    fn from(counter: &SequenceCounter) -> Self {
        SeriesPosition {
            document_type: counter.document_type,
            series: counter.series.clone(),
            current: counter.current_value,
            max: counter.max_value,
            active: counter.active,
        }
    }
}

/// Aggregates over a reporting period.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Statistics {
    /// Documents issued in the period, whatever their current state.
    pub issued_by_type: BTreeMap<DocumentType, i64>,
    /// Documents annulled or replaced in the period.
    pub annulled_by_type: BTreeMap<DocumentType, i64>,
    /// Gross total of documents issued in the period and still emitted.
    pub emitted_gross_by_type: BTreeMap<DocumentType, Money>,
    pub current_numbers: Vec<SeriesPosition>,
}

// =============================================================================
// Fiscal Config
// =============================================================================

/// Issuer identity and related settings read by the document renderer.
///
/// A read-only snapshot; the numbering core never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FiscalConfig {
    pub entries: BTreeMap<String, String>,
}

impl FiscalConfig {
    pub const ISSUER_NAME: &'static str = "issuer_name";
    pub const ISSUER_TAX_ID: &'static str = "issuer_tax_id";
    pub const ISSUER_ADDRESS: &'static str = "issuer_address";

    pub fn new(entries: BTreeMap<String, String>) -> Self {
        FiscalConfig { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn issuer_name(&self) -> Option<&str> {
        self.get(Self::ISSUER_NAME)
    }

    pub fn issuer_tax_id(&self) -> Option<&str> {
        self.get(Self::ISSUER_TAX_ID)
    }

    pub fn issuer_address(&self) -> Option<&str> {
        self.get(Self::ISSUER_ADDRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(current: i64, min: i64, max: i64) -> SequenceCounter {
        let now = Utc::now();
        SequenceCounter {
            document_type: DocumentType::Ticket,
            series: "A".to_string(),
            current_value: current,
            min_value: min,
            max_value: max,
            prefix: "TKT-".to_string(),
            suffix: String::new(),
            width: 6,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_document_type_round_trip() {
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), t);
        }
        assert_eq!(
            "Credit-Note".parse::<DocumentType>().unwrap(),
            DocumentType::CreditNote
        );
        assert!("receipt".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_series_key_display() {
        let key = SeriesKey::new(DocumentType::Invoice, "F1");
        assert_eq!(key.to_string(), "invoice/F1");
    }

    #[test]
    fn test_counter_exhaustion() {
        assert!(!counter(999, 1, 999).is_exhausted());
        assert_eq!(counter(999, 1, 999).remaining(), 1);
        assert!(counter(1000, 1, 999).is_exhausted());
        assert_eq!(counter(1000, 1, 999).remaining(), 0);
    }

    #[test]
    fn test_last_allocated() {
        assert_eq!(counter(1, 1, 999).last_allocated(), None);
        assert_eq!(counter(6, 1, 999).last_allocated(), Some(5));
    }

    #[test]
    fn test_unreconciled_gaps() {
        let report = IntegrityReport {
            gaps: vec![3, 7, 9],
            reconciled_gaps: vec![7],
            ..Default::default()
        };
        assert_eq!(report.unreconciled_gaps(), vec![3, 9]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_totals_from_net_and_tax() {
        let totals = DocumentTotals::from_net_and_tax(Money::from_cents(10000), Money::from_cents(1900));
        assert_eq!(totals.gross.cents(), 11900);
    }

    #[test]
    fn test_series_definition_defaults() {
        let def: SeriesDefinition = serde_json::from_str(
            r#"{"document_type":"invoice","series":"F1","width":8,"max":99999999}"#,
        )
        .unwrap();
        assert_eq!(def.min, 1);
        assert_eq!(def.start_value(), 1);
        assert!(def.active);
        assert_eq!(def.prefix, "");
    }

    #[test]
    fn test_fiscal_config_getters() {
        let mut entries = BTreeMap::new();
        entries.insert("issuer_name".to_string(), "La Tasca SL".to_string());
        entries.insert("issuer_tax_id".to_string(), "B12345678".to_string());
        let config = FiscalConfig::new(entries);

        assert_eq!(config.issuer_name(), Some("La Tasca SL"));
        assert_eq!(config.issuer_tax_id(), Some("B12345678"));
        assert_eq!(config.issuer_address(), None);
    }
}
