//! # Document Repository
//!
//! Database operations for `issued_documents`, the fiscal ledger.
//!
//! ## Document Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Document Lifecycle                                │
//! │                                                                         │
//! │  1. ISSUE                                                              │
//! │     └── insert() → state = emitted                                     │
//! │         UNIQUE (type, series, number) rejects a second row             │
//! │                                                                         │
//! │  2a. ANNUL                                                             │
//! │     └── annul() → state = annulled, annulled_at, annul_reason          │
//! │                                                                         │
//! │  2b. REPLACE                                                           │
//! │     └── mark_replaced_with() → state = replaced, replaced_by           │
//! │                                                                         │
//! │  Rows are never deleted (trigger) and number / formatted_number /      │
//! │  totals / issued_at are never updated by this repository.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use folio_core::{DocumentType, IssuedDocument, SeriesKey, StatsPeriod};

const SELECT_DOCUMENT: &str = r#"
    SELECT
        id, document_type, series, number, formatted_number,
        sale_ref, customer_ref, gross_cents, net_cents, tax_cents,
        state, issued_at, issued_by, annulled_at, annul_reason,
        replaced_by, integrity_hash, terminal_origin
    FROM issued_documents
"#;

/// Repository for issued document operations.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
}

impl DocumentRepository {
    /// Creates a new DocumentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentRepository { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a document in its own autocommit statement.
    pub async fn insert(&self, doc: &IssuedDocument) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_with(&mut conn, doc).await
    }

    /// Inserts a document on a caller-owned connection or transaction.
    ///
    /// ## Errors
    /// `UniqueViolation` on `issued_documents.*` when the number (or its
    /// formatted form) is already in the ledger.
    pub async fn insert_with(conn: &mut SqliteConnection, doc: &IssuedDocument) -> DbResult<()> {
        debug!(
            id = %doc.id,
            formatted_number = %doc.formatted_number,
            "Inserting issued document"
        );

        sqlx::query(
            r#"
            INSERT INTO issued_documents (
                id, document_type, series, number, formatted_number,
                sale_ref, customer_ref, gross_cents, net_cents, tax_cents,
                state, issued_at, issued_by, annulled_at, annul_reason,
                replaced_by, integrity_hash, terminal_origin
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18
            )
            "#,
        )
        .bind(&doc.id)
        .bind(doc.document_type)
        .bind(&doc.series)
        .bind(doc.number)
        .bind(&doc.formatted_number)
        .bind(&doc.sale_ref)
        .bind(&doc.customer_ref)
        .bind(doc.gross_cents)
        .bind(doc.net_cents)
        .bind(doc.tax_cents)
        .bind(doc.state)
        .bind(doc.issued_at)
        .bind(&doc.issued_by)
        .bind(doc.annulled_at)
        .bind(&doc.annul_reason)
        .bind(&doc.replaced_by)
        .bind(&doc.integrity_hash)
        .bind(&doc.terminal_origin)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Transitions an emitted document to annulled.
    ///
    /// Returns `false` when the document is missing or no longer emitted.
    pub async fn annul(&self, id: &str, reason: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE issued_documents SET
                state = 'annulled',
                annulled_at = ?2,
                annul_reason = ?3
            WHERE id = ?1 AND state = 'emitted'
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Transitions an emitted document to replaced, pointing at its successor.
    ///
    /// Returns `false` when the document is no longer emitted.
    pub async fn mark_replaced_with(
        conn: &mut SqliteConnection,
        id: &str,
        replaced_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE issued_documents SET
                state = 'replaced',
                replaced_by = ?2,
                annulled_at = ?3,
                annul_reason = ?4
            WHERE id = ?1 AND state = 'emitted'
            "#,
        )
        .bind(id)
        .bind(replaced_by)
        .bind(at)
        .bind(reason)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a document by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<IssuedDocument>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_by_id_with(&mut conn, id).await
    }

    /// Gets a document by ID on a caller-owned connection or transaction.
    pub async fn get_by_id_with(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<IssuedDocument>> {
        let sql = format!("{SELECT_DOCUMENT} WHERE id = ?1");
        let doc = sqlx::query_as::<_, IssuedDocument>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(doc)
    }

    /// Gets the document holding `number` in a series.
    pub async fn find_by_number(
        &self,
        key: &SeriesKey,
        number: i64,
    ) -> DbResult<Option<IssuedDocument>> {
        let sql = format!("{SELECT_DOCUMENT} WHERE document_type = ?1 AND series = ?2 AND number = ?3");
        let doc = sqlx::query_as::<_, IssuedDocument>(&sql)
            .bind(key.document_type)
            .bind(&key.series)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(doc)
    }

    /// Most recent documents of a series, highest number first.
    pub async fn list_for_series(
        &self,
        key: &SeriesKey,
        limit: u32,
    ) -> DbResult<Vec<IssuedDocument>> {
        let sql = format!(
            "{SELECT_DOCUMENT} WHERE document_type = ?1 AND series = ?2 ORDER BY number DESC LIMIT ?3"
        );
        let docs = sqlx::query_as::<_, IssuedDocument>(&sql)
            .bind(key.document_type)
            .bind(&key.series)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(docs)
    }

    /// Every document of a series in number order.
    ///
    /// Used by the integrity auditor.
    pub async fn scan_series(&self, key: &SeriesKey) -> DbResult<Vec<IssuedDocument>> {
        let sql =
            format!("{SELECT_DOCUMENT} WHERE document_type = ?1 AND series = ?2 ORDER BY number ASC");
        let docs = sqlx::query_as::<_, IssuedDocument>(&sql)
            .bind(key.document_type)
            .bind(&key.series)
            .fetch_all(&self.pool)
            .await?;

        Ok(docs)
    }

    /// Total number of documents in the ledger.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM issued_documents")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Period Aggregates
    // =========================================================================

    /// Documents issued in the period, per type, whatever their state.
    pub async fn count_issued_by_type(
        &self,
        period: &StatsPeriod,
    ) -> DbResult<Vec<(DocumentType, i64)>> {
        let rows = sqlx::query_as::<_, (DocumentType, i64)>(
            r#"
            SELECT document_type, COUNT(*)
            FROM issued_documents
            WHERE issued_at >= ?1 AND issued_at < ?2
            GROUP BY document_type
            "#,
        )
        .bind(period.from)
        .bind(period.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Documents annulled or replaced in the period, per type.
    pub async fn count_annulled_by_type(
        &self,
        period: &StatsPeriod,
    ) -> DbResult<Vec<(DocumentType, i64)>> {
        let rows = sqlx::query_as::<_, (DocumentType, i64)>(
            r#"
            SELECT document_type, COUNT(*)
            FROM issued_documents
            WHERE annulled_at IS NOT NULL
              AND annulled_at >= ?1 AND annulled_at < ?2
            GROUP BY document_type
            "#,
        )
        .bind(period.from)
        .bind(period.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Gross total in minor units of documents issued in the period and
    /// still emitted, per type.
    pub async fn emitted_gross_by_type(
        &self,
        period: &StatsPeriod,
    ) -> DbResult<Vec<(DocumentType, i64)>> {
        let rows = sqlx::query_as::<_, (DocumentType, i64)>(
            r#"
            SELECT document_type, SUM(gross_cents)
            FROM issued_documents
            WHERE state = 'emitted'
              AND issued_at >= ?1 AND issued_at < ?2
            GROUP BY document_type
            "#,
        )
        .bind(period.from)
        .bind(period.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
