//! # Operation Log Repository
//!
//! Append-only access to `operation_log`.
//!
//! There is no update or delete here, and triggers reject both at the
//! storage layer.
//!
//! ## Recover Records
//! `recover` entries come in three shapes, told apart by their numbers:
//! ```text
//!   prev_number  new_number   meaning
//!   ───────────  ──────────   ──────────────────────────────
//!   old max      new max      bound raised
//!   NULL         gap number   gap reconciled
//!   NULL         NULL         series (de)activated
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use folio_core::{OperationRecord, SeriesKey};

const SELECT_RECORD: &str = r#"
    SELECT
        id, operation, document_type, series, prev_number, new_number,
        actor, description, recorded_at, terminal_origin
    FROM operation_log
"#;

/// Repository for the operation log.
#[derive(Debug, Clone)]
pub struct OperationLogRepository {
    pool: SqlitePool,
}

impl OperationLogRepository {
    /// Creates a new OperationLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OperationLogRepository { pool }
    }

    /// Appends a record.
    pub async fn insert(&self, record: &OperationRecord) -> DbResult<()> {
        debug!(
            id = %record.id,
            operation = %record.operation,
            "Appending operation record"
        );

        sqlx::query(
            r#"
            INSERT INTO operation_log (
                id, operation, document_type, series, prev_number, new_number,
                actor, description, recorded_at, terminal_origin
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&record.id)
        .bind(record.operation)
        .bind(record.document_type)
        .bind(&record.series)
        .bind(record.prev_number)
        .bind(record.new_number)
        .bind(&record.actor)
        .bind(&record.description)
        .bind(record.recorded_at)
        .bind(&record.terminal_origin)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent records of a series, newest first.
    pub async fn history(&self, key: &SeriesKey, limit: u32) -> DbResult<Vec<OperationRecord>> {
        let sql = format!(
            "{SELECT_RECORD} WHERE document_type = ?1 AND series = ?2 \
             ORDER BY recorded_at DESC, rowid DESC LIMIT ?3"
        );
        let records = sqlx::query_as::<_, OperationRecord>(&sql)
            .bind(key.document_type)
            .bind(&key.series)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Most recent records across all series, newest first.
    pub async fn recent(&self, limit: u32) -> DbResult<Vec<OperationRecord>> {
        let sql = format!("{SELECT_RECORD} ORDER BY recorded_at DESC, rowid DESC LIMIT ?1");
        let records = sqlx::query_as::<_, OperationRecord>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Numbers of a series that have a gap reconciliation on record.
    pub async fn reconciled_numbers(&self, key: &SeriesKey) -> DbResult<Vec<i64>> {
        let numbers: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT new_number
            FROM operation_log
            WHERE operation = 'recover'
              AND document_type = ?1 AND series = ?2
              AND prev_number IS NULL AND new_number IS NOT NULL
            ORDER BY new_number
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .fetch_all(&self.pool)
        .await?;

        Ok(numbers)
    }

    /// Total number of records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM operation_log")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
