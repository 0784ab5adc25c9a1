//! # Counter Repository
//!
//! Database operations for `sequence_counters`.
//!
//! ## Allocation Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  One allocation, one transaction                        │
//! │                                                                         │
//! │  BEGIN (deferred)                                                      │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  lock_active()   UPDATE ... SET current_value = current_value          │
//! │     │            First statement is a write: takes SQLite's RESERVED   │
//! │     │            lock, so no other connection (or process) can write   │
//! │     │            until we finish. 0 rows → no active counter.          │
//! │     ▼                                                                   │
//! │  fetch_locked()  SELECT the row; nobody else can change it now         │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  bound check     current <= max (done by the caller)                   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  advance()       UPDATE current_value = current_value + 1              │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  COMMIT          (drop without commit = ROLLBACK)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use folio_core::{SequenceCounter, SeriesKey};

/// Repository for sequence counter operations.
#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
}

impl CounterRepository {
    /// Creates a new CounterRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CounterRepository { pool }
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Inserts a new counter.
    ///
    /// ## Errors
    /// `UniqueViolation` when the (type, series) already exists.
    pub async fn insert(&self, counter: &SequenceCounter) -> DbResult<()> {
        debug!(
            document_type = %counter.document_type,
            series = %counter.series,
            start = counter.current_value,
            "Inserting sequence counter"
        );

        sqlx::query(
            r#"
            INSERT INTO sequence_counters (
                document_type, series, current_value, min_value, max_value,
                prefix, suffix, width, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(counter.document_type)
        .bind(&counter.series)
        .bind(counter.current_value)
        .bind(counter.min_value)
        .bind(counter.max_value)
        .bind(&counter.prefix)
        .bind(&counter.suffix)
        .bind(counter.width)
        .bind(counter.active)
        .bind(counter.created_at)
        .bind(counter.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: counter.key().to_string(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Gets a counter by key, active or not.
    pub async fn get(&self, key: &SeriesKey) -> DbResult<Option<SequenceCounter>> {
        let counter = sqlx::query_as::<_, SequenceCounter>(
            r#"
            SELECT
                document_type, series, current_value, min_value, max_value,
                prefix, suffix, width, active, created_at, updated_at
            FROM sequence_counters
            WHERE document_type = ?1 AND series = ?2
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counter)
    }

    /// Lists every counter ordered by type then series.
    pub async fn list(&self) -> DbResult<Vec<SequenceCounter>> {
        let counters = sqlx::query_as::<_, SequenceCounter>(
            r#"
            SELECT
                document_type, series, current_value, min_value, max_value,
                prefix, suffix, width, active, created_at, updated_at
            FROM sequence_counters
            ORDER BY document_type, series
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(counters)
    }

    /// Raises the upper bound of a counter.
    ///
    /// Never lowers it: returns `false` when `new_max` is below the stored
    /// bound. `NotFound` when the counter doesn't exist.
    pub async fn raise_max(&self, key: &SeriesKey, new_max: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sequence_counters SET
                max_value = ?3,
                updated_at = ?4
            WHERE document_type = ?1 AND series = ?2 AND max_value <= ?3
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .bind(new_max)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(key).await? {
                Some(_) => Ok(false),
                None => Err(DbError::not_found("Sequence counter", key.to_string())),
            };
        }

        Ok(true)
    }

    /// Activates or deactivates a counter.
    pub async fn set_active(&self, key: &SeriesKey, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sequence_counters SET
                active = ?3,
                updated_at = ?4
            WHERE document_type = ?1 AND series = ?2
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sequence counter", key.to_string()));
        }

        Ok(())
    }

    // =========================================================================
    // Transaction Steps
    // =========================================================================

    /// Takes the write lock on an active counter row.
    ///
    /// Must be the first statement of the transaction. Returns `false` when
    /// no active counter exists for `key`.
    pub async fn lock_active(conn: &mut SqliteConnection, key: &SeriesKey) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sequence_counters SET
                current_value = current_value
            WHERE document_type = ?1 AND series = ?2 AND active = 1
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Reads a counter inside the transaction that locked it.
    pub async fn fetch_locked(
        conn: &mut SqliteConnection,
        key: &SeriesKey,
    ) -> DbResult<SequenceCounter> {
        let counter = sqlx::query_as::<_, SequenceCounter>(
            r#"
            SELECT
                document_type, series, current_value, min_value, max_value,
                prefix, suffix, width, active, created_at, updated_at
            FROM sequence_counters
            WHERE document_type = ?1 AND series = ?2
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .fetch_optional(&mut *conn)
        .await?;

        counter.ok_or_else(|| DbError::not_found("Sequence counter", key.to_string()))
    }

    /// Moves the counter past `number`.
    ///
    /// `number` must equal the stored `current_value`; anything else means the
    /// lock was not held and is reported as a failed query.
    pub async fn advance(
        conn: &mut SqliteConnection,
        key: &SeriesKey,
        number: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sequence_counters SET
                current_value = current_value + 1,
                updated_at = ?4
            WHERE document_type = ?1 AND series = ?2 AND current_value = ?3
            "#,
        )
        .bind(key.document_type)
        .bind(&key.series)
        .bind(number)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() != 1 {
            return Err(DbError::QueryFailed(format!(
                "counter {key} moved while locked (expected current {number})"
            )));
        }

        Ok(())
    }
}
