//! # Fiscal Config Repository
//!
//! Key/value access to `fiscal_config`.
//!
//! Only `folio-admin init` writes here; the numbering core reads a
//! [`FiscalConfig`] snapshot.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use folio_core::FiscalConfig;

/// Repository for fiscal configuration entries.
#[derive(Debug, Clone)]
pub struct FiscalConfigRepository {
    pool: SqlitePool,
}

impl FiscalConfigRepository {
    /// Creates a new FiscalConfigRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FiscalConfigRepository { pool }
    }

    /// Gets a single value.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM fiscal_config WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Inserts or replaces a value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, "Setting fiscal config entry");

        sqlx::query(
            r#"
            INSERT INTO fiscal_config (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads every entry into a snapshot.
    pub async fn load(&self) -> DbResult<FiscalConfig> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM fiscal_config ORDER BY key")
                .fetch_all(&self.pool)
                .await?;

        Ok(FiscalConfig::new(rows.into_iter().collect::<BTreeMap<_, _>>()))
    }
}
