//! # Ledger Configuration
//!
//! Configuration for one terminal's folio service.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FOLIO_DB_PATH=/srv/pos/folio.db                                    │
//! │     FOLIO_TERMINAL_ID=pos-02                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ledger/folio.toml (Linux)                                │
//! │     ~/Library/Application Support/com.folio.ledger/folio.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated terminal id, no gate timeout                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! database_path = "/srv/pos/folio.db"
//! terminal_id = "pos-01"
//! gate_timeout_ms = 2000
//! oplog_alert_threshold = 3
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [fiscal]
//! issuer_name = "La Tasca SL"
//! issuer_tax_id = "B12345678"
//!
//! [[series]]
//! document_type = "ticket"
//! series = "A"
//! prefix = "TKT-"
//! width = 6
//! max = 999999
//! ```
//!
//! `[[series]]` and `[fiscal]` only seed a fresh store (`folio-admin init`);
//! at runtime the database is the source of truth.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use folio_core::validation::{validate_actor, validate_series_definition};
use folio_core::{SeriesDefinition, ValidationError};
use folio_db::DbConfig;

use crate::error::{LedgerError, LedgerResult};

const CONFIG_FILE_NAME: &str = "folio.toml";
const DATABASE_FILE_NAME: &str = "folio.db";

// =============================================================================
// Service Settings
// =============================================================================

/// Runtime knobs of a `FolioService`.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Identifies this terminal in documents and operation records.
    pub terminal_id: String,

    /// How long a caller may queue at the allocation gate.
    /// `None` waits indefinitely.
    pub gate_timeout: Option<Duration>,

    /// Consecutive operation log failures before an alert is raised.
    pub oplog_alert_threshold: u32,
}

impl ServiceSettings {
    pub fn new(terminal_id: impl Into<String>) -> Self {
        ServiceSettings {
            terminal_id: terminal_id.into(),
            gate_timeout: None,
            oplog_alert_threshold: default_alert_threshold(),
        }
    }

    pub fn gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = Some(timeout);
        self
    }

    pub fn oplog_alert_threshold(mut self, threshold: u32) -> Self {
        self.oplog_alert_threshold = threshold;
        self
    }
}

// =============================================================================
// Ledger Configuration
// =============================================================================

/// Complete configuration of a terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite file shared by every terminal of the restaurant.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Terminal identifier. Generated when absent.
    #[serde(default = "default_terminal_id")]
    pub terminal_id: String,

    /// Gate queue timeout in milliseconds. Absent = wait indefinitely.
    #[serde(default)]
    pub gate_timeout_ms: Option<u64>,

    /// Consecutive operation log failures before alerting.
    #[serde(default = "default_alert_threshold")]
    pub oplog_alert_threshold: u32,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for another terminal's lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Issuer identity seeded into `fiscal_config`.
    #[serde(default)]
    pub fiscal: BTreeMap<String, String>,

    /// Series seeded into `sequence_counters`.
    #[serde(default)]
    pub series: Vec<SeriesDefinition>,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "folio", "ledger")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DATABASE_FILE_NAME))
}

fn default_terminal_id() -> String {
    format!("terminal-{}", Uuid::new_v4())
}

fn default_alert_threshold() -> u32 {
    3
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: default_database_path(),
            terminal_id: default_terminal_id(),
            gate_timeout_ms: None,
            oplog_alert_threshold: default_alert_threshold(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            fiscal: BTreeMap::new(),
            series: Vec::new(),
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (explicit path, else the platform config dir)
    /// 3. Environment variables
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load(config_path: Option<PathBuf>) -> LedgerResult<Self> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                config = Self::parse_file(&path)?;
            } else if explicit {
                return Err(LedgerError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses and validates a TOML document, without environment overrides.
    pub fn from_toml_str(contents: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LedgerResult<()> {
        validate_actor(&self.terminal_id).map_err(|e| config_error("terminal_id", e))?;

        if self.oplog_alert_threshold == 0 {
            return Err(LedgerError::Config(
                "oplog_alert_threshold must be greater than 0".into(),
            ));
        }

        if self.max_connections == 0 {
            return Err(LedgerError::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.gate_timeout_ms == Some(0) {
            return Err(LedgerError::Config(
                "gate_timeout_ms must be greater than 0 when set".into(),
            ));
        }

        let mut seen = HashSet::new();
        for def in &self.series {
            validate_series_definition(def)
                .map_err(|e| config_error(&format!("series {}", def.key()), e))?;

            if !seen.insert(def.key()) {
                return Err(LedgerError::Config(format!(
                    "series {} is defined more than once",
                    def.key()
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FOLIO_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database_path = PathBuf::from(path);
        }

        if let Ok(id) = std::env::var("FOLIO_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal id from environment");
            self.terminal_id = id;
        }

        if let Ok(ms) = std::env::var("FOLIO_GATE_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(v) => self.gate_timeout_ms = Some(v),
                Err(_) => warn!(value = %ms, "Ignoring invalid FOLIO_GATE_TIMEOUT_MS"),
            }
        }

        if let Ok(threshold) = std::env::var("FOLIO_OPLOG_ALERT_THRESHOLD") {
            match threshold.parse::<u32>() {
                Ok(v) => self.oplog_alert_threshold = v,
                Err(_) => warn!(value = %threshold, "Ignoring invalid FOLIO_OPLOG_ALERT_THRESHOLD"),
            }
        }

        if let Ok(max) = std::env::var("FOLIO_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(v) => self.max_connections = v,
                Err(_) => warn!(value = %max, "Ignoring invalid FOLIO_MAX_CONNECTIONS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "folio", "ledger")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// Storage settings for `Database::new`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }

    /// Runtime settings for `FolioService::new`.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            terminal_id: self.terminal_id.clone(),
            gate_timeout: self.gate_timeout_ms.map(Duration::from_millis),
            oplog_alert_threshold: self.oplog_alert_threshold,
        }
    }
}

fn config_error(field: &str, err: ValidationError) -> LedgerError {
    LedgerError::Config(format!("{field}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::DocumentType;

    const SAMPLE: &str = r#"
        database_path = "/tmp/folio-test.db"
        terminal_id = "pos-01"
        gate_timeout_ms = 1500

        [fiscal]
        issuer_name = "La Tasca SL"

        [[series]]
        document_type = "ticket"
        series = "A"
        prefix = "TKT-"
        width = 6
        max = 999999

        [[series]]
        document_type = "invoice"
        series = "F1"
        prefix = "FAC-"
        width = 8
        max = 99999999
    "#;

    #[test]
    fn test_parse_sample() {
        let config = LedgerConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.terminal_id, "pos-01");
        assert_eq!(config.series.len(), 2);
        assert_eq!(config.series[0].document_type, DocumentType::Ticket);
        assert_eq!(config.series[0].min, 1);
        assert_eq!(config.fiscal.get("issuer_name").map(String::as_str), Some("La Tasca SL"));
        assert_eq!(config.oplog_alert_threshold, 3);

        let settings = config.service_settings();
        assert_eq!(settings.gate_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.db_config().max_connections, 5);
    }

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert!(config.terminal_id.starts_with("terminal-"));
        assert_eq!(config.gate_timeout_ms, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_series() {
        let toml = r#"
            terminal_id = "pos-01"

            [[series]]
            document_type = "ticket"
            series = "A"
            width = 6
            max = 999999

            [[series]]
            document_type = "ticket"
            series = "A"
            width = 4
            max = 9999
        "#;
        assert!(matches!(
            LedgerConfig::from_toml_str(toml),
            Err(LedgerError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_series_wider_than_width() {
        let toml = r#"
            terminal_id = "pos-01"

            [[series]]
            document_type = "ticket"
            series = "A"
            width = 3
            max = 1000
        "#;
        assert!(LedgerConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let mut config = LedgerConfig::default();
        config.oplog_alert_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = LedgerConfig::load(Some(PathBuf::from("/nonexistent/folio.toml")));
        assert!(matches!(result, Err(LedgerError::Config(_))));
    }
}
