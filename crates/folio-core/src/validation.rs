//! # Validation Module
//!
//! Input validation for the folio ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (before any transaction is opened)               │
//! │  ├── series / actor / reason shape                                     │
//! │  ├── totals balance (gross = net + tax)                                │
//! │  └── series definitions (bounds fit the folio width)                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Allocation transaction                                       │
//! │  └── active counter exists, current <= max                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (document_type, series, number)                            │
//! │  └── CHECK constraints on counters                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::folio::FolioFormat;
use crate::types::{DocumentTotals, SeriesDefinition};
use crate::{MAX_ACTOR_LEN, MAX_FOLIO_WIDTH, MAX_REASON_LEN, MAX_SERIES_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of prefix/suffix and of sale/customer references.
const MAX_AFFIX_LEN: usize = 20;
const MAX_REF_LEN: usize = 100;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a series identifier.
///
/// ## Rules
/// - 1 to 20 characters
/// - ASCII letters, digits, `-` and `_` only
///
/// ## Example
/// ```rust
/// use folio_core::validation::validate_series;
///
/// assert!(validate_series("A").is_ok());
/// assert!(validate_series("MAIN-2").is_ok());
/// assert!(validate_series("").is_err());
/// assert!(validate_series("A B").is_err());
/// ```
pub fn validate_series(series: &str) -> ValidationResult<()> {
    if series.is_empty() {
        return Err(ValidationError::Required {
            field: "series".to_string(),
        });
    }

    if series.len() > MAX_SERIES_LEN {
        return Err(ValidationError::TooLong {
            field: "series".to_string(),
            max: MAX_SERIES_LEN,
        });
    }

    if !series
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "series".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates the identifier of the person or process acting.
pub fn validate_actor(actor: &str) -> ValidationResult<()> {
    validate_text("actor", actor, MAX_ACTOR_LEN)
}

/// Validates an annulment or replacement reason.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    validate_text("reason", reason, MAX_REASON_LEN)
}

/// Validates optional sale/customer references.
pub fn validate_reference(field: &str, reference: Option<&str>) -> ValidationResult<()> {
    match reference {
        Some(r) => validate_text(field, r, MAX_REF_LEN),
        None => Ok(()),
    }
}

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

// =============================================================================
// Totals
// =============================================================================

/// Validates document totals.
///
/// ## Rules
/// - gross, net and tax are all >= 0
/// - gross == net + tax
///
/// ## Example
/// ```rust
/// use folio_core::money::Money;
/// use folio_core::types::DocumentTotals;
/// use folio_core::validation::validate_totals;
///
/// let ok = DocumentTotals::new(Money::from_cents(11900), Money::from_cents(10000), Money::from_cents(1900));
/// assert!(validate_totals(&ok).is_ok());
///
/// let off = DocumentTotals::new(Money::from_cents(11900), Money::from_cents(10000), Money::from_cents(1800));
/// assert!(validate_totals(&off).is_err());
/// ```
pub fn validate_totals(totals: &DocumentTotals) -> ValidationResult<()> {
    for (field, amount) in [
        ("gross", totals.gross),
        ("net", totals.net),
        ("tax", totals.tax),
    ] {
        if amount.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
    }

    let balanced = totals
        .net
        .checked_add(totals.tax)
        .is_some_and(|sum| sum == totals.gross);

    if !balanced {
        return Err(ValidationError::UnbalancedTotals {
            gross: totals.gross.cents(),
            net: totals.net.cents(),
            tax: totals.tax.cents(),
        });
    }

    Ok(())
}

// =============================================================================
// Series Definitions
// =============================================================================

/// Validates a series definition before its counter is created.
///
/// ## Rules
/// - series passes [`validate_series`]
/// - width in 1..=18
/// - 0 <= min <= start <= max
/// - max <= 10^width - 1 (every number renders in exactly `width` digits)
/// - prefix/suffix at most 20 characters, no whitespace
/// - suffix does not start with a digit (it would merge into the number)
pub fn validate_series_definition(def: &SeriesDefinition) -> ValidationResult<()> {
    validate_series(&def.series)?;

    if def.width == 0 || def.width > MAX_FOLIO_WIDTH {
        return Err(ValidationError::OutOfRange {
            field: "width".to_string(),
            min: 1,
            max: MAX_FOLIO_WIDTH as i64,
        });
    }

    let width_max = FolioFormat::new("", def.width, "").max_number();

    if def.min < 0 || def.max < def.min || def.max > width_max {
        return Err(ValidationError::OutOfRange {
            field: "max".to_string(),
            min: def.min.max(0),
            max: width_max,
        });
    }

    let start = def.start_value();
    if start < def.min || start > def.max {
        return Err(ValidationError::OutOfRange {
            field: "start".to_string(),
            min: def.min,
            max: def.max,
        });
    }

    validate_affix("prefix", &def.prefix)?;
    validate_affix("suffix", &def.suffix)?;

    if def.suffix.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "suffix".to_string(),
            reason: "must not start with a digit".to_string(),
        });
    }

    Ok(())
}

/// Validates a new upper bound for an existing counter.
pub fn validate_new_max(current_max: i64, new_max: i64, width: u32) -> ValidationResult<()> {
    let width_max = FolioFormat::new("", width, "").max_number();

    if new_max < current_max || new_max > width_max {
        return Err(ValidationError::OutOfRange {
            field: "max".to_string(),
            min: current_max,
            max: width_max,
        });
    }

    Ok(())
}

fn validate_affix(field: &str, value: &str) -> ValidationResult<()> {
    if value.chars().count() > MAX_AFFIX_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_AFFIX_LEN,
        });
    }

    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::DocumentType;

    fn definition() -> SeriesDefinition {
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

    #[test]
    fn test_validate_series() {
        assert!(validate_series("A").is_ok());
        assert!(validate_series("F_2026").is_ok());
        assert!(validate_series("").is_err());
        assert!(validate_series("has space").is_err());
        assert!(validate_series(&"A".repeat(21)).is_err());
    }

    #[test]
    fn test_validate_reason_and_actor() {
        assert!(validate_reason("customer cancelled").is_ok());
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"x".repeat(501)).is_err());
        assert!(validate_actor("manager-7").is_ok());
        assert!(validate_actor("").is_err());
    }

    #[test]
    fn test_validate_totals() {
        let totals = DocumentTotals::new(
            Money::from_cents(11900),
            Money::from_cents(10000),
            Money::from_cents(1900),
        );
        assert!(validate_totals(&totals).is_ok());
        assert!(validate_totals(&DocumentTotals::default()).is_ok());

        let negative = DocumentTotals::new(
            Money::from_cents(-100),
            Money::from_cents(-100),
            Money::zero(),
        );
        assert!(validate_totals(&negative).is_err());

        let unbalanced = DocumentTotals::new(
            Money::from_cents(100),
            Money::from_cents(50),
            Money::from_cents(40),
        );
        assert!(matches!(
            validate_totals(&unbalanced),
            Err(ValidationError::UnbalancedTotals { .. })
        ));
    }

    #[test]
    fn test_validate_series_definition() {
        assert!(validate_series_definition(&definition()).is_ok());

        let too_wide = SeriesDefinition {
            max: 1_000_000,
            ..definition()
        };
        assert!(validate_series_definition(&too_wide).is_err());

        let bad_start = SeriesDefinition {
            start: Some(0),
            ..definition()
        };
        assert!(validate_series_definition(&bad_start).is_err());

        let digit_suffix = SeriesDefinition {
            suffix: "9X".to_string(),
            ..definition()
        };
        assert!(validate_series_definition(&digit_suffix).is_err());

        let zero_width = SeriesDefinition {
            width: 0,
            ..definition()
        };
        assert!(validate_series_definition(&zero_width).is_err());
    }

    #[test]
    fn test_validate_new_max() {
        assert!(validate_new_max(10, 10, 6).is_ok());
        assert!(validate_new_max(10, 999_999, 6).is_ok());
        assert!(validate_new_max(10, 9, 6).is_err());
        assert!(validate_new_max(10, 1_000_000, 6).is_err());
    }
}
