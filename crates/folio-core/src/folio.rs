//! # Folio Formatting
//!
//! Turns a sequence number into the human-readable folio printed on the
//! document, and back.
//!
//! ## Layout
//! ```text
//!   TKT-   A   -   000042   /R
//!   ────   ─   ─   ──────   ──
//!  prefix series sep number suffix
//!                   (zero-padded to width)
//! ```
//!
//! The separator before the number is always `-`, so a series may itself
//! contain dashes: parsing splits on the LAST dash.
//!
//! ## Uniqueness
//! Counters are configured with `max <= 10^width - 1`, so every number of a
//! series renders with exactly `width` digits and distinct numbers give
//! distinct folios.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

/// Formatting rules of one series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FolioFormat {
    pub prefix: String,
    pub width: u32,
    pub suffix: String,
}

/// The components recovered from a formatted folio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ParsedFolio {
    pub prefix: String,
    pub series: String,
    pub number: i64,
    pub suffix: String,
}

impl FolioFormat {
    pub fn new(prefix: impl Into<String>, width: u32, suffix: impl Into<String>) -> Self {
        FolioFormat {
            prefix: prefix.into(),
            width,
            suffix: suffix.into(),
        }
    }

    /// Renders `number` for `series`.
    ///
    /// ## Example
    /// ```rust
    /// use folio_core::folio::FolioFormat;
    ///
    /// let format = FolioFormat::new("FAC-", 8, "/26");
    /// assert_eq!(format.format("F1", 42), "FAC-F1-00000042/26");
    /// ```
    pub fn format(&self, series: &str, number: i64) -> String {
        format!(
            "{}{}-{:0width$}{}",
            self.prefix,
            series,
            number,
            self.suffix,
            width = self.width as usize
        )
    }

    /// Splits a formatted folio back into its components.
    ///
    /// ## Errors
    /// `InvalidFormat` when the prefix/suffix do not match, the separator is
    /// missing, the series is empty, or the numeric part is not at least
    /// `width` ASCII digits.
    pub fn parse(&self, formatted: &str) -> Result<ParsedFolio, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "formatted_number".to_string(),
            reason: reason.to_string(),
        };

        let rest = formatted
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| invalid("prefix does not match"))?;
        let rest = rest
            .strip_suffix(self.suffix.as_str())
            .ok_or_else(|| invalid("suffix does not match"))?;
        let (series, digits) = rest
            .rsplit_once('-')
            .ok_or_else(|| invalid("missing '-' before the number"))?;

        if series.is_empty() {
            return Err(invalid("series is empty"));
        }
        if digits.len() < self.width as usize || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("number must be zero-padded digits"));
        }

        let number = digits
            .parse::<i64>()
            .map_err(|_| invalid("number does not fit in 64 bits"))?;

        Ok(ParsedFolio {
            prefix: self.prefix.clone(),
            series: series.to_string(),
            number,
            suffix: self.suffix.clone(),
        })
    }

    /// Largest number that renders in exactly `width` digits.
    pub fn max_number(&self) -> i64 {
        10_i64
            .checked_pow(self.width)
            .map(|p| p - 1)
            .unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_format() {
        let format = FolioFormat::new("TKT-", 6, "");
        assert_eq!(format.format("A", 1), "TKT-A-000001");
        assert_eq!(format.format("A", 999999), "TKT-A-999999");
    }

    #[test]
    fn test_parse_inverts_format() {
        let cases = [
            ("TKT-", 6, "", "A", 1),
            ("FAC-", 8, "/26", "F1", 12_345_678),
            ("", 1, "", "B", 9),
            ("NC", 4, "-X", "MAIN-2", 42),
            ("T", 18, "", "Z", 999_999_999_999_999_999),
        ];

        for (prefix, width, suffix, series, number) in cases {
            let format = FolioFormat::new(prefix, width, suffix);
            let parsed = format.parse(&format.format(series, number)).unwrap();
            assert_eq!(
                parsed,
                ParsedFolio {
                    prefix: prefix.to_string(),
                    series: series.to_string(),
                    number,
                    suffix: suffix.to_string(),
                }
            );
        }
    }

    #[test]
    fn test_parse_rejects_foreign_folios() {
        let format = FolioFormat::new("TKT-", 6, "");
        assert!(format.parse("FAC-A-000001").is_err());
        assert!(format.parse("TKT-000001").is_err());
        assert!(format.parse("TKT--000001").is_err());
        assert!(format.parse("TKT-A-0001").is_err());
        assert!(format.parse("TKT-A-00000x").is_err());
    }

    #[test]
    fn test_max_number() {
        assert_eq!(FolioFormat::new("", 6, "").max_number(), 999_999);
        assert_eq!(FolioFormat::new("", 1, "").max_number(), 9);
        assert_eq!(
            FolioFormat::new("", 18, "").max_number(),
            999_999_999_999_999_999
        );
    }
}
