//! Parse and validation errors for core types.

use chrono_tz::Tz;
use thiserror::Error;

/// Error returned when parsing an unknown asset type name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown asset type '{0}', expected one of: stock, ashare, forex, crypto, commodity")]
pub struct AssetTypeParseError(pub String);

/// Error returned when parsing an unknown adjustment mode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown adjust mode '{0}', expected one of: none, auto, back, forward (aliases: front, backward)")]
pub struct AdjustParseError(pub String);

/// Error returned when parsing an invalid interval token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid interval '{0}', expected <count><unit> with unit one of: s, m, h, d, w, wk, mo, y")]
pub struct IntervalParseError(pub String);

/// Error for invalid date ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    /// Start is after end.
    #[error("invalid date range: {start} > {end}")]
    InvalidRange {
        /// The range start.
        start: chrono::DateTime<Tz>,
        /// The range end.
        end: chrono::DateTime<Tz>,
    },

    /// The value could not be parsed as a date or datetime.
    #[error("invalid date '{0}', expected YYYY-MM-DD or an ISO-8601 datetime")]
    Unparsable(String),
}
