//! Candle sampling interval tokens.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::IntervalParseError;

/// Time unit of an interval token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    /// Seconds (`s`).
    Second,
    /// Minutes (`m`).
    Minute,
    /// Hours (`h`).
    Hour,
    /// Days (`d`).
    Day,
    /// Weeks (`w` or `wk`), 7 days each.
    Week,
    /// Months (`mo`), counted as 30 days.
    Month,
    /// Years (`y`), counted as 365 days.
    Year,
}

/// A validated candle sampling period token such as `1d`, `5m` or `1wk`.
///
/// The original token spelling is preserved because it is embedded in
/// provider requests and in on-disk filenames
/// (`<interval>_YYYYMMDD_YYYYMMDD.parquet`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    token: String,
    count: u32,
    unit: IntervalUnit,
}

impl Interval {
    /// Returns the original interval token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Returns the multiplier in front of the unit (`5` for `5m`).
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Returns the time unit of the token.
    #[must_use]
    pub const fn unit(&self) -> IntervalUnit {
        self.unit
    }

    /// Returns the nominal step between consecutive candles.
    ///
    /// Weeks count as 7 days, months as 30 days and years as 365 days; the
    /// delta is used to advance an incremental fetch past the last stored
    /// row, not for calendar arithmetic.
    #[must_use]
    pub fn delta(&self) -> Duration {
        let n = i64::from(self.count);
        match self.unit {
            IntervalUnit::Second => Duration::seconds(n),
            IntervalUnit::Minute => Duration::minutes(n),
            IntervalUnit::Hour => Duration::hours(n),
            IntervalUnit::Day => Duration::days(n),
            IntervalUnit::Week => Duration::days(7 * n),
            IntervalUnit::Month => Duration::days(30 * n),
            IntervalUnit::Year => Duration::days(365 * n),
        }
    }

    /// Returns true for sub-daily intervals.
    #[must_use]
    pub const fn is_intraday(&self) -> bool {
        matches!(
            self.unit,
            IntervalUnit::Second | IntervalUnit::Minute | IntervalUnit::Hour
        )
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token)
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_lowercase();
        if token.is_empty() {
            return Err(IntervalParseError(s.to_string()));
        }
        // Two-letter suffixes first so "1mo" is not read as minutes.
        let (digits, unit) = if let Some(d) = token.strip_suffix("mo") {
            (d, IntervalUnit::Month)
        } else if let Some(d) = token.strip_suffix("wk") {
            (d, IntervalUnit::Week)
        } else if let Some(d) = token.strip_suffix('w') {
            (d, IntervalUnit::Week)
        } else if let Some(d) = token.strip_suffix('y') {
            (d, IntervalUnit::Year)
        } else if let Some(d) = token.strip_suffix('d') {
            (d, IntervalUnit::Day)
        } else if let Some(d) = token.strip_suffix('h') {
            (d, IntervalUnit::Hour)
        } else if let Some(d) = token.strip_suffix('m') {
            (d, IntervalUnit::Minute)
        } else if let Some(d) = token.strip_suffix('s') {
            (d, IntervalUnit::Second)
        } else {
            return Err(IntervalParseError(s.to_string()));
        };

        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| IntervalParseError(s.to_string()))?
        };
        if count == 0 {
            return Err(IntervalParseError(s.to_string()));
        }

        Ok(Self { token, count, unit })
    }
}

impl TryFrom<String> for Interval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.token
    }
}
