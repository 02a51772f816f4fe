//! Operational-timezone time source and date ranges.
//!
//! All datetimes in the store are anchored to one operational timezone
//! (default `Asia/Shanghai`) and persisted timezone-naive. The [`Clock`]
//! carries that anchor explicitly so the catalog, scheduler and writer never
//! depend on process-global state, and tests can pin "now".

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::DateRangeError;

/// Default operational timezone.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Asia::Shanghai;

/// Time source anchored to the operational timezone.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    tz: Tz,
    fixed: Option<DateTime<Utc>>,
}

impl Clock {
    /// Creates a clock for the given timezone.
    #[must_use]
    pub const fn new(tz: Tz) -> Self {
        Self { tz, fixed: None }
    }

    /// Creates a clock pinned to a fixed instant, for tests.
    #[must_use]
    pub const fn fixed(tz: Tz, instant: DateTime<Utc>) -> Self {
        Self {
            tz,
            fixed: Some(instant),
        }
    }

    /// Returns the operational timezone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.tz
    }

    /// Returns the current time in the operational timezone.
    #[must_use]
    pub fn now(&self) -> DateTime<Tz> {
        self.fixed.unwrap_or_else(Utc::now).with_timezone(&self.tz)
    }

    /// Converts an arbitrary instant into the operational timezone.
    #[must_use]
    pub fn to_local<T: TimeZone>(&self, dt: DateTime<T>) -> DateTime<Tz> {
        dt.with_timezone(&self.tz)
    }

    /// Anchors a timezone-naive datetime (as stored on disk) in the
    /// operational timezone. Ambiguous local times resolve to the earlier
    /// instant.
    #[must_use]
    pub fn anchor(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        match self.tz.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) | chrono::LocalResult::Ambiguous(dt, _) => dt,
            chrono::LocalResult::None => self
                .tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .unwrap_or_else(|| self.tz.from_utc_datetime(&naive)),
        }
    }

    /// Parses a `YYYY-MM-DD` date or an ISO-8601 datetime. Naive inputs are
    /// interpreted in the operational timezone.
    pub fn parse_date(&self, value: &str) -> Result<DateTime<Tz>, DateRangeError> {
        let raw = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            let naive = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| DateRangeError::Unparsable(value.to_string()))?;
            return Ok(self.anchor(naive));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
            return Ok(self.anchor(naive));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Ok(self.anchor(naive));
        }
        if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
            return Ok(aware.with_timezone(&self.tz));
        }
        Err(DateRangeError::Unparsable(value.to_string()))
    }

    /// Formats an instant as the `YYYYMMDD` token used in store filenames.
    #[must_use]
    pub fn format_path_date<T: TimeZone>(&self, dt: DateTime<T>) -> String {
        self.to_local(dt).format("%Y%m%d").to_string()
    }

    /// Returns the trailing `days`-day range ending now, the default scope
    /// of a download when no explicit dates are given.
    #[must_use]
    pub fn default_range(&self, days: i64) -> DateRange {
        let end = self.now();
        DateRange {
            start: end - Duration::days(days),
            end,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

/// An inclusive datetime range in the operational timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Range start (inclusive).
    pub start: DateTime<Tz>,
    /// Range end (inclusive).
    pub end: DateTime<Tz>,
}

impl DateRange {
    /// Creates a new range, validating that start <= end.
    ///
    /// # Errors
    ///
    /// Returns an error if start > end.
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Returns a copy with the end clipped to `end` if that is earlier.
    #[must_use]
    pub fn clip_end(self, end: DateTime<Tz>) -> Self {
        Self {
            start: self.start,
            end: self.end.min(end),
        }
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start.date_naive(), self.end.date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_clock() -> Clock {
        let instant = Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap();
        Clock::fixed(DEFAULT_TIMEZONE, instant)
    }

    #[test]
    fn test_parse_plain_date_is_local_midnight() {
        let clock = test_clock();
        let dt = clock.parse_date("2024-01-02").unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(dt.naive_local().time(), chrono::NaiveTime::MIN);
    }

    #[test]
    fn test_parse_rfc3339_converts() {
        let clock = test_clock();
        // Midnight UTC is 08:00 in Shanghai.
        let dt = clock.parse_date("2024-01-02T00:00:00Z").unwrap();
        assert_eq!(dt.naive_local().time(), chrono::NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let clock = test_clock();
        assert!(matches!(
            clock.parse_date("last tuesday"),
            Err(DateRangeError::Unparsable(_))
        ));
    }

    #[test]
    fn test_format_path_date_uses_operational_zone() {
        let clock = test_clock();
        // 2024-01-01 20:00 UTC is already 2024-01-02 in Shanghai.
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        assert_eq!(clock.format_path_date(dt), "20240102");
    }

    #[test]
    fn test_default_range_spans_requested_days() {
        let clock = test_clock();
        let range = clock.default_range(365);
        assert_eq!(range.end - range.start, Duration::days(365));
    }

    #[test]
    fn test_range_rejects_inverted() {
        let clock = test_clock();
        let a = clock.parse_date("2024-01-02").unwrap();
        let b = clock.parse_date("2024-01-01").unwrap();
        assert!(DateRange::new(a, b).is_err());
        assert!(DateRange::new(b, a).is_ok());
    }

    #[test]
    fn test_fixed_clock_now() {
        let clock = test_clock();
        assert_eq!(clock.now().naive_local().time(), chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }
}
