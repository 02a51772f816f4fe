//! Task and stats records.

use chrono::DateTime;
use chrono_tz::Tz;

use datagrab_types::{Adjust, AssetType, Interval};

/// How many recent failures the stats keep for live display.
pub const RECENT_FAILURES_CAP: usize = 20;

/// One unit of download work: a symbol, an interval and a closed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Provider-native symbol token.
    pub symbol: String,
    /// Candle interval.
    pub interval: Interval,
    /// Range start (inclusive).
    pub start: DateTime<Tz>,
    /// Range end (inclusive).
    pub end: DateTime<Tz>,
    /// Asset class the symbol belongs to.
    pub asset_type: AssetType,
    /// Requested adjustment mode.
    pub adjust: Adjust,
}

/// A task the scheduler could not complete, with a normalized reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// The failed task.
    pub task: DownloadTask,
    /// `"<ErrorKind>: <message>"`, prefix deduplicated.
    pub reason: String,
}

/// Aggregate progress counters, snapshotted for callbacks.
#[derive(Debug, Clone, Default)]
pub struct DownloadStats {
    /// Number of tasks in this run.
    pub total: usize,
    /// Workers that finished (including failed and skipped).
    pub completed: usize,
    /// Workers currently executing a task.
    pub active: usize,
    /// Tasks that errored.
    pub failed: usize,
    /// Tasks fully subsumed by an existing file.
    pub skipped: usize,
    /// Ring of the most recent failures (at most
    /// [`RECENT_FAILURES_CAP`]).
    pub recent_failures: Vec<FailureRecord>,
}

impl DownloadStats {
    /// Creates stats for a run of `total` tasks.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Appends to the recent-failure ring, dropping the oldest entries
    /// beyond the cap.
    pub fn push_recent(&mut self, record: FailureRecord) {
        self.recent_failures.push(record);
        if self.recent_failures.len() > RECENT_FAILURES_CAP {
            let overflow = self.recent_failures.len() - RECENT_FAILURES_CAP;
            self.recent_failures.drain(..overflow);
        }
    }
}

/// Builds the `"<ErrorKind>: <message>"` failure reason, avoiding a
/// duplicated kind prefix and guaranteeing a non-empty result.
#[must_use]
pub(crate) fn format_failure_reason(kind: &str, message: &str) -> String {
    let message = message.trim();
    if message.is_empty() {
        return kind.to_string();
    }
    if message.starts_with(&format!("{kind}:")) {
        return message.to_string();
    }
    format!("{kind}: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagrab_types::Clock;

    fn task(symbol: &str) -> DownloadTask {
        let clock = Clock::default();
        DownloadTask {
            symbol: symbol.to_string(),
            interval: "1d".parse().unwrap(),
            start: clock.parse_date("2024-01-01").unwrap(),
            end: clock.parse_date("2024-01-31").unwrap(),
            asset_type: AssetType::Stock,
            adjust: Adjust::Auto,
        }
    }

    #[test]
    fn test_recent_failures_ring_is_bounded() {
        let mut stats = DownloadStats::new(100);
        for i in 0..30 {
            stats.push_recent(FailureRecord {
                task: task(&format!("SYM{i}")),
                reason: "boom".into(),
            });
        }
        assert_eq!(stats.recent_failures.len(), RECENT_FAILURES_CAP);
        assert_eq!(stats.recent_failures[0].task.symbol, "SYM10");
        assert_eq!(stats.recent_failures.last().unwrap().task.symbol, "SYM29");
    }

    #[test]
    fn test_format_failure_reason() {
        assert_eq!(format_failure_reason("SourceError", "boom"), "SourceError: boom");
        assert_eq!(
            format_failure_reason("SourceError", "SourceError: boom"),
            "SourceError: boom"
        );
        assert_eq!(format_failure_reason("SourceError", "  "), "SourceError");
    }
}
