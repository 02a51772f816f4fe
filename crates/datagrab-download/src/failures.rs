//! `failures.csv` round-trip.
//!
//! Written with full CSV quoting so reasons containing commas or newlines
//! stay parseable, and re-read by `--only-failures` runs. Strict mode
//! aborts on the first malformed row; lenient mode skips it with a
//! warning.

use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use datagrab_store::fs::atomic_write_bytes;
use datagrab_types::{Adjust, AssetType, Clock, Interval};

use crate::{DownloadError, DownloadTask, FailureRecord};

const HEADER: [&str; 7] = [
    "symbol",
    "interval",
    "start",
    "end",
    "asset_type",
    "adjust",
    "reason",
];

/// Days of history a failure row falls back to when its dates are missing
/// or unusable.
const DEFAULT_RANGE_DAYS: i64 = 365;

/// Writes the failures file atomically.
///
/// # Errors
///
/// Returns an error when serialization or the atomic write fails.
pub fn write_failures(path: &Path, failures: &[FailureRecord]) -> Result<(), DownloadError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(HEADER)
        .map_err(|e| DownloadError::FailuresEncode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    for failure in failures {
        let task = &failure.task;
        writer
            .write_record([
                task.symbol.as_str(),
                task.interval.as_str(),
                &task.start.date_naive().to_string(),
                &task.end.date_naive().to_string(),
                task.asset_type.as_str(),
                task.adjust.as_str(),
                failure.reason.as_str(),
            ])
            .map_err(|e| DownloadError::FailuresEncode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| DownloadError::FailuresEncode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    atomic_write_bytes(path, &bytes)?;
    Ok(())
}

/// Loads tasks back from a failures file. A missing file yields no tasks.
///
/// # Errors
///
/// Returns an error when the file is unreadable, or on the first invalid
/// row when `strict` is set.
pub fn load_failures(
    path: &Path,
    strict: bool,
    clock: &Clock,
) -> Result<Vec<DownloadTask>, DownloadError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| DownloadError::FailuresRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let headers = reader
        .headers()
        .map_err(|e| DownloadError::FailuresRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .clone();
    let field = |record: &csv::StringRecord, name: &str| -> String {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .trim()
            .to_string()
    };

    let default_end = clock.now();
    let default_start = default_end - chrono::Duration::days(DEFAULT_RANGE_DAYS);

    let mut tasks = Vec::new();
    // Header occupies row 1; data rows start at 2.
    for (row_no, record) in reader.records().enumerate().map(|(i, r)| (i + 2, r)) {
        let reject = |message: String| -> Result<(), DownloadError> {
            if strict {
                Err(DownloadError::FailuresRow {
                    row: row_no,
                    message,
                })
            } else {
                warn!(row = row_no, message, "failures row skipped");
                Ok(())
            }
        };

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                reject(e.to_string())?;
                continue;
            }
        };

        let symbol = field(&record, "symbol");
        let interval_raw = field(&record, "interval");
        if symbol.is_empty() || interval_raw.is_empty() {
            reject("symbol and interval are required".to_string())?;
            continue;
        }
        let interval = match Interval::from_str(&interval_raw) {
            Ok(interval) => interval,
            Err(e) => {
                reject(e.to_string())?;
                continue;
            }
        };
        let asset_raw = field(&record, "asset_type");
        let asset_type = if asset_raw.is_empty() {
            AssetType::Stock
        } else {
            match AssetType::from_str(&asset_raw) {
                Ok(asset_type) => asset_type,
                Err(e) => {
                    reject(e.to_string())?;
                    continue;
                }
            }
        };
        let adjust_raw = field(&record, "adjust");
        let adjust = if adjust_raw.is_empty() {
            Adjust::Auto
        } else {
            match Adjust::from_str(&adjust_raw) {
                Ok(adjust) => adjust,
                Err(e) => {
                    reject(e.to_string())?;
                    continue;
                }
            }
        };

        let parse_bound = |raw: String, bound: &str, fallback| match raw.is_empty() {
            true => Ok(fallback),
            false => match clock.parse_date(&raw) {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    if strict {
                        Err(DownloadError::FailuresRow {
                            row: row_no,
                            message: format!("invalid {bound}: {e}"),
                        })
                    } else {
                        warn!(row = row_no, bound, raw, "unparsable date, using default");
                        Ok(fallback)
                    }
                }
            },
        };
        let mut start = parse_bound(field(&record, "start"), "start", default_start)?;
        let mut end = parse_bound(field(&record, "end"), "end", default_end)?;
        if start > end {
            if strict {
                return Err(DownloadError::FailuresRow {
                    row: row_no,
                    message: "start > end".to_string(),
                });
            }
            warn!(row = row_no, "start > end, using default range");
            start = default_start;
            end = default_end;
        }

        tasks.push(DownloadTask {
            symbol,
            interval,
            start,
            end,
            asset_type,
            adjust,
        });
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(symbol: &str, reason: &str) -> FailureRecord {
        let clock = Clock::default();
        FailureRecord {
            task: DownloadTask {
                symbol: symbol.to_string(),
                interval: "1d".parse().unwrap(),
                start: clock.parse_date("2024-01-01").unwrap(),
                end: clock.parse_date("2024-01-31").unwrap(),
                asset_type: AssetType::Stock,
                adjust: Adjust::Auto,
            },
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_roundtrip_with_awkward_reason() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.csv");
        let failures = vec![record("BAD", "SourceError: boom, with \"quotes\"\nand newline")];
        write_failures(&path, &failures).unwrap();

        let tasks = load_failures(&path, true, &Clock::default()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].symbol, "BAD");
        assert_eq!(tasks[0].interval.as_str(), "1d");
        assert_eq!(tasks[0].asset_type, AssetType::Stock);
        assert_eq!(tasks[0].adjust, Adjust::Auto);
        assert_eq!(tasks[0].start.date_naive().to_string(), "2024-01-01");
    }

    #[test]
    fn test_missing_file_yields_no_tasks() {
        let dir = TempDir::new().unwrap();
        let tasks =
            load_failures(&dir.path().join("failures.csv"), true, &Clock::default()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_lenient_skips_bad_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.csv");
        std::fs::write(
            &path,
            "symbol,interval,start,end,asset_type,adjust,reason\n\
             ,1d,2024-01-01,2024-01-31,stock,auto,missing symbol\n\
             OK,bogus,2024-01-01,2024-01-31,stock,auto,bad interval\n\
             GOOD,1d,2024-01-01,2024-01-31,stock,auto,fine\n",
        )
        .unwrap();
        let tasks = load_failures(&path, false, &Clock::default()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].symbol, "GOOD");
    }

    #[test]
    fn test_strict_aborts_on_bad_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.csv");
        std::fs::write(
            &path,
            "symbol,interval,start,end,asset_type,adjust,reason\n\
             OK,bogus,2024-01-01,2024-01-31,stock,auto,bad interval\n",
        )
        .unwrap();
        let result = load_failures(&path, true, &Clock::default());
        assert!(matches!(
            result,
            Err(DownloadError::FailuresRow { row: 2, .. })
        ));
    }

    #[test]
    fn test_missing_dates_fall_back_to_default_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.csv");
        std::fs::write(
            &path,
            "symbol,interval,start,end,asset_type,adjust,reason\n\
             GOOD,1d,,,stock,auto,no dates\n",
        )
        .unwrap();
        let clock = Clock::default();
        let tasks = load_failures(&path, false, &clock).unwrap();
        assert_eq!(tasks.len(), 1);
        let span = tasks[0].end - tasks[0].start;
        assert_eq!(span, chrono::Duration::days(DEFAULT_RANGE_DAYS));
    }

    #[test]
    fn test_inverted_dates_normalize_lenient_abort_strict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failures.csv");
        std::fs::write(
            &path,
            "symbol,interval,start,end,asset_type,adjust,reason\n\
             GOOD,1d,2024-02-01,2024-01-01,stock,auto,inverted\n",
        )
        .unwrap();
        let clock = Clock::default();

        let tasks = load_failures(&path, false, &clock).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].start <= tasks[0].end);

        assert!(load_failures(&path, true, &clock).is_err());
    }
}
