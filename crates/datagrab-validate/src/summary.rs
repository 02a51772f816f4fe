//! Per-file summaries and batch progress.

use chrono::{Duration, NaiveDateTime};
use std::path::PathBuf;

/// Aggregate facts about one stored file.
///
/// Count fields are `None` when the column they describe is absent from
/// the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSummary {
    /// The scanned file.
    pub path: PathBuf,
    /// Asset type inferred from the path, when parsable.
    pub asset_type: Option<String>,
    /// Symbol inferred from the path, when parsable.
    pub symbol: Option<String>,
    /// Interval inferred from the filename, when parsable.
    pub interval: Option<String>,
    /// Total number of rows.
    pub row_count: usize,
    /// Smallest datetime present.
    pub min_dt: Option<NaiveDateTime>,
    /// Largest datetime present.
    pub max_dt: Option<NaiveDateTime>,
    /// Rows sharing a datetime with an earlier row.
    pub duplicate_datetime_count: usize,
    /// Canonical base columns absent from the file.
    pub missing_columns: Vec<String>,
    /// Null `close` values.
    pub null_close_count: Option<usize>,
    /// Rows violating `high >= low && low <= close <= high`.
    pub invalid_ohlc_count: Option<usize>,
    /// Rows with any negative price or volume.
    pub negative_value_count: Option<usize>,
    /// Largest gap between consecutive sorted datetimes.
    pub max_gap: Option<Duration>,
}

impl FileSummary {
    /// An all-empty summary for files that could not be read.
    #[must_use]
    pub fn unreadable(
        path: PathBuf,
        asset_type: Option<String>,
        symbol: Option<String>,
        interval: Option<String>,
        missing_columns: Vec<String>,
    ) -> Self {
        Self {
            path,
            asset_type,
            symbol,
            interval,
            row_count: 0,
            min_dt: None,
            max_dt: None,
            duplicate_datetime_count: 0,
            missing_columns,
            null_close_count: None,
            invalid_ohlc_count: None,
            negative_value_count: None,
            max_gap: None,
        }
    }
}

/// Progress of a batch scan, handed to the per-file callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    /// Files in the batch.
    pub total: usize,
    /// Files finished so far, this one included.
    pub completed: usize,
    /// Filename of the file that just finished.
    pub current_file: Option<String>,
}
