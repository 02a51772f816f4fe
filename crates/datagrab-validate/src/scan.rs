//! Single-file and batch scans.

use chrono::Duration;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

use datagrab_store::read_column_data;
use datagrab_types::Clock;

use crate::issue::IssueContext;
use crate::{BatchProgress, FileSummary, QualityIssue, Severity};

/// Upper bound on the batch worker pool.
const MAX_WORKERS: usize = 32;
/// Below this many files the batch runs serially.
const SERIAL_THRESHOLD: usize = 3;

/// Callback invoked after each file finishes, from the worker thread that
/// scanned it.
pub type ResultCallback<'a> = dyn Fn(&FileSummary, &[QualityIssue], &BatchProgress) + Send + Sync + 'a;
/// Optional streaming consumer; when present, issues are not accumulated
/// in memory.
pub type IssueCallback<'a> = dyn Fn(&QualityIssue) + Send + Sync + 'a;

/// Infers `(asset_type, symbol, interval)` from
/// `data_root/<asset_type>/<symbol>/<interval>_*.parquet`. Components
/// that fail to parse degrade to `None`.
#[must_use]
pub fn infer_context(path: &Path) -> (Option<String>, Option<String>, Option<String>) {
    let name_of = |p: Option<&Path>| {
        p.and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(str::to_string)
    };
    let symbol = name_of(path.parent());
    let asset_type = name_of(path.parent().and_then(Path::parent));
    let interval = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split_once('_'))
        .map(|(prefix, _)| prefix.to_string());
    (asset_type, symbol, interval)
}

/// Enumerates stored parquet files under `root`, optionally narrowed by
/// asset type, symbol and interval.
#[must_use]
pub fn iter_parquet_files(
    root: &Path,
    asset_type: Option<&str>,
    symbol: Option<&str>,
    interval: Option<&str>,
) -> Vec<PathBuf> {
    let mut base = root.to_path_buf();
    if let Some(asset_type) = asset_type {
        base.push(asset_type);
        if let Some(symbol) = symbol {
            base.push(symbol);
        }
    }
    let mut files = Vec::new();
    let mut stack = vec![base];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "parquet") {
                let keep = interval.is_none_or(|want| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&format!("{want}_")))
                });
                if keep {
                    files.push(path);
                }
            }
        }
    }
    files.sort();
    files
}

/// Gap threshold for an interval token; `None` skips the gap check.
fn gap_threshold(interval: Option<&str>) -> Option<Duration> {
    let key = interval?.trim().to_lowercase();
    if key.ends_with("mo") {
        Some(Duration::days(120))
    } else if key.ends_with("wk") || key.ends_with('w') {
        Some(Duration::days(60))
    } else if key.ends_with('d') {
        Some(Duration::days(10))
    } else if key.ends_with('m') || key.ends_with('h') {
        Some(Duration::hours(6))
    } else {
        None
    }
}

/// Scans one file: schema completeness, datetime ordering and gaps, null
/// closes, OHLC ordering violations and negative values, all in a single
/// pass over the decoded columns.
#[must_use]
pub fn validate_file(path: &Path, clock: &Clock) -> (FileSummary, Vec<QualityIssue>) {
    let (asset_type, symbol, interval) = infer_context(path);
    let ctx = IssueContext {
        path: Some(path.display().to_string()),
        asset_type: asset_type.clone(),
        symbol: symbol.clone(),
        interval: interval.clone(),
        created_at: clock.now().format("%Y-%m-%dT%H:%M:%S").to_string(),
    };
    let mut issues = Vec::new();

    let data = match read_column_data(path) {
        Ok(data) => data,
        Err(e) => {
            issues.push(ctx.issue(
                "parquet.read_failed",
                Severity::Error,
                "parquet file unreadable",
                Some(e.to_string()),
            ));
            let summary = FileSummary::unreadable(
                path.to_path_buf(),
                asset_type,
                symbol,
                interval,
                datagrab_store::BASE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            );
            return (summary, issues);
        }
    };

    let mut missing: Vec<String> = Vec::new();
    for (name, present, severity) in [
        ("datetime", data.datetime.is_some(), Severity::Error),
        ("open", data.open.is_some(), Severity::Warn),
        ("high", data.high.is_some(), Severity::Warn),
        ("low", data.low.is_some(), Severity::Warn),
        ("close", data.close.is_some(), Severity::Error),
        ("volume", data.volume.is_some(), Severity::Warn),
    ] {
        if !present {
            missing.push(name.to_string());
            issues.push(ctx.issue(
                &format!("schema.missing_{name}"),
                severity,
                format!("column '{name}' missing"),
                None,
            ));
        }
    }

    let row_count = data.row_count;
    let mut min_dt = None;
    let mut max_dt = None;
    let mut duplicate_count = 0usize;
    let mut max_gap = None;

    if let Some(datetimes) = &data.datetime {
        let mut present: Vec<_> = datetimes.iter().filter_map(|d| *d).collect();
        let mut unique = HashSet::with_capacity(present.len());
        for dt in &present {
            unique.insert(*dt);
        }
        duplicate_count = present.len().saturating_sub(unique.len());
        present.sort();
        min_dt = present.first().copied();
        max_dt = present.last().copied();
        max_gap = present.windows(2).map(|w| w[1] - w[0]).max();

        if duplicate_count > 0 {
            issues.push(ctx.issue(
                "datetime.duplicated",
                Severity::Warn,
                format!("datetime has {duplicate_count} duplicated rows"),
                None,
            ));
        }
        if let (Some(gap), Some(threshold)) = (max_gap, gap_threshold(interval.as_deref())) {
            if gap > threshold {
                issues.push(ctx.issue(
                    "datetime.gap_too_large",
                    Severity::Warn,
                    format!("largest gap {gap} exceeds expected cadence"),
                    Some(format!("threshold={threshold}")),
                ));
            }
        }
    }

    let null_close_count = data.close.as_ref().map(|closes| {
        let nulls = closes.iter().filter(|v| v.is_none()).count();
        if nulls > 0 {
            issues.push(ctx.issue(
                "close.has_nulls",
                Severity::Warn,
                format!("close has {nulls} null rows"),
                None,
            ));
        }
        nulls
    });

    let invalid_ohlc_count = match (&data.high, &data.low, &data.close) {
        (Some(highs), Some(lows), Some(closes)) => {
            let mut invalid = 0usize;
            for i in 0..row_count {
                let high = highs.get(i).copied().flatten();
                let low = lows.get(i).copied().flatten();
                let close = closes.get(i).copied().flatten();
                let bad = matches!((high, low), (Some(h), Some(l)) if h < l)
                    || matches!((close, low), (Some(c), Some(l)) if c < l)
                    || matches!((close, high), (Some(c), Some(h)) if c > h);
                if bad {
                    invalid += 1;
                }
            }
            if invalid > 0 {
                issues.push(ctx.issue(
                    "ohlc.invalid_range",
                    Severity::Warn,
                    format!("{invalid} rows violate high/low/close ordering"),
                    None,
                ));
            }
            Some(invalid)
        }
        _ => None,
    };

    let value_columns: Vec<&Vec<Option<f64>>> = [
        data.open.as_ref(),
        data.high.as_ref(),
        data.low.as_ref(),
        data.close.as_ref(),
        data.volume.as_ref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    let negative_value_count = if value_columns.is_empty() {
        None
    } else {
        let mut negative = 0usize;
        for i in 0..row_count {
            let any_negative = value_columns
                .iter()
                .any(|col| col.get(i).copied().flatten().is_some_and(|v| v < 0.0));
            if any_negative {
                negative += 1;
            }
        }
        if negative > 0 {
            issues.push(ctx.issue(
                "values.negative",
                Severity::Warn,
                format!("{negative} rows carry negative prices or volume"),
                None,
            ));
        }
        Some(negative)
    };

    let summary = FileSummary {
        path: path.to_path_buf(),
        asset_type,
        symbol,
        interval,
        row_count,
        min_dt,
        max_dt,
        duplicate_datetime_count: duplicate_count,
        missing_columns: missing,
        null_close_count,
        invalid_ohlc_count,
        negative_value_count,
        max_gap,
    };
    (summary, issues)
}

/// Scans a batch of files. Fewer than three files (or one worker) run
/// serially; otherwise a pool of `min(cpu, files, 32)` threads is used.
/// With an `on_issue` consumer installed, issues are streamed instead of
/// returned.
#[must_use]
pub fn validate_batch(
    files: &[PathBuf],
    max_workers: Option<usize>,
    clock: &Clock,
    on_result: Option<&ResultCallback>,
    on_issue: Option<&IssueCallback>,
) -> (Vec<FileSummary>, Vec<QualityIssue>) {
    let total = files.len();
    if total == 0 {
        return (Vec::new(), Vec::new());
    }
    let cpu = std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    let workers = max_workers
        .unwrap_or_else(|| cpu.min(total).min(MAX_WORKERS))
        .max(1);

    let mut summaries: Vec<FileSummary> = Vec::with_capacity(total);
    let mut all_issues: Vec<QualityIssue> = Vec::new();

    let consume = |summary: FileSummary,
                       issues: Vec<QualityIssue>,
                       progress: BatchProgress,
                       summaries: &mut Vec<FileSummary>,
                       all_issues: &mut Vec<QualityIssue>| {
        if let Some(cb) = on_result {
            cb(&summary, &issues, &progress);
        }
        match on_issue {
            Some(cb) => {
                for issue in &issues {
                    cb(issue);
                }
            }
            None => all_issues.extend(issues),
        }
        summaries.push(summary);
    };

    if total < SERIAL_THRESHOLD || workers == 1 {
        for (idx, path) in files.iter().enumerate() {
            let (summary, issues) = validate_file(path, clock);
            let progress = BatchProgress {
                total,
                completed: idx + 1,
                current_file: path.file_name().and_then(|n| n.to_str()).map(str::to_string),
            };
            consume(summary, issues, progress, &mut summaries, &mut all_issues);
        }
        return (summaries, all_issues);
    }

    let next = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let collected: Mutex<(Vec<FileSummary>, Vec<QualityIssue>)> =
        Mutex::new((Vec::with_capacity(total), Vec::new()));

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let idx = next.fetch_add(1, Ordering::SeqCst);
                let Some(path) = files.get(idx) else {
                    break;
                };
                let (summary, issues) = validate_file(path, clock);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let progress = BatchProgress {
                    total,
                    completed: done,
                    current_file: path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .map(str::to_string),
                };
                if let Some(cb) = on_result {
                    cb(&summary, &issues, &progress);
                }
                let mut guard = collected.lock().expect("batch lock poisoned");
                match on_issue {
                    Some(cb) => {
                        for issue in &issues {
                            cb(issue);
                        }
                    }
                    None => guard.1.extend(issues),
                }
                guard.0.push(summary);
            });
        }
    });

    let (mut summaries, all_issues) = collected.into_inner().expect("batch lock poisoned");
    if summaries.len() != total {
        warn!(expected = total, actual = summaries.len(), "batch scan incomplete");
    }
    summaries.sort_by(|a, b| a.path.cmp(&b.path));
    (summaries, all_issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use datagrab_store::{write_frame, ColumnPresence, OhlcvFrame, OhlcvRow};
    use tempfile::TempDir;

    fn dt(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn full_row(day: u32) -> OhlcvRow {
        OhlcvRow {
            datetime: dt(day),
            open: Some(99.0),
            high: Some(101.0),
            low: Some(98.0),
            close: Some(100.0),
            volume: Some(1_000.0),
            adjusted_close: None,
        }
    }

    fn write(dir: &Path, rel: &str, frame: &OhlcvFrame) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_frame(&path, frame, None).unwrap();
        path
    }

    #[test]
    fn test_infer_context() {
        let path = Path::new("/data/stock/AAPL/1d_20240101_20240131.parquet");
        let (asset_type, symbol, interval) = infer_context(path);
        assert_eq!(asset_type.as_deref(), Some("stock"));
        assert_eq!(symbol.as_deref(), Some("AAPL"));
        assert_eq!(interval.as_deref(), Some("1d"));

        let (_, _, interval) = infer_context(Path::new("noseparator.parquet"));
        assert_eq!(interval, None);
    }

    #[test]
    fn test_clean_file_has_no_issues() {
        let dir = TempDir::new().unwrap();
        let frame = OhlcvFrame::new(
            vec![full_row(2), full_row(3), full_row(4)],
            ColumnPresence::ohlcv(),
        );
        let path = write(dir.path(), "stock/AAPL/1d_20240101_20240131.parquet", &frame);

        let (summary, issues) = validate_file(&path, &Clock::default());
        assert!(issues.is_empty(), "{issues:?}");
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.min_dt, Some(dt(2)));
        assert_eq!(summary.max_dt, Some(dt(4)));
        assert_eq!(summary.duplicate_datetime_count, 0);
        assert_eq!(summary.null_close_count, Some(0));
        assert_eq!(summary.invalid_ohlc_count, Some(0));
        assert_eq!(summary.negative_value_count, Some(0));
    }

    #[test]
    fn test_duplicate_datetimes_warn() {
        let dir = TempDir::new().unwrap();
        let frame = OhlcvFrame::new(
            vec![full_row(1), full_row(1), full_row(2)],
            ColumnPresence::ohlcv(),
        );
        let path = write(dir.path(), "stock/AAPL/1d_20240101_20240131.parquet", &frame);

        let (summary, issues) = validate_file(&path, &Clock::default());
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.duplicate_datetime_count, 1);
        let dup: Vec<_> = issues
            .iter()
            .filter(|i| i.rule_id == "datetime.duplicated")
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].severity, Severity::Warn);
    }

    #[test]
    fn test_gap_detection_daily() {
        let dir = TempDir::new().unwrap();
        let frame = OhlcvFrame::new(
            vec![full_row(1), full_row(2), full_row(30)],
            ColumnPresence::ohlcv(),
        );
        let path = write(dir.path(), "stock/AAPL/1d_20240101_20240131.parquet", &frame);
        let (summary, issues) = validate_file(&path, &Clock::default());
        assert_eq!(summary.max_gap, Some(Duration::days(28)));
        assert!(issues.iter().any(|i| i.rule_id == "datetime.gap_too_large"));
    }

    #[test]
    fn test_ohlc_violations_and_negatives() {
        let dir = TempDir::new().unwrap();
        let mut bad = full_row(2);
        bad.high = Some(90.0); // high < low
        let mut negative = full_row(3);
        negative.volume = Some(-5.0);
        let frame = OhlcvFrame::new(vec![full_row(1), bad, negative], ColumnPresence::ohlcv());
        let path = write(dir.path(), "stock/AAPL/1d_20240101_20240131.parquet", &frame);

        let (summary, issues) = validate_file(&path, &Clock::default());
        assert_eq!(summary.invalid_ohlc_count, Some(1));
        assert_eq!(summary.negative_value_count, Some(1));
        assert!(issues.iter().any(|i| i.rule_id == "ohlc.invalid_range"));
        assert!(issues.iter().any(|i| i.rule_id == "values.negative"));
    }

    #[test]
    fn test_null_close_warns() {
        let dir = TempDir::new().unwrap();
        let mut nulled = full_row(2);
        nulled.close = None;
        let frame = OhlcvFrame::new(vec![full_row(1), nulled], ColumnPresence::ohlcv());
        let path = write(dir.path(), "stock/AAPL/1d_20240101_20240131.parquet", &frame);
        let (summary, issues) = validate_file(&path, &Clock::default());
        assert_eq!(summary.null_close_count, Some(1));
        assert!(issues.iter().any(|i| i.rule_id == "close.has_nulls"));
    }

    #[test]
    fn test_unreadable_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stock/AAPL/1d_20240101_20240131.parquet");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not parquet").unwrap();

        let (summary, issues) = validate_file(&path, &Clock::default());
        assert_eq!(summary.row_count, 0);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, "parquet.read_failed");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_iter_parquet_files_filters() {
        let dir = TempDir::new().unwrap();
        let frame = OhlcvFrame::new(vec![full_row(2)], ColumnPresence::ohlcv());
        write(dir.path(), "stock/AAPL/1d_20240101_20240131.parquet", &frame);
        write(dir.path(), "stock/AAPL/1h_20240101_20240131.parquet", &frame);
        write(dir.path(), "stock/MSFT/1d_20240101_20240131.parquet", &frame);
        write(dir.path(), "crypto/BTC-USD/1d_20240101_20240131.parquet", &frame);

        assert_eq!(iter_parquet_files(dir.path(), None, None, None).len(), 4);
        assert_eq!(
            iter_parquet_files(dir.path(), Some("stock"), None, None).len(),
            3
        );
        assert_eq!(
            iter_parquet_files(dir.path(), Some("stock"), Some("AAPL"), None).len(),
            2
        );
        assert_eq!(
            iter_parquet_files(dir.path(), Some("stock"), Some("AAPL"), Some("1d")).len(),
            1
        );
    }

    #[test]
    fn test_batch_parallel_matches_serial() {
        let dir = TempDir::new().unwrap();
        let clean = OhlcvFrame::new(vec![full_row(1), full_row(2)], ColumnPresence::ohlcv());
        let dup = OhlcvFrame::new(vec![full_row(1), full_row(1)], ColumnPresence::ohlcv());
        for i in 0..6 {
            let frame = if i % 2 == 0 { &clean } else { &dup };
            write(
                dir.path(),
                &format!("stock/SYM{i}/1d_20240101_20240131.parquet"),
                frame,
            );
        }
        let files = iter_parquet_files(dir.path(), None, None, None);
        let clock = Clock::default();

        let (serial_summaries, serial_issues) =
            validate_batch(&files, Some(1), &clock, None, None);
        let (parallel_summaries, parallel_issues) =
            validate_batch(&files, Some(4), &clock, None, None);

        assert_eq!(serial_summaries.len(), 6);
        assert_eq!(parallel_summaries.len(), 6);
        assert_eq!(serial_issues.len(), 3);
        assert_eq!(parallel_issues.len(), 3);
    }

    #[test]
    fn test_batch_streams_issues_when_sink_given() {
        let dir = TempDir::new().unwrap();
        let dup = OhlcvFrame::new(vec![full_row(1), full_row(1)], ColumnPresence::ohlcv());
        for i in 0..4 {
            write(
                dir.path(),
                &format!("stock/SYM{i}/1d_20240101_20240131.parquet"),
                &dup,
            );
        }
        let files = iter_parquet_files(dir.path(), None, None, None);
        let streamed = Mutex::new(0usize);
        let progress_seen = Mutex::new(0usize);

        let on_issue = |_: &QualityIssue| {
            *streamed.lock().unwrap() += 1;
        };
        let on_result = |_: &FileSummary, _: &[QualityIssue], progress: &BatchProgress| {
            let mut seen = progress_seen.lock().unwrap();
            *seen = (*seen).max(progress.completed);
        };
        let (summaries, issues) = validate_batch(
            &files,
            Some(2),
            &Clock::default(),
            Some(&on_result),
            Some(&on_issue),
        );
        assert_eq!(summaries.len(), 4);
        assert!(issues.is_empty());
        assert_eq!(*streamed.lock().unwrap(), 4);
        assert_eq!(*progress_seen.lock().unwrap(), 4);
    }
}
