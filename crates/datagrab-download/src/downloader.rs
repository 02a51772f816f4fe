//! The scheduler proper: task product, bounded worker pool, per-task
//! incremental decisions and failure capture.

use chrono::{DateTime, Duration as ChronoDuration};
use chrono_tz::Tz;
use futures::StreamExt;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

use datagrab_source::{DataSource, SourceError};
use datagrab_store::{OhlcvFrame, OhlcvWriter, StoreError};
use datagrab_types::{Adjust, AssetType, Interval};

use crate::failures::{load_failures, write_failures};
use crate::task::format_failure_reason;
use crate::{DownloadControl, DownloadError, DownloadStats, DownloadTask, FailureRecord};

/// Scheduler tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Worker pool size.
    pub concurrency: usize,
    /// Maximum days per sub-range chunk.
    pub batch_days: i64,
    /// Upper bound of the per-worker startup jitter, in seconds.
    pub startup_jitter_max: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_days: 60,
            startup_jitter_max: 0.6,
        }
    }
}

/// Callback invoked under the stats lock after every counter change; must
/// not block.
pub type ProgressCallback = dyn Fn(&DownloadStats) + Send + Sync;

/// What one task amounted to.
enum TaskOutcome {
    /// A consolidated file was written.
    Written,
    /// The provider had no rows for the missing range.
    Empty,
    /// The existing file already covers the requested range.
    Skipped,
    /// Cancellation was observed before the writer step.
    Cancelled,
}

/// Executes batches of download tasks.
pub struct Downloader {
    source: Arc<dyn DataSource>,
    writer: Arc<OhlcvWriter>,
    config: DownloadConfig,
    control: DownloadControl,
}

impl Downloader {
    /// Creates a scheduler over a source and a writer.
    #[must_use]
    pub fn new(source: Arc<dyn DataSource>, writer: Arc<OhlcvWriter>, config: DownloadConfig) -> Self {
        Self {
            source,
            writer,
            config,
            control: DownloadControl::new(),
        }
    }

    /// Returns a handle for pausing, resuming and cancelling this run.
    #[must_use]
    pub fn control(&self) -> DownloadControl {
        self.control.clone()
    }

    /// Builds the `symbols × intervals` task product over one range.
    #[must_use]
    pub fn build_tasks(
        &self,
        symbols: &[String],
        intervals: &[Interval],
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        asset_type: AssetType,
        adjust: Adjust,
    ) -> Vec<DownloadTask> {
        let mut tasks = Vec::with_capacity(symbols.len() * intervals.len());
        for symbol in symbols {
            for interval in intervals {
                tasks.push(DownloadTask {
                    symbol: symbol.clone(),
                    interval: interval.clone(),
                    start,
                    end,
                    asset_type,
                    adjust,
                });
            }
        }
        tasks
    }

    /// Runs a batch to completion (or cancellation) and returns the
    /// failures. A non-empty return should propagate as a non-zero exit
    /// from the driver.
    ///
    /// # Errors
    ///
    /// Returns an error when the failures file cannot be read (with
    /// `only_failures`), fails strict validation, or cannot be written.
    pub async fn run(
        &self,
        mut tasks: Vec<DownloadTask>,
        failures_path: &Path,
        only_failures: bool,
        strict_failures_csv: bool,
        progress: Option<Arc<ProgressCallback>>,
    ) -> Result<Vec<FailureRecord>, DownloadError> {
        if only_failures {
            tasks = load_failures(failures_path, strict_failures_csv, self.writer.clock())?;
            info!(count = tasks.len(), "re-running failed tasks");
        }
        // Spread load across symbols so one provider shard is not hammered
        // in alphabetical order.
        tasks.shuffle(&mut rand::thread_rng());

        let stats = Mutex::new(DownloadStats::new(tasks.len()));
        let failures: Mutex<Vec<FailureRecord>> = Mutex::new(Vec::new());

        futures::stream::iter(tasks)
            .for_each_concurrent(self.config.concurrency.max(1), |task| {
                let stats = &stats;
                let failures = &failures;
                let progress = progress.clone();
                async move {
                    self.worker(task, stats, failures, progress.as_deref()).await;
                }
            })
            .await;

        let failures = failures.into_inner().expect("failures lock poisoned");
        if !failures.is_empty() {
            write_failures(failures_path, &failures)?;
            info!(count = failures.len(), path = %failures_path.display(), "failures recorded");
        }
        Ok(failures)
    }

    async fn worker(
        &self,
        task: DownloadTask,
        stats: &Mutex<DownloadStats>,
        failures: &Mutex<Vec<FailureRecord>>,
        progress: Option<&ProgressCallback>,
    ) {
        if self.control.is_cancelled() {
            return;
        }
        self.control.wait_if_paused().await;
        if self.control.is_cancelled() {
            return;
        }
        if self.config.startup_jitter_max > 0.0 {
            let jitter = {
                rand::thread_rng().gen_range(0.0..=self.config.startup_jitter_max)
            };
            tokio::time::sleep(Duration::from_secs_f64(jitter)).await;
        }

        {
            let mut s = stats.lock().expect("stats lock poisoned");
            s.active += 1;
            if let Some(cb) = progress {
                cb(&s);
            }
        }

        match self.run_task(&task).await {
            Ok(TaskOutcome::Skipped) => {
                stats.lock().expect("stats lock poisoned").skipped += 1;
            }
            Ok(_) => {}
            Err(reason) => {
                if !self.control.is_cancelled() {
                    error!(
                        asset_type = %task.asset_type,
                        symbol = %task.symbol,
                        interval = %task.interval,
                        start = %task.start.date_naive(),
                        end = %task.end.date_naive(),
                        adjust = %task.adjust,
                        reason,
                        "download failed"
                    );
                    let record = FailureRecord {
                        task: task.clone(),
                        reason,
                    };
                    failures
                        .lock()
                        .expect("failures lock poisoned")
                        .push(record.clone());
                    let mut s = stats.lock().expect("stats lock poisoned");
                    s.failed += 1;
                    s.push_recent(record);
                    if let Some(cb) = progress {
                        cb(&s);
                    }
                }
            }
        }

        let mut s = stats.lock().expect("stats lock poisoned");
        s.active -= 1;
        s.completed += 1;
        if let Some(cb) = progress {
            cb(&s);
        }
    }

    /// One task end-to-end: discover the existing file, decide
    /// skip/tail/full, fetch in chunks, merge and publish.
    async fn run_task(&self, task: &DownloadTask) -> Result<TaskOutcome, String> {
        if self.control.is_cancelled() {
            return Ok(TaskOutcome::Cancelled);
        }
        self.control.wait_if_paused().await;
        if self.control.is_cancelled() {
            return Ok(TaskOutcome::Cancelled);
        }

        let existing = self
            .writer
            .find_existing(task.asset_type, &task.symbol, &task.interval)
            .map_err(|e| store_reason(&e))?;

        let mut fetch_start = task.start;
        let mut range_start = task.start;
        let mut existing_path: Option<PathBuf> = None;
        if let Some(existing) = &existing {
            existing_path = Some(existing.path.clone());
            range_start = existing.start.min(task.start);
            if let Some(stored_max) = self.writer.read_range_max(&existing.path) {
                if existing.start <= task.start && stored_max >= task.end {
                    return Ok(TaskOutcome::Skipped);
                }
                if existing.start <= task.start {
                    fetch_start = self.writer.next_start(stored_max, &task.interval);
                }
            }
        }

        let Some(frame) = self.fetch_range(task, fetch_start, task.end).await? else {
            return Ok(TaskOutcome::Cancelled);
        };
        if frame.is_empty() {
            return Ok(TaskOutcome::Empty);
        }
        // The writer step is gated by a final cancel check: after
        // cancellation no new file may appear.
        if self.control.is_cancelled() {
            return Ok(TaskOutcome::Cancelled);
        }

        let output = self
            .writer
            .build_path(
                task.asset_type,
                &task.symbol,
                &task.interval,
                range_start,
                task.end,
            )
            .map_err(|e| store_reason(&e))?;
        self.writer
            .merge_and_write(existing_path.as_deref(), frame, &output, Some(task.adjust))
            .map_err(|e| store_reason(&e))?;
        Ok(TaskOutcome::Written)
    }

    /// Fetches `[start, end]` in chunks of at most `batch_days`,
    /// sequentially, with cancel/pause gates between chunks. Returns
    /// `None` when cancellation interrupted the sequence.
    async fn fetch_range(
        &self,
        task: &DownloadTask,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<Option<OhlcvFrame>, String> {
        let mut combined = OhlcvFrame::empty();
        for (chunk_start, chunk_end) in split_range(start, end, self.config.batch_days) {
            if self.control.is_cancelled() {
                return Ok(None);
            }
            self.control.wait_if_paused().await;
            if self.control.is_cancelled() {
                return Ok(None);
            }
            let result = self
                .source
                .fetch_ohlcv(&task.symbol, &task.interval, chunk_start, chunk_end, task.adjust)
                .await
                .map_err(|e| source_reason(&e))?;
            if !result.frame.is_empty() {
                combined.concat(result.frame);
            }
        }
        combined.dedup_sort();
        Ok(Some(combined))
    }
}

/// Splits `[start, end]` into consecutive chunks of at most `batch_days`
/// days, ordered by chunk start.
pub(crate) fn split_range(
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    batch_days: i64,
) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    let step = ChronoDuration::days(batch_days.max(1));
    let mut chunks = Vec::new();
    let mut current = start;
    while current < end {
        let chunk_end = (current + step).min(end);
        chunks.push((current, chunk_end));
        current = chunk_end;
    }
    chunks
}

fn source_reason(error: &SourceError) -> String {
    format_failure_reason("SourceError", &error.to_string())
}

fn store_reason(error: &StoreError) -> String {
    format_failure_reason("StoreError", &error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use datagrab_catalog::FilterConfig;
    use datagrab_source::OhlcvResult;
    use datagrab_store::{read_frame, ColumnPresence, OhlcvRow};
    use datagrab_types::{Clock, SymbolInfo};
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;

    fn naive(day: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Stub provider: per-symbol rows, failing symbols, optional delay.
    struct StubSource {
        rows: HashMap<String, Vec<(NaiveDateTime, f64)>>,
        failing: HashSet<String>,
        delay: Duration,
        calls: Mutex<Vec<(String, NaiveDateTime, NaiveDateTime)>>,
    }

    impl StubSource {
        fn new() -> Self {
            Self {
                rows: HashMap::new(),
                failing: HashSet::new(),
                delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_rows(mut self, symbol: &str, days: &[u32]) -> Self {
            self.rows.insert(
                symbol.to_string(),
                days.iter().map(|d| (naive(*d), 100.0 + f64::from(*d))).collect(),
            );
            self
        }

        fn with_failing(mut self, symbol: &str) -> Self {
            self.failing.insert(symbol.to_string());
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> Vec<(String, NaiveDateTime, NaiveDateTime)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DataSource for StubSource {
        async fn list_symbols(
            &self,
            _asset_type: AssetType,
            _refresh: bool,
            _limit: Option<usize>,
            _filters_override: Option<&FilterConfig>,
        ) -> Result<Vec<SymbolInfo>, SourceError> {
            Ok(Vec::new())
        }

        async fn fetch_ohlcv(
            &self,
            symbol: &str,
            _interval: &Interval,
            start: DateTime<Tz>,
            end: DateTime<Tz>,
            adjust: Adjust,
        ) -> Result<OhlcvResult, SourceError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.lock().unwrap().push((
                symbol.to_string(),
                start.naive_local(),
                end.naive_local(),
            ));
            if self.failing.contains(symbol) {
                return Err(SourceError::Fatal {
                    symbol: symbol.to_string(),
                    message: "stub says no".to_string(),
                });
            }
            let window_start = start.naive_local();
            let window_end = end.naive_local();
            let rows: Vec<OhlcvRow> = self
                .rows
                .get(symbol)
                .map(|rows| {
                    rows.iter()
                        .filter(|(dt, _)| *dt >= window_start && *dt <= window_end)
                        .map(|(dt, close)| OhlcvRow::at_close(*dt, *close))
                        .collect()
                })
                .unwrap_or_default();
            Ok(OhlcvResult {
                frame: OhlcvFrame::new(
                    rows,
                    ColumnPresence {
                        close: true,
                        ..ColumnPresence::default()
                    },
                ),
                adjustment: adjust,
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        data_root: PathBuf,
        writer: Arc<OhlcvWriter>,
        clock: Clock,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let data_root = dir.path().to_path_buf();
        let clock = Clock::default();
        Fixture {
            _dir: dir,
            data_root: data_root.clone(),
            writer: Arc::new(OhlcvWriter::new(data_root, clock)),
            clock,
        }
    }

    fn downloader(fx: &Fixture, source: Arc<StubSource>) -> Downloader {
        Downloader::new(
            source,
            Arc::clone(&fx.writer),
            DownloadConfig {
                concurrency: 2,
                batch_days: 60,
                startup_jitter_max: 0.0,
            },
        )
    }

    fn tasks_for(fx: &Fixture, downloader: &Downloader, symbols: &[&str]) -> Vec<DownloadTask> {
        let symbols: Vec<String> = symbols.iter().map(|s| (*s).to_string()).collect();
        downloader.build_tasks(
            &symbols,
            &["1d".parse().unwrap()],
            fx.clock.parse_date("2024-01-01").unwrap(),
            fx.clock.parse_date("2024-01-31").unwrap(),
            AssetType::Stock,
            Adjust::Auto,
        )
    }

    #[test]
    fn test_split_range_chunks() {
        let clock = Clock::default();
        let start = clock.parse_date("2024-01-01").unwrap();
        let end = clock.parse_date("2024-01-21").unwrap();
        let chunks = split_range(start, end, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0, start);
        assert_eq!(chunks.last().unwrap().1, end);
        for (chunk_start, chunk_end) in &chunks {
            assert!(*chunk_end - *chunk_start <= ChronoDuration::days(10));
        }
        assert!(split_range(end, start, 10).is_empty());
    }

    #[test]
    fn test_build_tasks_is_cartesian_product() {
        let fx = fixture();
        let source = Arc::new(StubSource::new());
        let dl = downloader(&fx, source);
        let intervals: Vec<Interval> =
            vec!["1d".parse().unwrap(), "1wk".parse().unwrap()];
        let tasks = dl.build_tasks(
            &["A".to_string(), "B".to_string(), "C".to_string()],
            &intervals,
            fx.clock.parse_date("2024-01-01").unwrap(),
            fx.clock.parse_date("2024-01-31").unwrap(),
            AssetType::Stock,
            Adjust::None,
        );
        assert_eq!(tasks.len(), 6);
    }

    #[tokio::test]
    async fn test_fresh_write() {
        let fx = fixture();
        let source = Arc::new(StubSource::new().with_rows("AAPL", &[2, 3]));
        let dl = downloader(&fx, Arc::clone(&source));
        let tasks = tasks_for(&fx, &dl, &["AAPL"]);
        let failures_path = fx.data_root.join("failures.csv");

        let failures = dl.run(tasks, &failures_path, false, false, None).await.unwrap();
        assert!(failures.is_empty());

        let expected = fx.data_root.join("stock/AAPL/1d_20240101_20240131.parquet");
        assert!(expected.exists());
        let (frame, adjustment) = read_frame(&expected).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.rows()[0].datetime, naive(2));
        assert_eq!(frame.rows()[1].close, Some(103.0));
        assert_eq!(adjustment.as_deref(), Some("auto"));
    }

    #[tokio::test]
    async fn test_incremental_extension() {
        let fx = fixture();
        // Prior consolidated file through Jan 15.
        let prior = fx
            .writer
            .build_path(
                AssetType::Stock,
                "AAPL",
                &"1d".parse().unwrap(),
                fx.clock.parse_date("2024-01-01").unwrap(),
                fx.clock.parse_date("2024-01-15").unwrap(),
            )
            .unwrap();
        fx.writer
            .merge_and_write(
                None,
                OhlcvFrame::new(
                    vec![
                        OhlcvRow::at_close(naive(2), 102.0),
                        OhlcvRow::at_close(naive(15), 115.0),
                    ],
                    ColumnPresence {
                        close: true,
                        ..ColumnPresence::default()
                    },
                ),
                &prior,
                None,
            )
            .unwrap();

        let source = Arc::new(StubSource::new().with_rows("AAPL", &[16, 17, 18, 19, 20]));
        let dl = downloader(&fx, Arc::clone(&source));
        let tasks = tasks_for(&fx, &dl, &["AAPL"]);
        let failures_path = fx.data_root.join("failures.csv");
        dl.run(tasks, &failures_path, false, false, None).await.unwrap();

        assert!(!prior.exists());
        let merged = fx.data_root.join("stock/AAPL/1d_20240101_20240131.parquet");
        let (frame, _) = read_frame(&merged).unwrap();
        let days: Vec<u32> = frame
            .rows()
            .iter()
            .map(|r| chrono::Datelike::day(&r.datetime.date()))
            .collect();
        assert_eq!(days, vec![2, 15, 16, 17, 18, 19, 20]);

        // Only the tail past the stored maximum was requested.
        let calls = source.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, naive(16));
    }

    #[tokio::test]
    async fn test_full_subsumption_skips_without_source_call() {
        let fx = fixture();
        let prior = fx
            .writer
            .build_path(
                AssetType::Stock,
                "AAPL",
                &"1d".parse().unwrap(),
                fx.clock.parse_date("2024-01-01").unwrap(),
                fx.clock.parse_date("2024-01-31").unwrap(),
            )
            .unwrap();
        fx.writer
            .merge_and_write(
                None,
                OhlcvFrame::new(
                    vec![
                        OhlcvRow::at_close(naive(2), 102.0),
                        OhlcvRow::at_close(naive(31), 131.0),
                    ],
                    ColumnPresence {
                        close: true,
                        ..ColumnPresence::default()
                    },
                ),
                &prior,
                None,
            )
            .unwrap();
        let before = std::fs::read(&prior).unwrap();

        let source = Arc::new(StubSource::new().with_rows("AAPL", &[2, 31]));
        let dl = downloader(&fx, Arc::clone(&source));
        let stats_seen = Arc::new(Mutex::new(DownloadStats::default()));
        let sink = Arc::clone(&stats_seen);
        let progress: Arc<ProgressCallback> = Arc::new(move |s: &DownloadStats| {
            *sink.lock().unwrap() = s.clone();
        });
        let tasks = tasks_for(&fx, &dl, &["AAPL"]);
        dl.run(tasks, &fx.data_root.join("failures.csv"), false, false, Some(progress))
            .await
            .unwrap();

        assert!(source.calls().is_empty());
        let final_stats = stats_seen.lock().unwrap().clone();
        assert_eq!(final_stats.skipped, 1);
        assert_eq!(final_stats.completed, 1);
        assert_eq!(std::fs::read(&prior).unwrap(), before);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let fx = fixture();
        let source = Arc::new(StubSource::new().with_rows("AAPL", &[2, 3, 30, 31]));
        let dl = downloader(&fx, Arc::clone(&source));
        let failures_path = fx.data_root.join("failures.csv");

        dl.run(tasks_for(&fx, &dl, &["AAPL"]), &failures_path, false, false, None)
            .await
            .unwrap();
        let file = fx.data_root.join("stock/AAPL/1d_20240101_20240131.parquet");
        let before = std::fs::read(&file).unwrap();

        let dl2 = downloader(&fx, Arc::clone(&source));
        let stats_seen = Arc::new(Mutex::new(DownloadStats::default()));
        let sink = Arc::clone(&stats_seen);
        let progress: Arc<ProgressCallback> = Arc::new(move |s: &DownloadStats| {
            *sink.lock().unwrap() = s.clone();
        });
        dl2.run(
            tasks_for(&fx, &dl2, &["AAPL"]),
            &failures_path,
            false,
            false,
            Some(progress),
        )
        .await
        .unwrap();

        assert_eq!(stats_seen.lock().unwrap().skipped, 1);
        assert_eq!(std::fs::read(&file).unwrap(), before);
    }

    #[tokio::test]
    async fn test_failures_roundtrip() {
        let fx = fixture();
        let source = Arc::new(
            StubSource::new()
                .with_rows("AAPL", &[2, 3])
                .with_failing("BAD"),
        );
        let dl = downloader(&fx, Arc::clone(&source));
        let failures_path = fx.data_root.join("failures.csv");

        let failures = dl
            .run(tasks_for(&fx, &dl, &["AAPL", "BAD"]), &failures_path, false, false, None)
            .await
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task.symbol, "BAD");
        assert!(failures[0].reason.starts_with("SourceError:"));
        assert!(failures_path.exists());

        // The retry run executes exactly the failed task.
        let source2 = Arc::new(StubSource::new().with_rows("BAD", &[2]));
        let dl2 = downloader(&fx, Arc::clone(&source2));
        let failures = dl2
            .run(Vec::new(), &failures_path, true, true, None)
            .await
            .unwrap();
        assert!(failures.is_empty());
        let retried: Vec<String> = source2.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(retried, vec!["BAD"]);
    }

    #[tokio::test]
    async fn test_empty_fetch_writes_nothing() {
        let fx = fixture();
        let source = Arc::new(StubSource::new()); // no rows at all
        let dl = downloader(&fx, Arc::clone(&source));
        let failures = dl
            .run(
                tasks_for(&fx, &dl, &["GHOST"]),
                &fx.data_root.join("failures.csv"),
                false,
                false,
                None,
            )
            .await
            .unwrap();
        assert!(failures.is_empty());
        assert!(!fx.data_root.join("stock/GHOST").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pause_and_cancel() {
        let fx = fixture();
        let symbols: Vec<String> = (0..24).map(|i| format!("SYM{i}")).collect();
        let mut source = StubSource::new().with_delay(Duration::from_millis(30));
        for symbol in &symbols {
            source.rows.insert(symbol.clone(), vec![(naive(2), 100.0)]);
        }
        let source = Arc::new(source);
        let dl = Arc::new(Downloader::new(
            Arc::clone(&source) as Arc<dyn DataSource>,
            Arc::clone(&fx.writer),
            DownloadConfig {
                concurrency: 3,
                batch_days: 60,
                startup_jitter_max: 0.0,
            },
        ));
        let control = dl.control();
        let stats_seen = Arc::new(Mutex::new(DownloadStats::default()));
        let sink = Arc::clone(&stats_seen);
        let progress: Arc<ProgressCallback> = Arc::new(move |s: &DownloadStats| {
            *sink.lock().unwrap() = s.clone();
        });

        let symbol_refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let tasks = tasks_for(&fx, &dl, &symbol_refs);
        let failures_path = fx.data_root.join("failures.csv");
        let run = {
            let dl = Arc::clone(&dl);
            tokio::spawn(async move {
                dl.run(tasks, &failures_path, false, false, Some(progress)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(120)).await;
        control.pause();
        tokio::time::sleep(Duration::from_millis(120)).await;
        let at_pause = stats_seen.lock().unwrap().completed;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let while_paused = stats_seen.lock().unwrap().completed;
        // In-flight chunk fetches may finish, but nothing new starts.
        assert!(while_paused <= at_pause + 3, "completed kept growing while paused");

        control.resume();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let after_resume = stats_seen.lock().unwrap().completed;
        assert!(after_resume > while_paused, "completed did not resume");

        control.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(result.is_empty());

        // No file appears after cancellation has settled.
        let count_files = || {
            walk_parquet(&fx.data_root).len()
        };
        let after_cancel = count_files();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count_files(), after_cancel);
        let final_stats = stats_seen.lock().unwrap().clone();
        assert!(final_stats.completed <= final_stats.total);
    }

    fn walk_parquet(root: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().is_some_and(|e| e == "parquet") {
                    out.push(path);
                }
            }
        }
        out
    }
}
