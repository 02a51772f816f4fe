//! Incremental per-symbol writer.
//!
//! One consolidated file per `(asset_type, symbol, interval)`:
//! `data_root/<asset_type>/<symbol>/<interval>_YYYYMMDD_YYYYMMDD.parquet`.
//! New rows are merged into the predecessor and the result is published
//! atomically; the predecessor is unlinked only after the rename succeeds.

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use datagrab_types::{Adjust, AssetType, Clock, Interval};

use crate::fs::{atomic_write_bytes, ensure_descendant, ensure_dir, tmp_path, validate_symbol};
use crate::{parquet_io, OhlcvFrame, StoreError};

/// The consolidated file already on disk for a triple, recovered from its
/// filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRange {
    /// Path of the file.
    pub path: PathBuf,
    /// Start date encoded in the filename, at local midnight.
    pub start: DateTime<Tz>,
    /// End date encoded in the filename, at local midnight.
    pub end: DateTime<Tz>,
}

/// Writes consolidated per-symbol parquet files under a data root.
#[derive(Debug, Clone)]
pub struct OhlcvWriter {
    data_root: PathBuf,
    clock: Clock,
    merge_on_incremental: bool,
}

impl OhlcvWriter {
    /// Creates a writer rooted at `data_root`.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>, clock: Clock) -> Self {
        Self {
            data_root: data_root.into(),
            clock,
            merge_on_incremental: true,
        }
    }

    /// Disables merging with predecessors (each write replaces wholesale).
    #[must_use]
    pub const fn with_merge_on_incremental(mut self, merge: bool) -> Self {
        self.merge_on_incremental = merge;
        self
    }

    /// Returns the configured data root.
    #[must_use]
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Returns the clock used for path-date formatting.
    #[must_use]
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Returns the directory holding a symbol's files.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol token is unsafe.
    pub fn symbol_dir(&self, asset_type: AssetType, symbol: &str) -> Result<PathBuf, StoreError> {
        validate_symbol(symbol)?;
        let dir = self.data_root.join(asset_type.as_str()).join(symbol);
        ensure_descendant(&self.data_root, &dir)?;
        Ok(dir)
    }

    /// Builds the output path for a triple and date bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is unsafe or the path escapes the
    /// data root.
    pub fn build_path(
        &self,
        asset_type: AssetType,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.symbol_dir(asset_type, symbol)?;
        let name = format!(
            "{}_{}_{}.parquet",
            interval.as_str(),
            self.clock.format_path_date(start),
            self.clock.format_path_date(end),
        );
        let path = dir.join(name);
        ensure_descendant(&self.data_root, &path)?;
        Ok(path)
    }

    /// Finds the consolidated file for a triple, choosing the one with the
    /// greatest end date when several match.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol token is unsafe.
    pub fn find_existing(
        &self,
        asset_type: AssetType,
        symbol: &str,
        interval: &Interval,
    ) -> Result<Option<ExistingRange>, StoreError> {
        let dir = self.symbol_dir(asset_type, symbol)?;
        if !dir.is_dir() {
            return Ok(None);
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "symbol directory unreadable");
                return Ok(None);
            }
        };
        let mut candidates: Vec<ExistingRange> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if let Some(range) = self.parse_range(&path, interval) {
                candidates.push(range);
            }
        }
        candidates.sort_by_key(|c| c.end);
        Ok(candidates.pop())
    }

    /// Parses `<interval>_YYYYMMDD_YYYYMMDD.parquet` into an
    /// [`ExistingRange`]. Returns `None` for anything else.
    #[must_use]
    pub fn parse_range(&self, path: &Path, interval: &Interval) -> Option<ExistingRange> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(".parquet")?;
        let rest = stem.strip_prefix(interval.as_str())?.strip_prefix('_')?;
        let (start_str, end_str) = rest.split_once('_')?;
        if start_str.len() != 8 || end_str.len() != 8 || rest.contains('/') {
            return None;
        }
        let parse = |s: &str| -> Option<DateTime<Tz>> {
            let date = NaiveDate::parse_from_str(s, "%Y%m%d").ok()?;
            Some(self.clock.anchor(date.and_hms_opt(0, 0, 0)?))
        };
        let start = parse(start_str)?;
        let end = parse(end_str)?;
        if start > end {
            return None;
        }
        Some(ExistingRange {
            path: path.to_path_buf(),
            start,
            end,
        })
    }

    /// Reads the maximum stored `datetime` of a file, anchored in the
    /// operational timezone. Unreadable files yield `None` with a warning.
    #[must_use]
    pub fn read_range_max(&self, path: &Path) -> Option<DateTime<Tz>> {
        match parquet_io::read_max_datetime(path) {
            Ok(max) => max.map(|naive| self.clock.anchor(naive)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "max datetime read failed");
                None
            }
        }
    }

    /// Returns the first timestamp an incremental fetch should request
    /// after `last`.
    #[must_use]
    pub fn next_start(&self, last: DateTime<Tz>, interval: &Interval) -> DateTime<Tz> {
        last + interval.delta()
    }

    /// Merges `new_frame` with the predecessor (if any), enforces the
    /// canonical schema and publishes `output_path` atomically. The
    /// predecessor is removed only after the new file is in place.
    ///
    /// # Errors
    ///
    /// Returns an error when the output escapes the data root, when `close`
    /// is absent after the merge, or on I/O and encoding failures.
    pub fn merge_and_write(
        &self,
        existing_path: Option<&Path>,
        new_frame: OhlcvFrame,
        output_path: &Path,
        adjustment: Option<Adjust>,
    ) -> Result<(), StoreError> {
        ensure_descendant(&self.data_root, output_path)?;
        if let Some(parent) = output_path.parent() {
            ensure_dir(parent)?;
        }

        let mut merged = new_frame;
        let prior = existing_path.filter(|p| self.merge_on_incremental && p.exists());
        if let Some(prior_path) = prior {
            match parquet_io::read_frame(prior_path) {
                Ok((prior_frame, _)) => {
                    let mut combined = prior_frame;
                    combined.concat(merged);
                    merged = combined;
                }
                Err(e) => {
                    // Corrupt predecessor; the new data stands alone.
                    warn!(path = %prior_path.display(), error = %e, "existing file ignored");
                }
            }
        }
        merged.dedup_sort();

        if !merged.presence().close {
            return Err(StoreError::MissingRequiredColumn {
                column: "close",
                path: output_path.to_path_buf(),
            });
        }
        let missing = merged.presence().missing_optional();
        if !missing.is_empty() {
            warn!(
                path = %output_path.display(),
                columns = missing.join(","),
                "optional columns missing, writing typed nulls"
            );
        }

        let tmp = tmp_path(output_path);
        parquet_io::write_frame(&tmp, &merged, adjustment.map(|a| a.as_str()))?;
        fs::rename(&tmp, output_path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Rename {
                from: tmp.clone(),
                to: output_path.to_path_buf(),
                source: e,
            }
        })?;

        if let Some(prior_path) = prior {
            if prior_path != output_path && prior_path.exists() {
                fs::remove_file(prior_path).map_err(|e| StoreError::RemoveFile {
                    path: prior_path.to_path_buf(),
                    source: e,
                })?;
            }
        }
        Ok(())
    }

    /// Writes raw bytes under the data root atomically (used for sidecar
    /// files such as `failures.csv`).
    ///
    /// # Errors
    ///
    /// Returns an error when the path escapes the root or the write fails.
    pub fn write_sidecar(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        ensure_descendant(&self.data_root, path)?;
        atomic_write_bytes(path, data)
    }
}
