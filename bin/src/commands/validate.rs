//! `validate` - scan stored files for quality defects.

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use datagrab_validate::{
    iter_parquet_files, validate_batch, BatchProgress, FileSummary, IssueFormat, IssueSink,
    QualityIssue, Severity,
};

use super::AppContext;

/// Issue export format flag.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ExportFormat {
    /// One JSON object per line.
    Jsonl,
    /// CSV with a fixed column order.
    Csv,
}

impl From<ExportFormat> for IssueFormat {
    fn from(value: ExportFormat) -> Self {
        match value {
            ExportFormat::Jsonl => Self::Jsonl,
            ExportFormat::Csv => Self::Csv,
        }
    }
}

/// Validate parquet data quality under the data root.
#[derive(Debug, Args)]
pub(crate) struct ValidateArgs {
    /// Directory to scan directly (overrides --root)
    pub path: Option<PathBuf>,

    /// Data root to scan; defaults to the configured one
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Asset type filter
    #[arg(long = "asset-type")]
    pub asset_type: Option<String>,

    /// Symbol filter (single symbol)
    #[arg(long)]
    pub symbol: Option<String>,

    /// Interval filter (e.g. 1d, 5m)
    #[arg(long)]
    pub interval: Option<String>,

    /// Write issues to this file (jsonl or csv per --format)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Issues output format
    #[arg(long, value_enum, default_value = "jsonl")]
    pub format: ExportFormat,

    /// Only print totals
    #[arg(long)]
    pub summary: bool,

    /// Worker threads; defaults to min(cpu, files, 32)
    #[arg(long)]
    pub workers: Option<usize>,
}

pub(crate) async fn run(ctx: &AppContext, args: &ValidateArgs) -> Result<i32> {
    let root = args
        .path
        .clone()
        .or_else(|| args.root.clone())
        .unwrap_or_else(|| ctx.data_root.clone());
    if args.symbol.is_some() && args.asset_type.is_none() {
        bail!("--symbol requires --asset-type");
    }

    let files = iter_parquet_files(
        &root,
        args.asset_type.as_deref(),
        args.symbol.as_deref(),
        args.interval.as_deref(),
    );
    if files.is_empty() {
        warn!(root = %root.display(), "no parquet files found");
        return Ok(0);
    }
    info!(count = files.len(), root = %root.display(), "validating");

    let sink = match &args.out {
        Some(out) => Some(IssueSink::create(out, args.format.into()).with_context(|| {
            format!("failed to create issues file {}", out.display())
        })?),
        None => None,
    };

    let error_count = AtomicUsize::new(0);
    let issue_count = AtomicUsize::new(0);
    let only_summary = args.summary;

    let clock = ctx.clock;
    let workers = args.workers;
    let on_issue = |issue: &QualityIssue| {
        issue_count.fetch_add(1, Ordering::SeqCst);
        if issue.severity == Severity::Error {
            error_count.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(sink) = &sink {
            if let Err(e) = sink.write(issue) {
                warn!(error = %e, "issue write failed");
            }
        }
    };
    let on_result = |summary: &FileSummary, issues: &[QualityIssue], progress: &BatchProgress| {
        if only_summary {
            return;
        }
        let missing = if summary.missing_columns.is_empty() {
            "-".to_string()
        } else {
            summary.missing_columns.join(",")
        };
        info!(
            file = %summary.path.display(),
            progress = format!("{}/{}", progress.completed, progress.total),
            rows = summary.row_count,
            min = summary.min_dt.map(|d| d.to_string()).unwrap_or_default(),
            max = summary.max_dt.map(|d| d.to_string()).unwrap_or_default(),
            duplicates = summary.duplicate_datetime_count,
            issues = issues.len(),
            missing,
            "scanned"
        );
    };

    // The scan is CPU and file I/O bound; run it off the async runtime.
    let (summaries, _) = tokio::task::block_in_place(|| {
        validate_batch(&files, workers, &clock, Some(&on_result), Some(&on_issue))
    });
    if let Some(sink) = &sink {
        sink.finish()?;
    }

    let errors = error_count.load(Ordering::SeqCst);
    let issues = issue_count.load(Ordering::SeqCst);
    println!(
        "validated files={} issues={} (errors={} warnings={})",
        summaries.len(),
        issues,
        errors,
        issues - errors
    );
    if let Some(out) = &args.out {
        println!("issues written to {}", out.display());
    }
    Ok(if errors > 0 { 1 } else { 0 })
}
