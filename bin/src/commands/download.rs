//! `download` - run a batch of OHLCV downloads.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use datagrab_catalog::merge_filters;
use datagrab_download::{DownloadStats, Downloader, ProgressCallback};
use datagrab_types::{Adjust, AssetType, DateRange, Interval};

use super::{AppContext, FilterArgs};

/// Default history window when no dates are given.
const DEFAULT_RANGE_DAYS: i64 = 365;

/// Download historical OHLCV data into the partitioned store.
#[derive(Debug, Args)]
pub(crate) struct DownloadArgs {
    /// Asset type: stock, ashare, forex, crypto, commodity
    #[arg(long = "asset-type", default_value = "stock")]
    pub asset_type: String,

    /// Comma-separated symbols; defaults to the filtered catalog
    #[arg(long)]
    pub symbols: Option<String>,

    /// Single symbol (repeatable)
    #[arg(long = "symbol")]
    pub symbol: Vec<String>,

    /// Comma-separated intervals (e.g. 1d,1wk); defaults from config
    #[arg(long)]
    pub intervals: Option<String>,

    /// Range start (YYYY-MM-DD); defaults to one year back
    #[arg(long)]
    pub start: Option<String>,

    /// Range end (YYYY-MM-DD); defaults to now
    #[arg(long)]
    pub end: Option<String>,

    /// Adjustment: none, auto, back, forward (front/backward accepted)
    #[arg(long)]
    pub adjust: Option<String>,

    /// Catalog truncation limit when symbols come from the catalog
    #[arg(long)]
    pub limit: Option<usize>,

    /// Re-run exactly the tasks recorded in the failures file
    #[arg(long = "only-failures")]
    pub only_failures: bool,

    /// Failures file path; defaults to <data_root>/failures.csv
    #[arg(long = "failures-file")]
    pub failures_file: Option<PathBuf>,

    /// Abort when the failures file contains any invalid row
    #[arg(long = "strict-failures-csv")]
    pub strict_failures_csv: bool,

    #[command(flatten)]
    pub filters: FilterArgs,
}

pub(crate) async fn run(ctx: &AppContext, args: &DownloadArgs) -> Result<i32> {
    let asset_type = AssetType::from_str(&args.asset_type)?;
    ctx.router.set_asset_type(asset_type);

    let mut symbols: Vec<String> = Vec::new();
    if let Some(joined) = &args.symbols {
        symbols.extend(joined.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string));
    }
    symbols.extend(args.symbol.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
    if symbols.is_empty() && !args.only_failures {
        let filters = merge_filters(&ctx.config.filters, Some(&args.filters.to_filter_config()));
        let limit = args.limit.or(Some(ctx.catalog.default_limit()));
        let result = ctx
            .catalog
            .get_catalog(asset_type, false, limit, Some(&filters))
            .await?;
        info!(source = %result.source, count = result.items.len(), "symbols from catalog");
        symbols = result.items.into_iter().map(|i| i.symbol).collect();
    }

    let intervals: Vec<Interval> = {
        let raw = args.intervals.as_deref().map_or_else(
            || ctx.config.intervals_default.clone(),
            |joined| {
                joined
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            },
        );
        raw.iter()
            .map(|token| Interval::from_str(token))
            .collect::<Result<_, _>>()?
    };

    let mut range = ctx.clock.default_range(DEFAULT_RANGE_DAYS);
    if let Some(start) = &args.start {
        range = DateRange::new(ctx.clock.parse_date(start)?, range.end)?;
    }
    if let Some(end) = &args.end {
        range = DateRange::new(range.start, ctx.clock.parse_date(end)?)?;
    }

    let adjust = match &args.adjust {
        Some(raw) => Adjust::from_str(raw)?,
        // Per-asset default: ashare data is usually consumed
        // back-adjusted, everything else provider-adjusted.
        None => match asset_type {
            AssetType::Ashare => ctx.config.ashare.adjust_default,
            _ => Adjust::Auto,
        },
    };

    let router: Arc<dyn datagrab_source::DataSource> = Arc::clone(&ctx.router) as Arc<dyn datagrab_source::DataSource>;
    let downloader = Downloader::new(router, Arc::clone(&ctx.writer), ctx.config.download.clone());
    let tasks = downloader.build_tasks(&symbols, &intervals, range.start, range.end, asset_type, adjust);
    let failures_path = args
        .failures_file
        .clone()
        .unwrap_or_else(|| ctx.data_root.join("failures.csv"));

    // Ctrl-C latches cancellation; workers unwind at their next gate.
    let control = downloader.control();
    tokio::spawn({
        let control = control.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                control.cancel();
            }
        }
    });

    let bar = ProgressBar::new(tasks.len().max(1) as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tasks {msg}")
            .expect("valid progress template")
            .progress_chars("=>-"),
    );
    let progress: Arc<ProgressCallback> = {
        let bar = bar.clone();
        Arc::new(move |stats: &DownloadStats| {
            // With --only-failures the task list is loaded inside run().
            bar.set_length(stats.total.max(1) as u64);
            bar.set_position(stats.completed as u64);
            bar.set_message(format!(
                "active={} failed={} skipped={}",
                stats.active, stats.failed, stats.skipped
            ));
        })
    };

    let failures = downloader
        .run(
            tasks,
            &failures_path,
            args.only_failures,
            args.strict_failures_csv,
            Some(progress),
        )
        .await
        .context("download run failed")?;
    bar.finish_and_clear();

    if failures.is_empty() {
        info!("download complete");
        Ok(0)
    } else {
        warn!(count = failures.len(), path = %failures_path.display(), "failures recorded");
        eprintln!(
            "{} task(s) failed; details in {}",
            failures.len(),
            failures_path.display()
        );
        Ok(1)
    }
}
