//! datagrab CLI - batch historical OHLCV downloader.

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{catalog, download, update_symbols, validate, AppContext};
use config::AppConfig;

#[derive(Parser)]
#[command(name = "datagrab")]
#[command(about = "Batch historical OHLCV downloader with incremental parquet storage", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file path (YAML or TOML); also via DATAGRAB_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override storage.data_root for this invocation
    #[arg(long = "data-root", global = true)]
    data_root: Option<PathBuf>,

    /// Console log level (error, warn, info, debug, trace)
    #[arg(long = "log-level", default_value = "info", global = true)]
    log_level: String,

    /// Verbose download logging on the console
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Download log file; defaults to
    /// <data_root>/logs/download_YYYYMMDD_HHMMSS.log
    #[arg(long = "download-log-file", global = true)]
    download_log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download and cache the symbol list for an asset class
    Catalog(catalog::CatalogArgs),

    /// Refresh the stock and ashare symbol caches (network-only)
    UpdateSymbols(update_symbols::UpdateSymbolsArgs),

    /// Download historical OHLCV data
    Download(download::DownloadArgs),

    /// Validate stored parquet data quality
    Validate(validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e:#}");
            return ExitCode::from(2);
        }
    };
    if let Some(data_root) = &cli.data_root {
        config.storage.data_root = data_root.display().to_string();
    }

    // The download command keeps the console quiet unless -v and mirrors
    // everything into a per-run log file.
    let log_file = match &cli.command {
        Commands::Download(_) => Some(cli.download_log_file.clone().unwrap_or_else(|| {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            config
                .data_root()
                .join("logs")
                .join(format!("download_{stamp}.log"))
        })),
        _ => None,
    };
    let console_level = match &cli.command {
        Commands::Download(_) if !cli.verbose => "warn".to_string(),
        _ => cli.log_level.clone(),
    };
    if let Err(e) = logging::init(&console_level, log_file.as_deref()) {
        eprintln!("logging setup failed: {e:#}");
        return ExitCode::from(2);
    }
    if let Some(log_file) = &log_file {
        eprintln!("download log: {}", log_file.display());
    }

    match dispatch(cli.command, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn dispatch(command: Commands, config: AppConfig) -> Result<u8> {
    let ctx = AppContext::build(config)?;
    match command {
        Commands::Catalog(args) => {
            catalog::run(&ctx, &args).await?;
            Ok(0)
        }
        Commands::UpdateSymbols(args) => {
            update_symbols::run(&ctx, &args).await?;
            Ok(0)
        }
        Commands::Download(args) => {
            let code = download::run(&ctx, &args).await?;
            Ok(u8::try_from(code).unwrap_or(1))
        }
        Commands::Validate(args) => {
            let code = validate::run(&ctx, &args).await?;
            Ok(u8::try_from(code).unwrap_or(1))
        }
    }
}
