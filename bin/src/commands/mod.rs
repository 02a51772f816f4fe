//! Command implementations and shared wiring.

pub(crate) mod catalog;
pub(crate) mod download;
pub(crate) mod update_symbols;
pub(crate) mod validate;

use anyhow::Result;
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use datagrab_catalog::{CatalogService, FilterConfig};
use datagrab_source::{AshareSource, DataSource, RateLimiter, SourceRouter, YahooSource};
use datagrab_store::OhlcvWriter;
use datagrab_types::{AssetType, Clock};

use crate::config::AppConfig;

/// Whole-operation budget for driver-initiated catalog refreshes.
pub(crate) const CATALOG_REFRESH_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared service graph built once per invocation.
pub(crate) struct AppContext {
    pub config: AppConfig,
    pub clock: Clock,
    pub data_root: PathBuf,
    pub catalog: Arc<CatalogService>,
    pub router: Arc<SourceRouter>,
    pub writer: Arc<OhlcvWriter>,
}

impl AppContext {
    /// Wires the catalog, sources, router and writer from configuration.
    pub fn build(config: AppConfig) -> Result<Self> {
        let clock = config.clock()?;
        let data_root = config.data_root();

        let catalog = Arc::new(CatalogService::new(
            &data_root,
            config.catalog.clone(),
            config.filters.clone(),
            clock,
        )?);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit)?);

        let yahoo: Arc<dyn DataSource> = Arc::new(YahooSource::new(
            config.yahoo.clone(),
            Arc::clone(&limiter),
            Arc::clone(&catalog),
            clock,
        )?);
        let ashare: Arc<dyn DataSource> = Arc::new(AshareSource::new(
            config.ashare.clone(),
            Arc::clone(&limiter),
            Arc::clone(&catalog),
            clock,
        )?);
        let mut overlay: HashMap<AssetType, Arc<dyn DataSource>> = HashMap::new();
        overlay.insert(AssetType::Ashare, ashare);
        let router = Arc::new(SourceRouter::new(yahoo, overlay));

        let writer = Arc::new(
            OhlcvWriter::new(&data_root, clock)
                .with_merge_on_incremental(config.storage.merge_on_incremental),
        );

        Ok(Self {
            config,
            clock,
            data_root,
            catalog,
            router,
            writer,
        })
    }
}

/// Instrument filter flags shared by catalog and download commands. CLI
/// filters extend the configured base filters; the tri-state flags
/// override them.
#[derive(Debug, Args, Default, Clone)]
pub(crate) struct FilterArgs {
    /// Symbol include regex (repeatable, comma-separable)
    #[arg(long = "include", value_name = "REGEX")]
    pub include: Vec<String>,

    /// Symbol exclude regex
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Symbol include prefix
    #[arg(long = "include-prefix", value_name = "PREFIX")]
    pub include_prefix: Vec<String>,

    /// Symbol exclude prefix
    #[arg(long = "exclude-prefix", value_name = "PREFIX")]
    pub exclude_prefix: Vec<String>,

    /// Explicit symbol allow list
    #[arg(long = "include-symbols", value_name = "SYMBOLS")]
    pub include_symbols: Vec<String>,

    /// Explicit symbol deny list
    #[arg(long = "exclude-symbols", value_name = "SYMBOLS")]
    pub exclude_symbols: Vec<String>,

    /// Name include regex
    #[arg(long = "include-name", value_name = "REGEX")]
    pub include_name: Vec<String>,

    /// Name exclude regex
    #[arg(long = "exclude-name", value_name = "REGEX")]
    pub exclude_name: Vec<String>,

    /// Exchange allow list (codes or aliases)
    #[arg(long = "include-exchange", value_name = "EXCHANGE")]
    pub include_exchange: Vec<String>,

    /// Exchange deny list
    #[arg(long = "exclude-exchange", value_name = "EXCHANGE")]
    pub exclude_exchange: Vec<String>,

    /// Market category allow list
    #[arg(long = "include-market", value_name = "MARKET")]
    pub include_market: Vec<String>,

    /// Market category deny list
    #[arg(long = "exclude-market", value_name = "MARKET")]
    pub exclude_market: Vec<String>,

    /// Fund category allow list
    #[arg(long = "include-fund-category", value_name = "CATEGORY")]
    pub include_fund_category: Vec<String>,

    /// Fund category deny list
    #[arg(long = "exclude-fund-category", value_name = "CATEGORY")]
    pub exclude_fund_category: Vec<String>,

    /// Keep only ETFs
    #[arg(long = "only-etf", conflicts_with = "exclude_etf")]
    pub only_etf: bool,

    /// Drop ETFs
    #[arg(long = "exclude-etf")]
    pub exclude_etf: bool,

    /// Keep only funds
    #[arg(long = "only-fund", conflicts_with = "exclude_fund")]
    pub only_fund: bool,

    /// Drop funds
    #[arg(long = "exclude-fund")]
    pub exclude_fund: bool,
}

fn split_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

impl FilterArgs {
    /// Converts the flags into a [`FilterConfig`] fragment.
    pub fn to_filter_config(&self) -> FilterConfig {
        let only_etf = if self.only_etf {
            Some(true)
        } else if self.exclude_etf {
            Some(false)
        } else {
            None
        };
        let only_fund = if self.only_fund {
            Some(true)
        } else if self.exclude_fund {
            Some(false)
        } else {
            None
        };
        FilterConfig {
            include_regex: split_values(&self.include),
            exclude_regex: split_values(&self.exclude),
            include_prefixes: split_values(&self.include_prefix),
            exclude_prefixes: split_values(&self.exclude_prefix),
            include_symbols: split_values(&self.include_symbols),
            exclude_symbols: split_values(&self.exclude_symbols),
            include_name_regex: split_values(&self.include_name),
            exclude_name_regex: split_values(&self.exclude_name),
            include_exchanges: split_values(&self.include_exchange),
            exclude_exchanges: split_values(&self.exclude_exchange),
            include_market_categories: split_values(&self.include_market),
            exclude_market_categories: split_values(&self.exclude_market),
            only_etf,
            only_fund,
            include_fund_categories: split_values(&self.include_fund_category),
            exclude_fund_categories: split_values(&self.exclude_fund_category),
        }
    }
}
