//! The catalog service: cache-first load, retried remote fetch, fallback
//! chain and filter application.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use datagrab_types::{AssetType, Clock, SymbolInfo};

use crate::alias::{exchange_alias, fund_category_alias, market_alias};
use crate::cache::{load_cache, write_cache};
use crate::filters::{CompiledFilters, FilterConfig};
use crate::presets::static_catalog;
use crate::{ashare, remote, CatalogError};

/// Tuning for catalog fetches.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Remote retry attempts after the first try.
    pub retries: u32,
    /// Initial delay between retries, in seconds.
    pub sleep_sec: f64,
    /// Multiplier applied to the delay after each failed attempt.
    pub retry_backoff: f64,
    /// Default truncation limit applied when the caller gives none.
    pub limit: usize,
    /// Request timeout in seconds; generous to tolerate cross-border
    /// latency on the listing endpoints.
    pub timeout_sec: u64,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            sleep_sec: 0.6,
            retry_backoff: 1.5,
            limit: 500,
            timeout_sec: 25,
            proxy: None,
        }
    }
}

/// Where a catalog's items came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    /// Local cache hit.
    Cache,
    /// Fresh remote fetch.
    Remote,
    /// Remote failed; served from the local cache.
    CacheFallback,
    /// Remote and cache failed; served from the built-in preset.
    StaticFallback,
}

impl CatalogSource {
    /// Returns the provenance tag as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Remote => "remote",
            Self::CacheFallback => "cache-fallback",
            Self::StaticFallback => "static-fallback",
        }
    }
}

impl std::fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Distinct attribute values present in a catalog, raw codes and display
/// aliases both, for building filter choices interactively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Exchange codes and aliases.
    pub exchanges: Vec<String>,
    /// Market category codes and aliases.
    pub market_categories: Vec<String>,
    /// Fund category codes and aliases.
    pub fund_categories: Vec<String>,
}

impl FilterOptions {
    fn derive(items: &[SymbolInfo]) -> Self {
        use std::collections::BTreeSet;
        let mut exchanges = BTreeSet::new();
        let mut markets = BTreeSet::new();
        let mut funds = BTreeSet::new();
        for item in items {
            if let Some(exchange) = item.exchange.as_deref() {
                exchanges.insert(exchange.to_string());
                if let Some(alias) = exchange_alias(Some(exchange)) {
                    exchanges.insert(alias.to_string());
                }
            }
            if let Some(market) = item.market_category.as_deref() {
                markets.insert(market.to_string());
                if let Some(alias) = market_alias(Some(market)) {
                    markets.insert(alias.to_string());
                }
            }
            if let Some(fund) = item.fund_category.as_deref() {
                funds.insert(fund.to_string());
                if let Some(alias) = fund_category_alias(Some(fund)) {
                    funds.insert(alias.to_string());
                }
            }
        }
        Self {
            exchanges: exchanges.into_iter().collect(),
            market_categories: markets.into_iter().collect(),
            fund_categories: funds.into_iter().collect(),
        }
    }
}

/// A filtered catalog plus its provenance.
#[derive(Debug, Clone)]
pub struct CatalogResult {
    /// Filtered (and truncated) instruments, in catalog order.
    pub items: Vec<SymbolInfo>,
    /// Where the items came from.
    pub source: CatalogSource,
    /// Number of instruments that passed the filters, before truncation.
    pub total_count: usize,
    /// Attribute values available for interactive filter construction.
    pub options: FilterOptions,
}

/// Progress of a named catalog sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The step began.
    Start,
    /// The step produced intermediate progress.
    Progress,
    /// The step finished.
    Done,
}

/// Callback invoked per catalog sub-step; must not block.
pub type ProgressFn = dyn Fn(&str, StepStatus, Option<&str>) + Send + Sync;

/// Materializes and filters instrument universes with remote/cache
/// failover.
pub struct CatalogService {
    data_root: PathBuf,
    config: CatalogConfig,
    filters: FilterConfig,
    clock: Clock,
    client: reqwest::Client,
    progress: Option<Arc<ProgressFn>>,
}

impl CatalogService {
    /// Creates a service rooted at `data_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (e.g. an
    /// invalid proxy URL).
    pub fn new(
        data_root: impl Into<PathBuf>,
        config: CatalogConfig,
        filters: FilterConfig,
        clock: Clock,
    ) -> Result<Self, CatalogError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("datagrab/", env!("CARGO_PKG_VERSION")))
            .gzip(true);
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).map_err(|e| CatalogError::Http(e.to_string()))?,
            );
        }
        let client = builder
            .build()
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        Ok(Self {
            data_root: data_root.into(),
            config,
            filters,
            clock,
            client,
            progress: None,
        })
    }

    /// Installs a progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the cache file path for an asset class.
    #[must_use]
    pub fn cache_path(&self, asset_type: AssetType) -> PathBuf {
        self.data_root
            .join("catalog")
            .join(format!("{}_symbols.csv", asset_type.as_str()))
    }

    /// Returns the configured default truncation limit.
    #[must_use]
    pub const fn default_limit(&self) -> usize {
        self.config.limit
    }

    fn emit(&self, step: &str, status: StepStatus, detail: Option<&str>) {
        if let Some(progress) = &self.progress {
            (progress.as_ref())(step, status, detail);
        }
    }

    /// Produces a filtered catalog for an asset class.
    ///
    /// With `refresh=false` the local cache is preferred; otherwise the
    /// remote endpoint is fetched with retry and the cache rewritten. On
    /// remote failure the cache, then the built-in preset, serve as
    /// fallbacks.
    ///
    /// # Errors
    ///
    /// Returns an error when no source can produce a catalog, or when the
    /// cache cannot be read or rewritten.
    pub async fn get_catalog(
        &self,
        asset_type: AssetType,
        refresh: bool,
        limit: Option<usize>,
        filters_override: Option<&FilterConfig>,
    ) -> Result<CatalogResult, CatalogError> {
        let filters = CompiledFilters::compile(filters_override.unwrap_or(&self.filters));
        let cache_path = self.cache_path(asset_type);

        if !refresh {
            self.emit("cache", StepStatus::Start, None);
            if let Some(items) = load_cache(&cache_path, asset_type)? {
                self.emit("cache", StepStatus::Done, Some(&items.len().to_string()));
                return Ok(finalize(items, CatalogSource::Cache, limit, &filters));
            }
            self.emit("cache", StepStatus::Done, Some("miss"));
        }

        let last_error = match self.fetch_with_retry(asset_type).await {
            Ok(items) => {
                write_cache(&cache_path, &items)?;
                info!(asset_type = %asset_type, count = items.len(), "catalog refreshed");
                return Ok(finalize(items, CatalogSource::Remote, limit, &filters));
            }
            Err(e) => e,
        };
        warn!(asset_type = %asset_type, error = %last_error, "remote catalog unavailable");

        self.emit("fallback", StepStatus::Start, None);
        if let Some(items) = load_cache(&cache_path, asset_type)? {
            self.emit("fallback", StepStatus::Done, Some("cache"));
            return Ok(finalize(items, CatalogSource::CacheFallback, limit, &filters));
        }
        let preset = static_catalog(asset_type);
        if !preset.is_empty() {
            write_cache(&cache_path, &preset)?;
            self.emit("fallback", StepStatus::Done, Some("preset"));
            return Ok(finalize(preset, CatalogSource::StaticFallback, limit, &filters));
        }
        self.emit("fallback", StepStatus::Done, Some("none"));
        Err(CatalogError::Unavailable {
            asset_type,
            last_error: last_error.to_string(),
        })
    }

    async fn fetch_with_retry(
        &self,
        asset_type: AssetType,
    ) -> Result<Vec<SymbolInfo>, CatalogError> {
        self.emit("remote", StepStatus::Start, Some(asset_type.as_str()));
        let attempts = self.config.retries + 1;
        let mut delay = self.config.sleep_sec;
        let mut last_error: Option<CatalogError> = None;
        for attempt in 1..=attempts {
            match self.fetch_remote(asset_type).await {
                Ok(items) if !items.is_empty() => {
                    self.emit("remote", StepStatus::Done, Some(&items.len().to_string()));
                    return Ok(items);
                }
                Ok(_) => {
                    last_error = Some(CatalogError::Http("remote returned no rows".to_string()));
                }
                Err(e) => last_error = Some(e),
            }
            if attempt < attempts {
                let detail = format!("attempt {attempt}/{attempts} failed");
                self.emit("remote", StepStatus::Progress, Some(&detail));
                warn!(asset_type = %asset_type, attempt, "catalog fetch failed, retrying");
                tokio::time::sleep(Duration::from_secs_f64(delay.max(0.0))).await;
                delay *= self.config.retry_backoff;
            }
        }
        self.emit("remote", StepStatus::Done, Some("failed"));
        Err(last_error.unwrap_or_else(|| CatalogError::Http("no attempts made".to_string())))
    }

    async fn fetch_remote(&self, asset_type: AssetType) -> Result<Vec<SymbolInfo>, CatalogError> {
        match asset_type {
            AssetType::Stock => remote::fetch_stock_catalog(&self.client).await,
            AssetType::Ashare => ashare::fetch_ashare_catalog(&self.client, &self.clock).await,
            AssetType::Forex | AssetType::Crypto | AssetType::Commodity => {
                remote::fetch_screener_catalog(&self.client, asset_type).await
            }
        }
    }
}

fn finalize(
    items: Vec<SymbolInfo>,
    source: CatalogSource,
    limit: Option<usize>,
    filters: &CompiledFilters,
) -> CatalogResult {
    let mut filtered = filters.apply(&items);
    let total_count = filtered.len();
    let options = FilterOptions::derive(&filtered);
    if let Some(limit) = limit {
        filtered.truncate(limit);
    }
    CatalogResult {
        items: filtered,
        source,
        total_count,
        options,
    }
}
