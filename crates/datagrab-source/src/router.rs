//! Per-asset-type routing between providers.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use datagrab_catalog::FilterConfig;
use datagrab_types::{Adjust, AssetType, Interval, SymbolInfo};

use crate::{DataSource, OhlcvResult, SourceError};

/// Routes fetches to a per-asset overlay source, falling back to the
/// default. The active asset type is recorded once per run via
/// [`SourceRouter::set_asset_type`].
pub struct SourceRouter {
    default_source: Arc<dyn DataSource>,
    overlay: HashMap<AssetType, Arc<dyn DataSource>>,
    current: RwLock<Option<AssetType>>,
}

impl SourceRouter {
    /// Creates a router with a default source and per-asset overrides.
    #[must_use]
    pub fn new(
        default_source: Arc<dyn DataSource>,
        overlay: HashMap<AssetType, Arc<dyn DataSource>>,
    ) -> Self {
        Self {
            default_source,
            overlay,
            current: RwLock::new(None),
        }
    }

    /// Records the asset type subsequent fetches are for. Unknown types
    /// are impossible by construction (`AssetType` parsing rejects them).
    pub fn set_asset_type(&self, asset_type: AssetType) {
        *self.current.write().expect("router lock poisoned") = Some(asset_type);
    }

    fn select(&self, asset_type: Option<AssetType>) -> Arc<dyn DataSource> {
        asset_type
            .and_then(|at| self.overlay.get(&at).cloned())
            .unwrap_or_else(|| Arc::clone(&self.default_source))
    }
}

#[async_trait]
impl DataSource for SourceRouter {
    async fn list_symbols(
        &self,
        asset_type: AssetType,
        refresh: bool,
        limit: Option<usize>,
        filters_override: Option<&FilterConfig>,
    ) -> Result<Vec<SymbolInfo>, SourceError> {
        self.select(Some(asset_type))
            .list_symbols(asset_type, refresh, limit, filters_override)
            .await
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        adjust: Adjust,
    ) -> Result<OhlcvResult, SourceError> {
        let current = *self.current.read().expect("router lock poisoned");
        self.select(current)
            .fetch_ohlcv(symbol, interval, start, end, adjust)
            .await
    }
}
