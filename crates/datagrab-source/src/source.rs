//! The uniform fetch contract providers implement.

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use datagrab_catalog::FilterConfig;
use datagrab_store::OhlcvFrame;
use datagrab_types::{Adjust, AssetType, Interval, SymbolInfo};

use crate::SourceError;

/// A canonical frame plus the adjustment mode actually applied.
#[derive(Debug)]
pub struct OhlcvResult {
    /// Normalized rows; empty when the provider had no data.
    pub frame: OhlcvFrame,
    /// The adjustment the provider applied.
    pub adjustment: Adjust,
}

impl OhlcvResult {
    /// An empty result for "no data" conditions.
    #[must_use]
    pub fn empty(adjustment: Adjust) -> Self {
        Self {
            frame: OhlcvFrame::empty(),
            adjustment,
        }
    }
}

/// Uniform contract over heterogeneous upstream providers.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Lists the filtered instrument universe for an asset class.
    async fn list_symbols(
        &self,
        asset_type: AssetType,
        refresh: bool,
        limit: Option<usize>,
        filters_override: Option<&FilterConfig>,
    ) -> Result<Vec<SymbolInfo>, SourceError>;

    /// Fetches a canonical OHLCV frame for one symbol over a closed range.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        adjust: Adjust,
    ) -> Result<OhlcvResult, SourceError>;
}
