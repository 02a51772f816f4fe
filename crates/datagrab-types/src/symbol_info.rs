//! Instrument metadata.

use serde::{Deserialize, Serialize};

use crate::AssetType;

/// Metadata for one downloadable instrument.
///
/// Identity is `(asset_type, symbol)`; instances are immutable value
/// objects. `is_etf` / `is_fund` are tri-state: `Some(true)`, `Some(false)`
/// or `None` when the provider does not say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Provider-native symbol token (e.g. `AAPL`, `sh.600000`, `BTC-USD`).
    pub symbol: String,
    /// Human-readable name, when the provider supplies one.
    pub name: Option<String>,
    /// Listing exchange code (e.g. `NASDAQ`, `SSE`).
    pub exchange: Option<String>,
    /// Top-level asset class.
    pub asset_type: AssetType,
    /// Market segment code (e.g. `Q`, `STAR`, `CHINEXT`).
    pub market_category: Option<String>,
    /// Whether the instrument is an ETF, when known.
    pub is_etf: Option<bool>,
    /// Whether the instrument is a fund of any kind, when known.
    pub is_fund: Option<bool>,
    /// Fund sub-classification code (e.g. `ETF`, `LOF`, `REIT`).
    pub fund_category: Option<String>,
}

impl SymbolInfo {
    /// Creates a bare instrument with just a symbol and asset type.
    #[must_use]
    pub fn new(symbol: impl Into<String>, asset_type: AssetType) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            exchange: None,
            asset_type,
            market_category: None,
            is_etf: None,
            is_fund: None,
            fund_category: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the listing exchange.
    #[must_use]
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }
}

impl std::fmt::Display for SymbolInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", self.symbol, name),
            None => write!(f, "{}", self.symbol),
        }
    }
}
