//! Built-in preset universes, the last-resort fallback when neither the
//! remote endpoint nor the local cache can produce a catalog.

use datagrab_types::{AssetType, SymbolInfo};

/// Returns the preset universe for an asset class. Empty for classes that
/// have no meaningful preset (stock, ashare).
#[must_use]
pub fn static_catalog(asset_type: AssetType) -> Vec<SymbolInfo> {
    let pairs: &[(&str, &str)] = match asset_type {
        AssetType::Crypto => &[
            ("BTC-USD", "Bitcoin"),
            ("ETH-USD", "Ethereum"),
            ("SOL-USD", "Solana"),
            ("BNB-USD", "BNB"),
        ],
        AssetType::Forex => &[
            ("EURUSD=X", "EUR/USD"),
            ("USDJPY=X", "USD/JPY"),
            ("GBPUSD=X", "GBP/USD"),
            ("AUDUSD=X", "AUD/USD"),
        ],
        AssetType::Commodity => &[
            ("GC=F", "Gold"),
            ("CL=F", "Crude Oil"),
            ("SI=F", "Silver"),
            ("HG=F", "Copper"),
        ],
        AssetType::Stock | AssetType::Ashare => &[],
    };
    pairs
        .iter()
        .map(|(symbol, name)| SymbolInfo::new(*symbol, asset_type).with_name(*name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_exist_for_screener_classes() {
        assert!(!static_catalog(AssetType::Crypto).is_empty());
        assert!(!static_catalog(AssetType::Forex).is_empty());
        assert!(!static_catalog(AssetType::Commodity).is_empty());
        assert!(static_catalog(AssetType::Stock).is_empty());
    }
}
