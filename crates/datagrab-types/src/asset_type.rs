//! Top-level asset classification.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::AssetTypeParseError;

/// Top-level instrument class.
///
/// The asset type selects the catalog path and the data source used for a
/// download, and forms the first path component of the on-disk store
/// (`data_root/<asset_type>/<symbol>/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// US equities.
    Stock,
    /// Mainland-China listed equities.
    Ashare,
    /// Foreign exchange pairs.
    Forex,
    /// Cryptocurrencies.
    Crypto,
    /// Commodity futures.
    Commodity,
}

impl AssetType {
    /// Returns the asset type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Ashare => "ashare",
            Self::Forex => "forex",
            Self::Crypto => "crypto",
            Self::Commodity => "commodity",
        }
    }

    /// Returns all supported asset types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Stock,
            Self::Ashare,
            Self::Forex,
            Self::Crypto,
            Self::Commodity,
        ]
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = AssetTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "ashare" => Ok(Self::Ashare),
            "forex" => Ok(Self::Forex),
            "crypto" => Ok(Self::Crypto),
            "commodity" => Ok(Self::Commodity),
            _ => Err(AssetTypeParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_type_parse() {
        assert_eq!("stock".parse::<AssetType>().unwrap(), AssetType::Stock);
        assert_eq!("  ASHARE ".parse::<AssetType>().unwrap(), AssetType::Ashare);
        assert!("bond".parse::<AssetType>().is_err());
    }

    #[test]
    fn test_asset_type_roundtrip() {
        for at in AssetType::all() {
            assert_eq!(at.as_str().parse::<AssetType>().unwrap(), *at);
        }
    }
}
