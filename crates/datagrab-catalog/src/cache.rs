//! CSV symbol cache under `<data_root>/catalog/`.

use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use datagrab_store::fs::atomic_write_bytes;
use datagrab_types::{AssetType, SymbolInfo};

use crate::CatalogError;

const HEADER: [&str; 8] = [
    "symbol",
    "name",
    "exchange",
    "asset_type",
    "market_category",
    "is_etf",
    "is_fund",
    "fund_category",
];

fn encode_tristate(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "Y",
        Some(false) => "N",
        None => "",
    }
}

fn decode_tristate(value: &str) -> Option<bool> {
    match value.trim().to_uppercase().as_str() {
        "Y" => Some(true),
        "N" => Some(false),
        _ => None,
    }
}

fn opt(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Loads a cached catalog. `Ok(None)` when the file does not exist;
/// individual unparsable rows are skipped with a warning.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read.
pub(crate) fn load_cache(
    path: &Path,
    default_asset_type: AssetType,
) -> Result<Option<Vec<SymbolInfo>>, CatalogError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| CatalogError::CacheRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let headers = reader
        .headers()
        .map_err(|e| CatalogError::CacheRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .clone();
    let field = |record: &csv::StringRecord, name: &str| -> String {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .to_string()
    };

    let mut items = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache row skipped");
                continue;
            }
        };
        let symbol = field(&record, "symbol").trim().to_string();
        if symbol.is_empty() {
            continue;
        }
        let asset_type = AssetType::from_str(&field(&record, "asset_type"))
            .unwrap_or(default_asset_type);
        items.push(SymbolInfo {
            symbol,
            name: opt(&field(&record, "name")),
            exchange: opt(&field(&record, "exchange")),
            asset_type,
            market_category: opt(&field(&record, "market_category")),
            is_etf: decode_tristate(&field(&record, "is_etf")),
            is_fund: decode_tristate(&field(&record, "is_fund")),
            fund_category: opt(&field(&record, "fund_category")),
        });
    }
    Ok(Some(items))
}

/// Rewrites the cache atomically (`.tmp` then rename).
///
/// # Errors
///
/// Returns an error when serialization or the atomic write fails; cache
/// write failures are fatal for the caller.
pub(crate) fn write_cache(path: &Path, items: &[SymbolInfo]) -> Result<(), CatalogError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(HEADER)
        .map_err(|e| CatalogError::Parse(e.to_string()))?;
    for item in items {
        writer
            .write_record([
                item.symbol.as_str(),
                item.name.as_deref().unwrap_or(""),
                item.exchange.as_deref().unwrap_or(""),
                item.asset_type.as_str(),
                item.market_category.as_deref().unwrap_or(""),
                encode_tristate(item.is_etf),
                encode_tristate(item.is_fund),
                item.fund_category.as_deref().unwrap_or(""),
            ])
            .map_err(|e| CatalogError::Parse(e.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CatalogError::Parse(e.to_string()))?;
    atomic_write_bytes(path, &bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog").join("stock_symbols.csv");
        let items = vec![
            SymbolInfo {
                symbol: "AAPL".into(),
                name: Some("Apple, Inc.".into()),
                exchange: Some("NASDAQ".into()),
                asset_type: AssetType::Stock,
                market_category: Some("Q".into()),
                is_etf: Some(false),
                is_fund: None,
                fund_category: None,
            },
            SymbolInfo::new("SPY", AssetType::Stock),
        ];
        write_cache(&path, &items).unwrap();

        let loaded = load_cache(&path, AssetType::Stock).unwrap().unwrap();
        assert_eq!(loaded, items);
    }

    #[test]
    fn test_missing_cache_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog").join("forex_symbols.csv");
        assert!(load_cache(&path, AssetType::Forex).unwrap().is_none());
    }

    #[test]
    fn test_rows_without_symbol_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stock_symbols.csv");
        std::fs::write(
            &path,
            "symbol,name,exchange,asset_type,market_category,is_etf,is_fund,fund_category\n\
             ,noname,,stock,,,,\n\
             MSFT,Microsoft,NASDAQ,stock,Q,N,N,\n",
        )
        .unwrap();
        let loaded = load_cache(&path, AssetType::Stock).unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "MSFT");
        assert_eq!(loaded[0].is_etf, Some(false));
    }
}
