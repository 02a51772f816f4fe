//! Remote catalog endpoints: NASDAQ symbol directories and the Yahoo
//! predefined screeners.

use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::warn;

use datagrab_types::{AssetType, SymbolInfo};

use crate::CatalogError;

/// NASDAQ-listed symbol directory (pipe-delimited).
pub const NASDAQ_LISTED_URL: &str =
    "https://www.nasdaqtrader.com/dynamic/SymDir/nasdaqlisted.txt";
/// Other-listed (NYSE/AMEX/...) symbol directory (pipe-delimited).
pub const OTHER_LISTED_URL: &str =
    "https://www.nasdaqtrader.com/dynamic/SymDir/otherlisted.txt";
/// Yahoo predefined screener endpoint.
pub const SCREENER_URL: &str =
    "https://query2.finance.yahoo.com/v1/finance/screener/predefined/saved";

/// Screener id for an asset class, when one exists.
#[must_use]
pub(crate) const fn screener_id(asset_type: AssetType) -> Option<&'static str> {
    match asset_type {
        AssetType::Crypto => Some("all_cryptocurrencies_us"),
        AssetType::Forex => Some("most_actives_currencies"),
        AssetType::Commodity => Some("most_actives_futures"),
        AssetType::Stock | AssetType::Ashare => None,
    }
}

/// Probes an endpoint before a bulk download, turning transport failures
/// into a human-readable diagnostic that tells a TLS/timeout stall apart
/// from a plain connection failure.
pub(crate) async fn preflight(client: &reqwest::Client, url: &str) -> Result<(), CatalogError> {
    let result = client.head(url).send().await;
    let err = match result {
        Ok(_) => return Ok(()),
        Err(e) => e,
    };
    let detail = if err.is_timeout() {
        format!("TLS handshake or response timed out ({err}); the endpoint may be blocked or rate-limiting this network")
    } else if err.is_connect() {
        format!("connection failed ({err}); check DNS, proxy and firewall settings")
    } else {
        err.to_string()
    };
    Err(CatalogError::Preflight {
        url: url.to_string(),
        detail,
    })
}

/// Downloads and merges the two US equity symbol directories. Later files
/// lose on duplicate symbols; the result is shuffled to spread download
/// order across the alphabet.
pub(crate) async fn fetch_stock_catalog(
    client: &reqwest::Client,
) -> Result<Vec<SymbolInfo>, CatalogError> {
    preflight(client, NASDAQ_LISTED_URL).await?;

    let mut items: Vec<SymbolInfo> = Vec::new();
    for (url, symbol_key) in [
        (NASDAQ_LISTED_URL, "Symbol"),
        (OTHER_LISTED_URL, "ACT Symbol"),
    ] {
        let text = client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| CatalogError::Http(e.to_string()))?
            .text()
            .await
            .map_err(|e| CatalogError::Http(e.to_string()))?;
        items.extend(parse_pipe_catalog(&text, symbol_key));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut result: Vec<SymbolInfo> = Vec::new();
    for item in items {
        if seen.insert(item.symbol.clone()) {
            result.push(item);
        }
    }
    result.shuffle(&mut rand::thread_rng());
    Ok(result)
}

/// Parses one pipe-delimited symbol directory. Unparsable rows are skipped
/// individually.
pub(crate) fn parse_pipe_catalog(text: &str, symbol_key: &str) -> Vec<SymbolInfo> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            warn!(error = %e, "symbol directory has no parsable header");
            return Vec::new();
        }
    };
    let col = |name: &str| headers.iter().position(|h| h == name);
    let symbol_idx = col(symbol_key);
    let name_idx = col("Security Name").or_else(|| col("SecurityName"));
    let market_idx = col("Market Category");
    let exchange_idx = col("Exchange");
    let etf_idx = col("ETF");

    let mut items = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "symbol directory row skipped");
                continue;
            }
        };
        let get = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();
        let symbol = get(symbol_idx).to_string();
        if symbol.is_empty() || symbol.to_uppercase().starts_with("FILE CREATION") {
            continue;
        }
        let market_category = Some(get(market_idx))
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let exchange = Some(get(exchange_idx))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            // The NASDAQ-listed file has no Exchange column; the market
            // category implies the venue.
            .or_else(|| market_category.as_ref().map(|_| "NASDAQ".to_string()));
        let is_etf = match get(etf_idx).to_uppercase().as_str() {
            "Y" => Some(true),
            "" => None,
            _ => Some(false),
        };
        items.push(SymbolInfo {
            symbol,
            name: Some(get(name_idx))
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            exchange,
            asset_type: AssetType::Stock,
            market_category,
            is_etf,
            is_fund: None,
            fund_category: None,
        });
    }
    items
}

#[derive(Debug, Deserialize)]
struct ScreenerEnvelope {
    finance: ScreenerFinance,
}

#[derive(Debug, Deserialize)]
struct ScreenerFinance {
    #[serde(default)]
    result: Vec<ScreenerResult>,
}

#[derive(Debug, Deserialize)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Debug, Deserialize)]
struct ScreenerQuote {
    symbol: Option<String>,
    #[serde(rename = "shortName")]
    short_name: Option<String>,
    #[serde(rename = "longName")]
    long_name: Option<String>,
    exchange: Option<String>,
    #[serde(rename = "quoteType")]
    quote_type: Option<String>,
}

/// Fetches the predefined screener for an asset class. Classes without a
/// screener return an empty list, which the service treats as a miss.
pub(crate) async fn fetch_screener_catalog(
    client: &reqwest::Client,
    asset_type: AssetType,
) -> Result<Vec<SymbolInfo>, CatalogError> {
    let Some(scr_id) = screener_id(asset_type) else {
        return Ok(Vec::new());
    };
    let envelope: ScreenerEnvelope = client
        .get(SCREENER_URL)
        .query(&[("scrIds", scr_id), ("count", "250")])
        .send()
        .await
        .map_err(|e| CatalogError::Http(e.to_string()))?
        .error_for_status()
        .map_err(|e| CatalogError::Http(e.to_string()))?
        .json()
        .await
        .map_err(|e| CatalogError::Parse(e.to_string()))?;

    let quotes = envelope
        .finance
        .result
        .into_iter()
        .flat_map(|r| r.quotes)
        .filter_map(|q| {
            let symbol = q.symbol?.trim().to_string();
            if symbol.is_empty() {
                return None;
            }
            Some(SymbolInfo {
                symbol,
                name: q.short_name.or(q.long_name).filter(|n| !n.is_empty()),
                exchange: q.exchange.filter(|e| !e.is_empty()),
                asset_type,
                market_category: None,
                is_etf: q.quote_type.as_deref().map(|t| t.eq_ignore_ascii_case("ETF")),
                is_fund: None,
                fund_category: None,
            })
        })
        .collect();
    Ok(quotes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NASDAQ_SAMPLE: &str = "\
Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares
AAPL|Apple Inc. - Common Stock|Q|N|N|100|N|N
QQQ|Invesco QQQ Trust|G|N|N|100|Y|N
File Creation Time: 0102202422:01|||||||";

    const OTHER_SAMPLE: &str = "\
ACT Symbol|Security Name|Exchange|CIK|ETF|Round Lot Size|Test Issue|NASDAQ Symbol
SPY|SPDR S&P 500 ETF Trust|P|0000884394|Y|100|N|SPY
File Creation Time: 0102202422:01|||||||";

    #[test]
    fn test_parse_nasdaq_listed() {
        let items = parse_pipe_catalog(NASDAQ_SAMPLE, "Symbol");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].symbol, "AAPL");
        assert_eq!(items[0].exchange.as_deref(), Some("NASDAQ"));
        assert_eq!(items[0].market_category.as_deref(), Some("Q"));
        assert_eq!(items[0].is_etf, Some(false));
        assert_eq!(items[1].is_etf, Some(true));
    }

    #[test]
    fn test_parse_other_listed() {
        let items = parse_pipe_catalog(OTHER_SAMPLE, "ACT Symbol");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, "SPY");
        assert_eq!(items[0].exchange.as_deref(), Some("P"));
        assert_eq!(items[0].is_etf, Some(true));
    }

    #[test]
    fn test_screener_payload_parses() {
        let payload = r#"{
            "finance": {
                "result": [
                    {"quotes": [
                        {"symbol": "BTC-USD", "shortName": "Bitcoin USD", "exchange": "CCC", "quoteType": "CRYPTOCURRENCY"},
                        {"symbol": "", "shortName": "ignored"}
                    ]}
                ],
                "error": null
            }
        }"#;
        let envelope: ScreenerEnvelope = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.finance.result[0].quotes.len(), 2);
        assert_eq!(
            envelope.finance.result[0].quotes[0].symbol.as_deref(),
            Some("BTC-USD")
        );
    }
}
