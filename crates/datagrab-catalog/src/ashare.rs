//! A-share universe fetch.
//!
//! Primary path: one securities-list query for listed stocks, supplemented
//! with ETFs taken from the fund board list and kept only when their code
//! carries a deterministic ETF prefix (`sh.51*`, `sh.588*`, `sz.159*`).
//! Secondary fallback: the dated all-stocks query, scanning up to 7 recent
//! session dates until one returns rows.

use chrono::Duration;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use datagrab_types::{AssetType, Clock, SymbolInfo};

use crate::alias::{classify_into, is_ashare_etf_code};
use crate::CatalogError;

/// Securities list endpoint (quote-center clist gateway).
pub const ASHARE_LIST_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";

/// Board filter selecting SH/SZ/BJ listed equities.
const STOCK_BOARDS: &str = "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23,m:0+t:81+s:2048";
/// Board filter selecting listed ETFs.
const ETF_BOARDS: &str = "b:MK0021,b:MK0022,b:MK0023,b:MK0024";
/// Number of recent session dates probed by the fallback query.
const FALLBACK_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    diff: Diff,
}

/// The gateway serves `diff` as a list or as an index-keyed map depending
/// on the query variant.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Diff {
    List(Vec<ListEntry>),
    Map(HashMap<String, ListEntry>),
}

impl Default for Diff {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl Diff {
    fn into_entries(self) -> Vec<ListEntry> {
        match self {
            Self::List(entries) => entries,
            Self::Map(map) => {
                let mut entries: Vec<(String, ListEntry)> = map.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries.into_iter().map(|(_, e)| e).collect()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    /// Security code without venue prefix.
    f12: Option<String>,
    /// Venue marker: 1 for Shanghai, 0 for Shenzhen/Beijing.
    f13: Option<i64>,
    /// Display name.
    f14: Option<String>,
}

impl ListEntry {
    /// Builds the venue-prefixed code used throughout the store
    /// (`sh.600000`, `sz.000001`, `bj.830001`).
    fn prefixed_code(&self) -> Option<String> {
        let num = self.f12.as_deref()?.trim();
        if num.is_empty() {
            return None;
        }
        let venue = match self.f13 {
            Some(1) => "sh",
            _ if num.starts_with('4') || num.starts_with('8') => "bj",
            _ => "sz",
        };
        Some(format!("{venue}.{num}"))
    }
}

async fn fetch_list(
    client: &reqwest::Client,
    boards: &str,
    trade_date: Option<&str>,
) -> Result<Vec<ListEntry>, CatalogError> {
    let mut query: Vec<(&str, String)> = vec![
        ("pn", "1".to_string()),
        ("pz", "10000".to_string()),
        ("po", "0".to_string()),
        ("fields", "f12,f13,f14".to_string()),
        ("fs", boards.to_string()),
    ];
    if let Some(day) = trade_date {
        query.push(("trade_date", day.to_string()));
    }
    let envelope: ListEnvelope = client
        .get(ASHARE_LIST_URL)
        .query(&query)
        .send()
        .await
        .map_err(|e| CatalogError::Http(e.to_string()))?
        .error_for_status()
        .map_err(|e| CatalogError::Http(e.to_string()))?
        .json()
        .await
        .map_err(|e| CatalogError::Parse(e.to_string()))?;
    Ok(envelope.data.map(|d| d.diff.into_entries()).unwrap_or_default())
}

fn entries_to_symbols(entries: Vec<ListEntry>, type_hint: Option<&str>) -> Vec<SymbolInfo> {
    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(code) = entry.prefixed_code() else {
            continue;
        };
        let mut info = SymbolInfo::new(code, AssetType::Ashare);
        info.name = entry.f14.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        classify_into(&mut info, type_hint);
        items.push(info);
    }
    items
}

/// Fetches the A-share universe: listed stocks plus the prefix-filtered
/// ETF supplement, with the dated all-stocks fallback when the primary
/// list comes back empty.
pub(crate) async fn fetch_ashare_catalog(
    client: &reqwest::Client,
    clock: &Clock,
) -> Result<Vec<SymbolInfo>, CatalogError> {
    let mut items = entries_to_symbols(fetch_list(client, STOCK_BOARDS, None).await?, None);

    if items.is_empty() {
        // The list gateway occasionally serves an empty page right after a
        // session roll; re-query pinned to recent session dates.
        let today = clock.now().date_naive();
        for back in 0..FALLBACK_DAYS {
            let day = (today - Duration::days(back)).format("%Y-%m-%d").to_string();
            match fetch_list(client, STOCK_BOARDS, Some(&day)).await {
                Ok(entries) if !entries.is_empty() => {
                    debug!(day, count = entries.len(), "all-stocks fallback hit");
                    items = entries_to_symbols(entries, None);
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(day, error = %e, "all-stocks fallback query failed"),
            }
        }
    }
    if items.is_empty() {
        return Err(CatalogError::Http(
            "securities list empty for all probed session dates".to_string(),
        ));
    }

    match fetch_list(client, ETF_BOARDS, None).await {
        Ok(entries) => {
            let etfs: Vec<SymbolInfo> = entries_to_symbols(entries, Some("etf"))
                .into_iter()
                .filter(|info| is_ashare_etf_code(&info.symbol))
                .collect();
            let known: std::collections::HashSet<String> =
                items.iter().map(|i| i.symbol.clone()).collect();
            items.extend(etfs.into_iter().filter(|e| !known.contains(&e.symbol)));
        }
        Err(e) => warn!(error = %e, "ETF supplement unavailable"),
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_as_list_and_map() {
        let list: ListEnvelope = serde_json::from_str(
            r#"{"data": {"diff": [{"f12": "600000", "f13": 1, "f14": "浦发银行"}]}}"#,
        )
        .unwrap();
        let entries = list.data.unwrap().diff.into_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prefixed_code().as_deref(), Some("sh.600000"));

        let map: ListEnvelope = serde_json::from_str(
            r#"{"data": {"diff": {"0": {"f12": "000001", "f13": 0, "f14": "平安银行"}}}}"#,
        )
        .unwrap();
        let entries = map.data.unwrap().diff.into_entries();
        assert_eq!(entries[0].prefixed_code().as_deref(), Some("sz.000001"));
    }

    #[test]
    fn test_prefixed_code_venues() {
        let sh = ListEntry {
            f12: Some("688001".into()),
            f13: Some(1),
            f14: None,
        };
        assert_eq!(sh.prefixed_code().as_deref(), Some("sh.688001"));

        let bj = ListEntry {
            f12: Some("830001".into()),
            f13: Some(0),
            f14: None,
        };
        assert_eq!(bj.prefixed_code().as_deref(), Some("bj.830001"));

        let sz = ListEntry {
            f12: Some("000001".into()),
            f13: Some(0),
            f14: None,
        };
        assert_eq!(sz.prefixed_code().as_deref(), Some("sz.000001"));

        let empty = ListEntry {
            f12: Some("  ".into()),
            f13: Some(0),
            f14: None,
        };
        assert_eq!(empty.prefixed_code(), None);
    }

    #[test]
    fn test_entries_to_symbols_classifies() {
        let entries = vec![
            ListEntry {
                f12: Some("510300".into()),
                f13: Some(1),
                f14: Some("沪深300ETF".into()),
            },
            ListEntry {
                f12: Some("600000".into()),
                f13: Some(1),
                f14: Some("浦发银行".into()),
            },
        ];
        let items = entries_to_symbols(entries, None);
        assert_eq!(items[0].is_etf, Some(true));
        assert_eq!(items[0].exchange.as_deref(), Some("SSE"));
        assert_eq!(items[1].market_category.as_deref(), Some("MAIN"));
    }
}
