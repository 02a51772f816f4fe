//! Alias normalization and A-share classification.
//!
//! Filters accept both raw codes (`SSE`, `STAR`, `ETF`) and the display
//! aliases users actually type (`上交所`, `科创板`, `ETF联接`); both sides
//! are normalized to codes before comparison, and the alias is also matched
//! directly so either spelling works.

use datagrab_types::SymbolInfo;

const EXCHANGE_ALIAS_TO_CODE: &[(&str, &str)] = &[
    ("上交所", "SSE"),
    ("上海证券交易所", "SSE"),
    ("深交所", "SZSE"),
    ("深圳证券交易所", "SZSE"),
    ("北交所", "BSE"),
    ("北京证券交易所", "BSE"),
    ("纳斯达克", "NASDAQ"),
    ("纽交所", "NYSE"),
];

const EXCHANGE_CODE_TO_ALIAS: &[(&str, &str)] = &[
    ("SSE", "上交所"),
    ("SZSE", "深交所"),
    ("BSE", "北交所"),
    ("NASDAQ", "纳斯达克"),
    ("NYSE", "纽交所"),
];

const MARKET_ALIAS_TO_CODE: &[(&str, &str)] = &[
    ("主板", "MAIN"),
    ("科创板", "STAR"),
    ("创业板", "CHINEXT"),
    ("北交所", "BSE"),
    ("b股", "B"),
    ("b股市场", "B"),
    ("纳斯达克全球精选", "Q"),
    ("全球精选", "Q"),
    ("纳斯达克全球市场", "G"),
    ("全球市场", "G"),
    ("纳斯达克资本市场", "S"),
    ("资本市场", "S"),
];

const MARKET_CODE_TO_ALIAS: &[(&str, &str)] = &[
    ("MAIN", "主板"),
    ("STAR", "科创板"),
    ("CHINEXT", "创业板"),
    ("BSE", "北交所"),
    ("B", "B股"),
    ("Q", "纳斯达克全球精选"),
    ("G", "纳斯达克全球市场"),
    ("S", "纳斯达克资本市场"),
];

const FUND_CATEGORY_ALIAS_TO_CODE: &[(&str, &str)] = &[
    ("ETF", "ETF"),
    ("LOF", "LOF"),
    ("REIT", "REIT"),
    ("REITS", "REIT"),
    ("QDII", "QDII"),
    ("货币", "MONEY"),
    ("货币基金", "MONEY"),
    ("债券", "BOND"),
    ("债券基金", "BOND"),
    ("联接", "ETF_LINK"),
    ("联结", "ETF_LINK"),
    ("ETF联接", "ETF_LINK"),
    ("ETF联结", "ETF_LINK"),
    ("分级", "GRADED"),
    ("基金", "FUND"),
];

const FUND_CATEGORY_CODE_TO_ALIAS: &[(&str, &str)] = &[
    ("ETF", "ETF"),
    ("LOF", "LOF"),
    ("REIT", "REITs"),
    ("QDII", "QDII"),
    ("MONEY", "货币基金"),
    ("BOND", "债券基金"),
    ("ETF_LINK", "ETF联接"),
    ("GRADED", "分级基金"),
    ("FUND", "基金"),
];

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Normalizes an exchange value to its code (`上交所` -> `SSE`).
#[must_use]
pub fn normalize_exchange_value(value: &str) -> String {
    let raw = value.trim();
    if raw.is_empty() {
        return String::new();
    }
    lookup(EXCHANGE_ALIAS_TO_CODE, raw).map_or_else(|| raw.to_uppercase(), str::to_string)
}

/// Normalizes a market category value to its code (`科创板` -> `STAR`).
#[must_use]
pub fn normalize_market_value(value: &str) -> String {
    let raw = value.trim();
    if raw.is_empty() {
        return String::new();
    }
    let key = raw.to_lowercase();
    lookup(MARKET_ALIAS_TO_CODE, key.as_str()).map_or_else(|| raw.to_uppercase(), str::to_string)
}

/// Normalizes a fund category to its code (`ETF联接` -> `ETF_LINK`).
#[must_use]
pub fn normalize_fund_category(value: &str) -> String {
    let raw = value.trim();
    if raw.is_empty() {
        return String::new();
    }
    if let Some(code) = lookup(FUND_CATEGORY_ALIAS_TO_CODE, raw) {
        return code.to_string();
    }
    let upper = raw.to_uppercase();
    lookup(FUND_CATEGORY_ALIAS_TO_CODE, upper.as_str())
        .map_or_else(|| upper.clone(), str::to_string)
}

/// Returns the display alias for an exchange code, if one exists.
#[must_use]
pub fn exchange_alias(value: Option<&str>) -> Option<&'static str> {
    lookup(EXCHANGE_CODE_TO_ALIAS, value?.to_uppercase().as_str())
}

/// Returns the display alias for a market category code, if one exists.
#[must_use]
pub fn market_alias(value: Option<&str>) -> Option<&'static str> {
    lookup(MARKET_CODE_TO_ALIAS, value?.to_uppercase().as_str())
}

/// Returns the display alias for a fund category code, if one exists.
#[must_use]
pub fn fund_category_alias(value: Option<&str>) -> Option<&'static str> {
    lookup(FUND_CATEGORY_CODE_TO_ALIAS, value?.to_uppercase().as_str())
}

/// Derives `(exchange, market)` codes from an A-share code such as
/// `sh.688001` or `sz.300123`.
#[must_use]
pub fn classify_ashare_code(code: &str) -> (Option<&'static str>, Option<&'static str>) {
    let code = code.trim().to_lowercase();
    let (prefix, num) = code.split_once('.').unwrap_or(("", code.as_str()));
    match prefix {
        "sh" => {
            let market = if num.starts_with("688") {
                "STAR"
            } else if num.starts_with("900") {
                "B"
            } else {
                "MAIN"
            };
            (Some("SSE"), Some(market))
        }
        "sz" => {
            let market = if num.starts_with("300") {
                "CHINEXT"
            } else if num.starts_with("200") {
                "B"
            } else {
                "MAIN"
            };
            (Some("SZSE"), Some(market))
        }
        "bj" => (Some("BSE"), Some("BSE")),
        _ => (None, None),
    }
}

/// Derives `(is_etf, is_fund, fund_category)` for an A-share security from
/// its code, display name and optional provider type token.
#[must_use]
pub fn classify_ashare_security(
    code: &str,
    name: Option<&str>,
    type_value: Option<&str>,
) -> (Option<bool>, Option<bool>, Option<&'static str>) {
    let mut is_etf: Option<bool> = None;
    let mut is_fund: Option<bool> = None;
    let mut fund_category: Option<&'static str> = None;

    let type_str = type_value.unwrap_or("").trim().to_lowercase();
    match type_str.as_str() {
        "etf" | "6" => fund_category = Some("ETF"),
        "fund" | "基金" | "5" => fund_category = Some("FUND"),
        "stock" | "1" | "index" | "2" | "industry" | "3" => {
            is_fund = Some(false);
            is_etf = Some(false);
        }
        _ => {}
    }

    let name_value = name.unwrap_or("");
    let name_upper = name_value.to_uppercase();
    if name_upper.contains("REIT") {
        fund_category = Some("REIT");
    }
    if name_upper.contains("LOF") {
        fund_category = Some("LOF");
    }
    if name_upper.contains("ETF") && name_value.contains("联接") {
        fund_category = Some("ETF_LINK");
    }
    if name_upper.contains("ETF") && fund_category.is_none() {
        fund_category = Some("ETF");
    }
    if name_upper.contains("QDII") && fund_category.is_none() {
        fund_category = Some("QDII");
    }
    if name_value.contains("货币") && fund_category.is_none() {
        fund_category = Some("MONEY");
    }
    if (name_value.contains("债券") || name_value.contains('债')) && fund_category.is_none() {
        fund_category = Some("BOND");
    }
    if ["基金", "LOF", "联接", "分级", "REIT", "REITs"]
        .iter()
        .any(|k| name_value.contains(k))
        && fund_category.is_none()
    {
        fund_category = Some("FUND");
    }

    let code_lower = code.trim().to_lowercase();
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| code_lower.starts_with(p));
    if starts(&["sh.508", "sz.180"]) {
        fund_category = fund_category.or(Some("REIT"));
    }
    if starts(&["sz.16", "sh.501", "sh.502", "sh.506"]) {
        fund_category = fund_category.or(Some("LOF"));
    }
    if starts(&[
        "sh.50", "sh.51", "sh.56", "sh.58", "sh.510", "sh.588", "sz.15", "sz.159", "sz.18",
    ]) {
        fund_category = fund_category.or(Some("ETF"));
    }

    if let Some(category) = fund_category {
        is_fund = Some(true);
        is_etf = Some(category == "ETF");
    }
    (is_etf, is_fund, fund_category)
}

/// Code prefixes that mark an A-share listed ETF.
pub(crate) const ASHARE_ETF_PREFIXES: &[&str] = &["sh.51", "sh.588", "sz.159"];

/// Returns true when an A-share code carries an ETF prefix.
#[must_use]
pub(crate) fn is_ashare_etf_code(code: &str) -> bool {
    let code = code.trim().to_lowercase();
    ASHARE_ETF_PREFIXES.iter().any(|p| code.starts_with(p))
}

/// Populates classification fields of an A-share instrument in place.
pub(crate) fn classify_into(info: &mut SymbolInfo, type_value: Option<&str>) {
    let (exchange, market) = classify_ashare_code(&info.symbol);
    let (is_etf, is_fund, fund_category) =
        classify_ashare_security(&info.symbol, info.name.as_deref(), type_value);
    info.exchange = exchange.map(str::to_string);
    info.market_category = market.map(str::to_string);
    info.is_etf = is_etf;
    info.is_fund = is_fund;
    info.fund_category = fund_category.map(str::to_string);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ashare_code() {
        assert_eq!(classify_ashare_code("sh.688001"), (Some("SSE"), Some("STAR")));
        assert_eq!(classify_ashare_code("sz.300123"), (Some("SZSE"), Some("CHINEXT")));
        assert_eq!(classify_ashare_code("sz.000001"), (Some("SZSE"), Some("MAIN")));
        assert_eq!(classify_ashare_code("bj.830001"), (Some("BSE"), Some("BSE")));
        assert_eq!(classify_ashare_code("600000"), (None, None));
    }

    #[test]
    fn test_etf_detection() {
        let (is_etf, is_fund, category) =
            classify_ashare_security("sh.510300", Some("沪深300ETF"), None);
        assert_eq!(is_etf, Some(true));
        assert_eq!(is_fund, Some(true));
        assert_eq!(category, Some("ETF"));
    }

    #[test]
    fn test_fund_subtypes() {
        let (_, is_fund, category) = classify_ashare_security("sh.508001", Some("REIT样例"), None);
        assert_eq!(is_fund, Some(true));
        assert_eq!(category, Some("REIT"));

        let (_, is_fund, category) = classify_ashare_security("sz.160001", Some("LOF样例"), None);
        assert_eq!(is_fund, Some(true));
        assert_eq!(category, Some("LOF"));

        let (is_etf, is_fund, category) =
            classify_ashare_security("sh.510300", Some("ETF联接A"), None);
        assert_eq!(is_etf, Some(false));
        assert_eq!(is_fund, Some(true));
        assert_eq!(category, Some("ETF_LINK"));
    }

    #[test]
    fn test_type_token_overrides() {
        let (is_etf, is_fund, _) = classify_ashare_security("sh.600000", Some("浦发银行"), Some("1"));
        assert_eq!(is_etf, Some(false));
        assert_eq!(is_fund, Some(false));
    }

    #[test]
    fn test_alias_normalization() {
        assert_eq!(normalize_exchange_value("上交所"), "SSE");
        assert_eq!(normalize_exchange_value("nyse"), "NYSE");
        assert_eq!(normalize_market_value("科创板"), "STAR");
        assert_eq!(normalize_fund_category("ETF联接"), "ETF_LINK");
        assert_eq!(normalize_fund_category("reits"), "REIT");
        assert_eq!(exchange_alias(Some("SSE")), Some("上交所"));
        assert_eq!(market_alias(Some("star")), Some("科创板"));
        assert_eq!(fund_category_alias(Some("MONEY")), Some("货币基金"));
    }

    #[test]
    fn test_etf_prefix_rule() {
        assert!(is_ashare_etf_code("sh.510300"));
        assert!(is_ashare_etf_code("sh.588000"));
        assert!(is_ashare_etf_code("sz.159915"));
        assert!(!is_ashare_etf_code("sh.600000"));
    }
}
