//! Filter configuration and the short-circuit filter engine.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use datagrab_types::SymbolInfo;

use crate::alias::{
    exchange_alias, fund_category_alias, market_alias, normalize_exchange_value,
    normalize_fund_category, normalize_market_value,
};

/// Predicate bundle applied to a catalog.
///
/// Unknown keys are rejected to catch config typos; every other config
/// section ignores extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Case-insensitive regexes a symbol must match (any).
    pub include_regex: Vec<String>,
    /// Case-insensitive regexes that reject a symbol (any).
    pub exclude_regex: Vec<String>,
    /// Symbol prefixes to keep (any).
    pub include_prefixes: Vec<String>,
    /// Symbol prefixes to drop (any).
    pub exclude_prefixes: Vec<String>,
    /// Explicit symbol allow set.
    pub include_symbols: Vec<String>,
    /// Explicit symbol deny set.
    pub exclude_symbols: Vec<String>,
    /// Case-insensitive regexes the display name must match (any).
    pub include_name_regex: Vec<String>,
    /// Case-insensitive regexes that reject by display name (any).
    pub exclude_name_regex: Vec<String>,
    /// Exchange allow set (codes or display aliases).
    pub include_exchanges: Vec<String>,
    /// Exchange deny set (codes or display aliases).
    pub exclude_exchanges: Vec<String>,
    /// Market category allow set (codes or display aliases).
    pub include_market_categories: Vec<String>,
    /// Market category deny set (codes or display aliases).
    pub exclude_market_categories: Vec<String>,
    /// Tri-state ETF filter: `Some(true)` keeps only ETFs, `Some(false)`
    /// drops them, `None` ignores the flag.
    pub only_etf: Option<bool>,
    /// Tri-state fund filter, same semantics as `only_etf`.
    pub only_fund: Option<bool>,
    /// Fund category allow set (codes or display aliases).
    pub include_fund_categories: Vec<String>,
    /// Fund category deny set (codes or display aliases).
    pub exclude_fund_categories: Vec<String>,
}

/// Merges CLI filters onto configured base filters: lists concatenate,
/// tri-states override when the extra side is set.
#[must_use]
pub fn merge_filters(base: &FilterConfig, extra: Option<&FilterConfig>) -> FilterConfig {
    let Some(extra) = extra else {
        return base.clone();
    };
    let join = |a: &[String], b: &[String]| {
        let mut out = a.to_vec();
        out.extend_from_slice(b);
        out
    };
    FilterConfig {
        include_regex: join(&base.include_regex, &extra.include_regex),
        exclude_regex: join(&base.exclude_regex, &extra.exclude_regex),
        include_prefixes: join(&base.include_prefixes, &extra.include_prefixes),
        exclude_prefixes: join(&base.exclude_prefixes, &extra.exclude_prefixes),
        include_symbols: join(&base.include_symbols, &extra.include_symbols),
        exclude_symbols: join(&base.exclude_symbols, &extra.exclude_symbols),
        include_name_regex: join(&base.include_name_regex, &extra.include_name_regex),
        exclude_name_regex: join(&base.exclude_name_regex, &extra.exclude_name_regex),
        include_exchanges: join(&base.include_exchanges, &extra.include_exchanges),
        exclude_exchanges: join(&base.exclude_exchanges, &extra.exclude_exchanges),
        include_market_categories: join(
            &base.include_market_categories,
            &extra.include_market_categories,
        ),
        exclude_market_categories: join(
            &base.exclude_market_categories,
            &extra.exclude_market_categories,
        ),
        only_etf: extra.only_etf.or(base.only_etf),
        only_fund: extra.only_fund.or(base.only_fund),
        include_fund_categories: join(
            &base.include_fund_categories,
            &extra.include_fund_categories,
        ),
        exclude_fund_categories: join(
            &base.exclude_fund_categories,
            &extra.exclude_fund_categories,
        ),
    }
}

/// Compiled form of a [`FilterConfig`], ready to test instruments.
#[derive(Debug)]
pub struct CompiledFilters {
    include_regex: Vec<Regex>,
    exclude_regex: Vec<Regex>,
    include_name_regex: Vec<Regex>,
    exclude_name_regex: Vec<Regex>,
    include_prefixes: Vec<String>,
    exclude_prefixes: Vec<String>,
    include_symbols: HashSet<String>,
    exclude_symbols: HashSet<String>,
    include_exchanges: HashSet<String>,
    exclude_exchanges: HashSet<String>,
    include_markets: HashSet<String>,
    exclude_markets: HashSet<String>,
    include_fund_categories: HashSet<String>,
    exclude_fund_categories: HashSet<String>,
    only_etf: Option<bool>,
    only_fund: Option<bool>,
}

impl CompiledFilters {
    /// Compiles a config. Invalid regex patterns are dropped with a
    /// warning, never an abort.
    #[must_use]
    pub fn compile(config: &FilterConfig) -> Self {
        let upper_set = |values: &[String]| -> HashSet<String> {
            values
                .iter()
                .filter(|v| !v.is_empty())
                .map(|v| v.to_uppercase())
                .collect()
        };
        Self {
            include_regex: compile_patterns(&config.include_regex),
            exclude_regex: compile_patterns(&config.exclude_regex),
            include_name_regex: compile_patterns(&config.include_name_regex),
            exclude_name_regex: compile_patterns(&config.exclude_name_regex),
            include_prefixes: config
                .include_prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.to_uppercase())
                .collect(),
            exclude_prefixes: config
                .exclude_prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.to_uppercase())
                .collect(),
            include_symbols: upper_set(&config.include_symbols),
            exclude_symbols: upper_set(&config.exclude_symbols),
            include_exchanges: normalized_set(&config.include_exchanges, normalize_exchange_value),
            exclude_exchanges: normalized_set(&config.exclude_exchanges, normalize_exchange_value),
            include_markets: normalized_set(
                &config.include_market_categories,
                normalize_market_value,
            ),
            exclude_markets: normalized_set(
                &config.exclude_market_categories,
                normalize_market_value,
            ),
            include_fund_categories: normalized_set(
                &config.include_fund_categories,
                normalize_fund_category,
            ),
            exclude_fund_categories: normalized_set(
                &config.exclude_fund_categories,
                normalize_fund_category,
            ),
            only_etf: config.only_etf,
            only_fund: config.only_fund,
        }
    }

    /// Tests one instrument. Rejection short-circuits in a fixed order:
    /// symbol deny, symbol allow, exchange, market, fund category, prefix,
    /// symbol regex, name regex, tri-state flags.
    #[must_use]
    pub fn matches(&self, item: &SymbolInfo) -> bool {
        let symbol_upper = item.symbol.to_uppercase();
        if !self.exclude_symbols.is_empty() && self.exclude_symbols.contains(&symbol_upper) {
            return false;
        }
        if !self.include_symbols.is_empty() && !self.include_symbols.contains(&symbol_upper) {
            return false;
        }

        let exchange_code = normalize_exchange_value(item.exchange.as_deref().unwrap_or(""));
        let exchange_display = exchange_alias(item.exchange.as_deref());
        if !allowed(
            &self.include_exchanges,
            &self.exclude_exchanges,
            &exchange_code,
            exchange_display,
        ) {
            return false;
        }

        let market_code = normalize_market_value(item.market_category.as_deref().unwrap_or(""));
        let market_display = market_alias(item.market_category.as_deref());
        if !allowed(
            &self.include_markets,
            &self.exclude_markets,
            &market_code,
            market_display,
        ) {
            return false;
        }

        let fund_code = normalize_fund_category(item.fund_category.as_deref().unwrap_or(""));
        let fund_display = fund_category_alias(item.fund_category.as_deref());
        if !allowed(
            &self.include_fund_categories,
            &self.exclude_fund_categories,
            &fund_code,
            fund_display,
        ) {
            return false;
        }

        if !self.include_prefixes.is_empty()
            && !self
                .include_prefixes
                .iter()
                .any(|p| symbol_upper.starts_with(p))
        {
            return false;
        }
        if self
            .exclude_prefixes
            .iter()
            .any(|p| symbol_upper.starts_with(p))
        {
            return false;
        }

        if !self.include_regex.is_empty()
            && !self.include_regex.iter().any(|r| r.is_match(&item.symbol))
        {
            return false;
        }
        if self.exclude_regex.iter().any(|r| r.is_match(&item.symbol)) {
            return false;
        }

        let name = item.name.as_deref().unwrap_or("");
        if !self.include_name_regex.is_empty()
            && !self.include_name_regex.iter().any(|r| r.is_match(name))
        {
            return false;
        }
        if self.exclude_name_regex.iter().any(|r| r.is_match(name)) {
            return false;
        }

        // only_etf=true together with only_fund=true admits either flag.
        if self.only_etf == Some(true) && self.only_fund == Some(true) {
            if !(item.is_etf.unwrap_or(false) || item.is_fund.unwrap_or(false)) {
                return false;
            }
        } else {
            if self.only_etf == Some(true) && !item.is_etf.unwrap_or(false) {
                return false;
            }
            if self.only_fund == Some(true) && !item.is_fund.unwrap_or(false) {
                return false;
            }
        }
        if self.only_etf == Some(false) && item.is_etf.unwrap_or(false) {
            return false;
        }
        if self.only_fund == Some(false) && item.is_fund.unwrap_or(false) {
            return false;
        }
        true
    }

    /// Filters a list, preserving order.
    #[must_use]
    pub fn apply(&self, items: &[SymbolInfo]) -> Vec<SymbolInfo> {
        items.iter().filter(|i| self.matches(i)).cloned().collect()
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern, error = %e, "invalid regex ignored");
                    None
                }
            }
        })
        .collect()
}

fn normalized_set(values: &[String], normalize: fn(&str) -> String) -> HashSet<String> {
    values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| normalize(v))
        .collect()
}

/// Allow/deny check against normalized code and optional display alias:
/// the item passes an allow list if either spelling is listed, and fails a
/// deny list if either spelling is listed.
fn allowed(
    include: &HashSet<String>,
    exclude: &HashSet<String>,
    code: &str,
    display: Option<&str>,
) -> bool {
    if !include.is_empty() {
        let in_include =
            include.contains(code) || display.is_some_and(|alias| include.contains(alias));
        if !in_include {
            return false;
        }
    }
    if !exclude.is_empty() {
        let in_exclude =
            exclude.contains(code) || display.is_some_and(|alias| exclude.contains(alias));
        if in_exclude {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use datagrab_types::AssetType;

    fn stock(symbol: &str, name: &str, exchange: &str) -> SymbolInfo {
        SymbolInfo::new(symbol, AssetType::Stock)
            .with_name(name)
            .with_exchange(exchange)
    }

    fn apply(config: &FilterConfig, items: &[SymbolInfo]) -> Vec<String> {
        CompiledFilters::compile(config)
            .apply(items)
            .into_iter()
            .map(|i| i.symbol)
            .collect()
    }

    #[test]
    fn test_include_exclude_symbols() {
        let items = vec![
            stock("AAPL", "Apple", "NASDAQ"),
            stock("MSFT", "Microsoft", "NASDAQ"),
        ];
        let config = FilterConfig {
            include_symbols: vec!["AAPL".into(), "MSFT".into()],
            exclude_symbols: vec!["MSFT".into()],
            ..FilterConfig::default()
        };
        assert_eq!(apply(&config, &items), vec!["AAPL"]);
    }

    #[test]
    fn test_name_regex_and_exchange() {
        let items = vec![
            stock("AAA", "Test Holdings", "NASDAQ"),
            stock("BBB", "Alpha Inc", "NYSE"),
        ];
        let config = FilterConfig {
            include_name_regex: vec!["alpha".into()],
            include_exchanges: vec!["NYSE".into()],
            ..FilterConfig::default()
        };
        assert_eq!(apply(&config, &items), vec!["BBB"]);
    }

    #[test]
    fn test_invalid_regex_is_ignored() {
        let items = vec![
            stock("AAA", "Alpha", "NASDAQ"),
            stock("BBB", "Beta", "NASDAQ"),
        ];
        let config = FilterConfig {
            include_regex: vec!["[".into()],
            ..FilterConfig::default()
        };
        assert_eq!(apply(&config, &items), vec!["AAA", "BBB"]);
    }

    #[test]
    fn test_market_category_and_etf() {
        let mut qqq = stock("QQQ", "Invesco QQQ", "NASDAQ");
        qqq.market_category = Some("Q".into());
        qqq.is_etf = Some(true);
        let mut foo = stock("FOO", "Foo Corp", "NASDAQ");
        foo.market_category = Some("G".into());
        foo.is_etf = Some(false);

        let config = FilterConfig {
            include_market_categories: vec!["Q".into()],
            only_etf: Some(true),
            ..FilterConfig::default()
        };
        assert_eq!(apply(&config, &[qqq, foo]), vec!["QQQ"]);
    }

    #[test]
    fn test_alias_filters_match_codes() {
        let mut star = SymbolInfo::new("sh.688001", AssetType::Ashare).with_name("科创板样例");
        star.exchange = Some("SSE".into());
        star.market_category = Some("STAR".into());

        let by_market = FilterConfig {
            include_market_categories: vec!["科创板".into()],
            ..FilterConfig::default()
        };
        assert_eq!(apply(&by_market, std::slice::from_ref(&star)).len(), 1);

        let by_exchange = FilterConfig {
            include_exchanges: vec!["上交所".into()],
            ..FilterConfig::default()
        };
        assert_eq!(apply(&by_exchange, std::slice::from_ref(&star)).len(), 1);
    }

    #[test]
    fn test_only_etf_and_fund_is_disjunction() {
        let mut etf = SymbolInfo::new("sh.510300", AssetType::Ashare);
        etf.is_etf = Some(true);
        etf.is_fund = Some(true);
        let mut lof = SymbolInfo::new("sz.160001", AssetType::Ashare);
        lof.is_etf = Some(false);
        lof.is_fund = Some(true);
        let mut plain = SymbolInfo::new("sh.600000", AssetType::Ashare);
        plain.is_etf = Some(false);
        plain.is_fund = Some(false);

        let config = FilterConfig {
            only_etf: Some(true),
            only_fund: Some(true),
            ..FilterConfig::default()
        };
        assert_eq!(
            apply(&config, &[etf, lof, plain]),
            vec!["sh.510300", "sz.160001"]
        );
    }

    #[test]
    fn test_only_etf_false_rejects_etfs() {
        let mut etf = SymbolInfo::new("SPY", AssetType::Stock);
        etf.is_etf = Some(true);
        let plain = SymbolInfo::new("AAPL", AssetType::Stock);

        let config = FilterConfig {
            only_etf: Some(false),
            ..FilterConfig::default()
        };
        assert_eq!(apply(&config, &[etf, plain]), vec!["AAPL"]);
    }

    #[test]
    fn test_fund_category_filter() {
        let mut reit = SymbolInfo::new("sh.508001", AssetType::Ashare);
        reit.fund_category = Some("REIT".into());
        let mut etf = SymbolInfo::new("sh.510300", AssetType::Ashare);
        etf.fund_category = Some("ETF".into());

        let config = FilterConfig {
            include_fund_categories: vec!["REIT".into()],
            ..FilterConfig::default()
        };
        assert_eq!(apply(&config, &[reit, etf]), vec!["sh.508001"]);
    }

    #[test]
    fn test_merge_filters_lists_concat_tristate_overrides() {
        let base = FilterConfig {
            include_prefixes: vec!["A".into()],
            only_etf: Some(true),
            only_fund: Some(false),
            ..FilterConfig::default()
        };
        let extra = FilterConfig {
            include_prefixes: vec!["B".into()],
            only_etf: Some(false),
            ..FilterConfig::default()
        };
        let merged = merge_filters(&base, Some(&extra));
        assert_eq!(merged.include_prefixes, vec!["A", "B"]);
        assert_eq!(merged.only_etf, Some(false));
        assert_eq!(merged.only_fund, Some(false));
        assert_eq!(merge_filters(&base, None), base);
    }
}
