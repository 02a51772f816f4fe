//! Header normalization for raw provider tables.
//!
//! Providers return tables with arbitrary header spellings (`Date`,
//! `Adj Close`, multi-level tuples already flattened by the adapter). This
//! module maps them onto the canonical column names and resolves duplicate
//! headers the way the store expects.

use std::collections::HashMap;

/// Canonical base columns in projection order.
pub const BASE_COLUMNS: [&str; 6] = ["datetime", "open", "high", "low", "close", "volume"];

/// Optional trailing column for provider-adjusted closes.
pub const ADJUSTED_COLUMN: &str = "adjusted_close";

/// Normalizes one raw header to its canonical spelling.
///
/// Lowercases, trims and replaces spaces with underscores, then applies the
/// canonical renames `date -> datetime` and `adj_close -> adjusted_close`.
#[must_use]
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace(' ', "_");
    match lowered.as_str() {
        "date" | "index" => "datetime".to_string(),
        "adj_close" | "adjclose" => ADJUSTED_COLUMN.to_string(),
        _ => lowered,
    }
}

/// Disambiguates duplicate headers by suffixing `_1`, `_2`, ...
///
/// Empty headers become `col`. The first occurrence keeps its name, so the
/// canonical lookup always binds to the leftmost column.
#[must_use]
pub fn dedupe_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .map(|raw| {
            let base = if raw.trim().is_empty() {
                "col".to_string()
            } else {
                raw.clone()
            };
            let n = seen.entry(base.clone()).or_insert(0);
            let name = if *n == 0 {
                base.clone()
            } else {
                format!("{base}_{n}")
            };
            *n += 1;
            name
        })
        .collect()
}

/// Positions of the canonical columns inside a normalized header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    /// Index of the `datetime` column.
    pub datetime: Option<usize>,
    /// Index of the `open` column.
    pub open: Option<usize>,
    /// Index of the `high` column.
    pub high: Option<usize>,
    /// Index of the `low` column.
    pub low: Option<usize>,
    /// Index of the `close` column.
    pub close: Option<usize>,
    /// Index of the `volume` column.
    pub volume: Option<usize>,
    /// Index of the `adjusted_close` column.
    pub adjusted_close: Option<usize>,
}

impl ColumnMap {
    /// Builds the map from raw headers, normalizing and deduping first.
    /// The first column that normalizes to a canonical name wins.
    #[must_use]
    pub fn from_headers(raw_headers: &[String]) -> Self {
        let normalized: Vec<String> = raw_headers.iter().map(|h| normalize_header(h)).collect();
        let deduped = dedupe_headers(&normalized);
        let mut map = Self::default();
        for (idx, name) in deduped.iter().enumerate() {
            let slot = match name.as_str() {
                "datetime" => &mut map.datetime,
                "open" => &mut map.open,
                "high" => &mut map.high,
                "low" => &mut map.low,
                "close" => &mut map.close,
                "volume" => &mut map.volume,
                ADJUSTED_COLUMN => &mut map.adjusted_close,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
        map
    }

    /// Returns true when a `datetime` column was found.
    #[must_use]
    pub const fn has_datetime(&self) -> bool {
        self.datetime.is_some()
    }
}
