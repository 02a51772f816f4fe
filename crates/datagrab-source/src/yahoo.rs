//! Yahoo Finance source for stocks, forex, crypto and commodities.
//!
//! Primary path is the chart API (JSON); when it reports a no-data
//! condition the CSV download endpoint is tried once before giving up,
//! since a handful of symbols (notably `=X` forex pairs) are served by one
//! endpoint but not the other.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use datagrab_catalog::{CatalogService, FilterConfig};
use datagrab_store::{ColumnMap, ColumnPresence, OhlcvFrame, OhlcvRow};
use datagrab_types::{Adjust, AssetType, Clock, Interval, SymbolInfo};

use crate::outcome::is_no_data_message;
use crate::{DataSource, FetchOutcome, OhlcvResult, RateLimiter, SourceError};

/// Chart API base URL.
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
/// CSV download base URL (fallback path).
const DOWNLOAD_URL: &str = "https://query1.finance.yahoo.com/v7/finance/download";

const PROVIDER: &str = "yahoo";

/// Yahoo source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct YahooConfig {
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
    /// Transient-failure retry budget per fetch.
    pub max_retries: u32,
    /// Request timeout in seconds.
    pub timeout_sec: u64,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            max_retries: 2,
            timeout_sec: 30,
        }
    }
}

/// Yahoo Finance data source.
pub struct YahooSource {
    config: YahooConfig,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    catalog: Arc<CatalogService>,
    clock: Clock,
}

impl YahooSource {
    /// Creates a source sharing the global rate limiter and catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: YahooConfig,
        limiter: Arc<RateLimiter>,
        catalog: Arc<CatalogService>,
        clock: Clock,
    ) -> Result<Self, SourceError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("datagrab/", env!("CARGO_PKG_VERSION")))
            .gzip(true);
        if let Some(proxy) = &config.proxy {
            builder = builder
                .proxy(reqwest::Proxy::all(proxy).map_err(|e| SourceError::Client(e.to_string()))?);
        }
        let client = builder
            .build()
            .map_err(|e| SourceError::Client(e.to_string()))?;
        Ok(Self {
            config,
            client,
            limiter,
            catalog,
            clock,
        })
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        adjust: Adjust,
    ) -> FetchOutcome {
        match self.fetch_chart(symbol, interval, start, end, adjust).await {
            FetchOutcome::Empty => {
                debug!(symbol, "chart endpoint empty, trying download endpoint");
                self.fetch_csv(symbol, interval, start, end).await
            }
            outcome => outcome,
        }
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        adjust: Adjust,
    ) -> FetchOutcome {
        let url = format!("{CHART_URL}/{symbol}");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", interval.as_str().to_string()),
                ("events", "div,split".to_string()),
                (
                    "includeAdjustedClose",
                    (adjust == Adjust::Auto).to_string(),
                ),
            ])
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => return FetchOutcome::from_transport(&e),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::from_transport(&e),
        };
        if !status.is_success() {
            return FetchOutcome::from_status(status, &body);
        }
        let envelope: ChartEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => return FetchOutcome::Fatal(format!("chart payload unparsable: {e}")),
        };
        if let Some(error) = envelope.chart.error {
            let message = error.description.or(error.code).unwrap_or_default();
            if is_no_data_message(&message) {
                return FetchOutcome::Empty;
            }
            return FetchOutcome::Fatal(message);
        }
        let Some(result) = envelope.chart.result.and_then(|mut r| {
            if r.is_empty() {
                None
            } else {
                Some(r.swap_remove(0))
            }
        }) else {
            return FetchOutcome::Empty;
        };
        self.chart_to_frame(result, adjust)
    }

    fn chart_to_frame(&self, result: ChartResult, adjust: Adjust) -> FetchOutcome {
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
        let adjclose = if adjust == Adjust::Auto {
            result
                .indicators
                .adjclose
                .into_iter()
                .next()
                .and_then(|b| b.adjclose)
        } else {
            None
        };
        let presence = ColumnPresence {
            open: quote.open.is_some(),
            high: quote.high.is_some(),
            low: quote.low.is_some(),
            close: quote.close.is_some(),
            volume: quote.volume.is_some(),
            adjusted_close: adjclose.is_some(),
        };
        let at = |col: &Option<Vec<Option<f64>>>, i: usize| {
            col.as_ref().and_then(|v| v.get(i).copied().flatten())
        };
        let mut rows = Vec::with_capacity(result.timestamp.len());
        for (i, ts) in result.timestamp.iter().enumerate() {
            let Some(ts) = ts else { continue };
            let Some(utc) = Utc.timestamp_opt(*ts, 0).single() else {
                continue;
            };
            rows.push(OhlcvRow {
                datetime: self.clock.to_local(utc).naive_local(),
                open: at(&quote.open, i),
                high: at(&quote.high, i),
                low: at(&quote.low, i),
                close: at(&quote.close, i),
                volume: at(&quote.volume, i),
                adjusted_close: adjclose.as_ref().and_then(|v| v.get(i).copied().flatten()),
            });
        }
        if rows.is_empty() {
            return FetchOutcome::Empty;
        }
        FetchOutcome::Rows(OhlcvFrame::new(rows, presence))
    }

    async fn fetch_csv(
        &self,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> FetchOutcome {
        let url = format!("{DOWNLOAD_URL}/{symbol}");
        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.timestamp().to_string()),
                ("period2", end.timestamp().to_string()),
                ("interval", interval.as_str().to_string()),
                ("events", "history".to_string()),
            ])
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => return FetchOutcome::from_transport(&e),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::from_transport(&e),
        };
        if !status.is_success() {
            return FetchOutcome::from_status(status, &body);
        }
        match parse_csv_frame(&body, &self.clock) {
            Ok(frame) if frame.is_empty() => FetchOutcome::Empty,
            Ok(frame) => FetchOutcome::Rows(frame),
            Err(message) => FetchOutcome::Fatal(message),
        }
    }
}

/// Parses the CSV download payload through the canonical header
/// normalizer (`Date` -> `datetime`, `Adj Close` -> `adjusted_close`).
fn parse_csv_frame(text: &str, clock: &Clock) -> Result<OhlcvFrame, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| format!("csv header unparsable: {e}"))?
        .iter()
        .map(str::to_string)
        .collect();
    let map = ColumnMap::from_headers(&headers);
    if !map.has_datetime() {
        return Err(format!("no datetime column in csv payload: {headers:?}"));
    }
    let presence = ColumnPresence {
        open: map.open.is_some(),
        high: map.high.is_some(),
        low: map.low.is_some(),
        close: map.close.is_some(),
        volume: map.volume.is_some(),
        adjusted_close: map.adjusted_close.is_some(),
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "csv row skipped");
                continue;
            }
        };
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("").trim();
        let number = |idx: Option<usize>| -> Option<f64> {
            let raw = cell(idx);
            if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
                None
            } else {
                raw.parse().ok()
            }
        };
        let Some(datetime) = parse_csv_datetime(cell(map.datetime), clock) else {
            continue;
        };
        rows.push(OhlcvRow {
            datetime,
            open: number(map.open),
            high: number(map.high),
            low: number(map.low),
            close: number(map.close),
            volume: number(map.volume),
            adjusted_close: number(map.adjusted_close),
        });
    }
    Ok(OhlcvFrame::new(rows, presence))
}

/// Provider dates are UTC-anchored; convert into the operational zone and
/// drop the offset, matching the stored representation.
fn parse_csv_datetime(raw: &str, clock: &Clock) -> Option<NaiveDateTime> {
    let naive = if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)?
    } else {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?
    };
    let utc = Utc.from_utc_datetime(&naive);
    Some(clock.to_local(utc).naive_local())
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<Option<i64>>,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Deserialize, Default)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Deserialize, Default)]
struct QuoteBlock {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    adjclose: Option<Vec<Option<f64>>>,
}

#[async_trait]
impl DataSource for YahooSource {
    async fn list_symbols(
        &self,
        asset_type: AssetType,
        refresh: bool,
        limit: Option<usize>,
        filters_override: Option<&FilterConfig>,
    ) -> Result<Vec<SymbolInfo>, SourceError> {
        let result = self
            .catalog
            .get_catalog(asset_type, refresh, limit, filters_override)
            .await?;
        debug!(source = %result.source, count = result.items.len(), "catalog listed");
        Ok(result.items)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &Interval,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        adjust: Adjust,
    ) -> Result<OhlcvResult, SourceError> {
        if !matches!(adjust, Adjust::Auto | Adjust::None) {
            return Err(SourceError::AdjustUnsupported {
                provider: PROVIDER,
                adjust,
            });
        }

        let mut attempts: u32 = 0;
        loop {
            self.limiter.acquire().await;
            match self.fetch_once(symbol, interval, start, end, adjust).await {
                FetchOutcome::Rows(mut frame) => {
                    frame.dedup_sort();
                    return Ok(OhlcvResult {
                        frame,
                        adjustment: adjust,
                    });
                }
                FetchOutcome::Empty => return Ok(OhlcvResult::empty(adjust)),
                FetchOutcome::Throttled => {
                    // Throttling does not consume an attempt.
                    let delay = self.limiter.backoff(attempts + 1);
                    warn!(symbol, delay_s = delay.as_secs_f64(), "rate limited, backing off");
                    tokio::time::sleep(delay).await;
                }
                FetchOutcome::Transient(message) => {
                    if attempts >= self.config.max_retries {
                        return Err(SourceError::RetriesExhausted {
                            symbol: symbol.to_string(),
                            attempts: attempts + 1,
                            message,
                        });
                    }
                    attempts += 1;
                    let delay = self.limiter.backoff(attempts);
                    warn!(
                        symbol,
                        attempt = attempts,
                        delay_s = delay.as_secs_f64(),
                        error = %message,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                FetchOutcome::Fatal(message) => {
                    return Err(SourceError::Fatal {
                        symbol: symbol.to_string(),
                        message,
                    })
                }
            }
        }
    }
}
