//! A-share OHLCV source (mainland-China listed equities and funds).
//!
//! Talks to the quote-center kline gateway over HTTP. Unlike the other
//! providers, the full adjustment set is supported and mapped to the
//! gateway's native flag. A lightweight session handshake is performed
//! once and re-established after failures, guarded by a login mutex.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use datagrab_catalog::{CatalogService, FilterConfig};
use datagrab_store::{ColumnPresence, OhlcvFrame, OhlcvRow};
use datagrab_types::{Adjust, AssetType, Clock, Interval, SymbolInfo};

use crate::outcome::is_no_data_message;
use crate::{DataSource, FetchOutcome, OhlcvResult, RateLimiter, SourceError};

/// Kline endpoint of the quote-center gateway.
const KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
/// Probe endpoint used by the session handshake.
const SESSION_URL: &str = "https://push2.eastmoney.com/api/qt/ulist.np/get";

const PROVIDER: &str = "ashare";

/// A-share source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AshareConfig {
    /// Adjustment used when the caller asks for `auto`.
    pub adjust_default: Adjust,
    /// Transient-failure retry budget per fetch.
    pub max_retries: u32,
    /// Request timeout in seconds.
    pub timeout_sec: u64,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
}

impl Default for AshareConfig {
    fn default() -> Self {
        Self {
            adjust_default: Adjust::Back,
            max_retries: 2,
            timeout_sec: 30,
            proxy: None,
        }
    }
}

/// A-share data source.
pub struct AshareSource {
    config: AshareConfig,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    catalog: Arc<CatalogService>,
    clock: Clock,
    /// Double-checked session guard: `true` once the handshake succeeded;
    /// reset on fetch failure so the next attempt re-establishes it.
    session: tokio::sync::Mutex<bool>,
}

impl AshareSource {
    /// Creates a source sharing the global rate limiter and catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: AshareConfig,
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
            session: tokio::sync::Mutex::new(false),
        })
    }

    /// Maps an interval token onto the gateway's kline type.
    fn map_interval(interval: &Interval) -> Result<&'static str, SourceError> {
        let klt = match interval.as_str() {
            "1d" => "101",
            "1w" | "1wk" => "102",
            "1mo" => "103",
            "1m" | "1min" => "1",
            "5m" => "5",
            "15m" => "15",
            "30m" => "30",
            "60m" | "1h" => "60",
            _ => {
                return Err(SourceError::IntervalUnsupported {
                    provider: PROVIDER,
                    interval: interval.as_str().to_string(),
                })
            }
        };
        Ok(klt)
    }

    /// Maps an adjustment onto the gateway's `fqt` flag, resolving `auto`
    /// through the configured default.
    fn map_adjust(&self, adjust: Adjust) -> (&'static str, Adjust) {
        let effective = match adjust {
            Adjust::Auto => self.config.adjust_default,
            other => other,
        };
        let flag = match effective {
            Adjust::Forward => "1",
            Adjust::Back => "2",
            Adjust::None | Adjust::Auto => "0",
        };
        (flag, effective)
    }

    /// Venue-prefixed code (`sh.600000`) to gateway secid (`1.600000`).
    fn secid(symbol: &str) -> String {
        let lowered = symbol.trim().to_lowercase();
        match lowered.split_once('.') {
            Some(("sh", num)) => format!("1.{num}"),
            Some((_, num)) => format!("0.{num}"),
            None => format!("1.{lowered}"),
        }
    }

    /// Establishes the gateway session once; concurrent callers serialize
    /// on the login mutex and skip the handshake when already live.
    async fn ensure_session(&self) -> Result<(), FetchOutcome> {
        let mut live = self.session.lock().await;
        if *live {
            return Ok(());
        }
        let result = self.client.get(SESSION_URL).query(&[("pn", "1"), ("pz", "1")]).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                *live = true;
                debug!("gateway session established");
                Ok(())
            }
            Ok(response) => Err(FetchOutcome::Transient(format!(
                "session handshake rejected: {}",
                response.status()
            ))),
            Err(e) => Err(FetchOutcome::from_transport(&e)),
        }
    }

    async fn invalidate_session(&self) {
        *self.session.lock().await = false;
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        klt: &str,
        fqt: &str,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> FetchOutcome {
        if let Err(outcome) = self.ensure_session().await {
            return outcome;
        }
        let response = self
            .client
            .get(KLINE_URL)
            .query(&[
                ("secid", Self::secid(symbol)),
                ("klt", klt.to_string()),
                ("fqt", fqt.to_string()),
                // Gateway dates are exchange-local; anchor them in the
                // operational timezone before dropping the offset.
                ("beg", self.clock.to_local(start).format("%Y%m%d").to_string()),
                ("end", self.clock.to_local(end).format("%Y%m%d").to_string()),
                ("fields1", "f1,f2,f3".to_string()),
                ("fields2", "f51,f52,f53,f54,f55,f56".to_string()),
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
        let envelope: KlineEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) => return FetchOutcome::Fatal(format!("kline payload unparsable: {e}")),
        };
        let Some(data) = envelope.data else {
            let message = envelope.message.unwrap_or_default();
            if message.is_empty() || is_no_data_message(&message) {
                return FetchOutcome::Empty;
            }
            return FetchOutcome::Fatal(message);
        };
        self.klines_to_frame(&data.klines)
    }

    /// Parses `date,open,close,high,low,volume` kline strings into rows.
    fn klines_to_frame(&self, klines: &[String]) -> FetchOutcome {
        let mut rows = Vec::with_capacity(klines.len());
        for line in klines {
            let mut fields = line.split(',');
            let Some(datetime) = fields.next().and_then(parse_kline_datetime) else {
                warn!(line, "kline row skipped");
                continue;
            };
            let mut number = || fields.next().and_then(|v| v.trim().parse::<f64>().ok());
            let open = number();
            let close = number();
            let high = number();
            let low = number();
            let volume = number();
            rows.push(OhlcvRow {
                datetime,
                open,
                high,
                low,
                close,
                volume,
                adjusted_close: None,
            });
        }
        if rows.is_empty() {
            return FetchOutcome::Empty;
        }
        FetchOutcome::Rows(OhlcvFrame::new(rows, ColumnPresence::ohlcv()))
    }
}

/// Kline timestamps are already exchange-local, which matches the
/// operational timezone for this asset class.
fn parse_kline_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").ok()
}

#[derive(Debug, Deserialize)]
struct KlineEnvelope {
    data: Option<KlineData>,
    #[serde(rename = "msg")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[async_trait]
impl DataSource for AshareSource {
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
        let klt = Self::map_interval(interval)?;
        let (fqt, effective) = self.map_adjust(adjust);

        let mut attempts: u32 = 0;
        loop {
            self.limiter.acquire().await;
            match self.fetch_once(symbol, klt, fqt, start, end).await {
                FetchOutcome::Rows(mut frame) => {
                    frame.dedup_sort();
                    return Ok(OhlcvResult {
                        frame,
                        adjustment: effective,
                    });
                }
                FetchOutcome::Empty => return Ok(OhlcvResult::empty(effective)),
                FetchOutcome::Throttled => {
                    let delay = self.limiter.backoff(attempts + 1);
                    warn!(symbol, delay_s = delay.as_secs_f64(), "rate limited, backing off");
                    tokio::time::sleep(delay).await;
                }
                FetchOutcome::Transient(message) => {
                    self.invalidate_session().await;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secid_mapping() {
        assert_eq!(AshareSource::secid("sh.600000"), "1.600000");
        assert_eq!(AshareSource::secid("sz.000001"), "0.000001");
        assert_eq!(AshareSource::secid("bj.830001"), "0.830001");
        assert_eq!(AshareSource::secid("600000"), "1.600000");
    }

    #[test]
    fn test_interval_mapping() {
        let map = |token: &str| {
            AshareSource::map_interval(&token.parse::<Interval>().unwrap())
        };
        assert_eq!(map("1d").unwrap(), "101");
        assert_eq!(map("1wk").unwrap(), "102");
        assert_eq!(map("1mo").unwrap(), "103");
        assert_eq!(map("5m").unwrap(), "5");
        assert_eq!(map("1h").unwrap(), "60");
        assert!(matches!(
            map("2d"),
            Err(SourceError::IntervalUnsupported { .. })
        ));
    }

    #[test]
    fn test_kline_datetime_formats() {
        assert_eq!(
            parse_kline_datetime("2024-01-02"),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(
            parse_kline_datetime("2024-01-02 10:30"),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(10, 30, 0)
        );
        assert_eq!(parse_kline_datetime("garbage"), None);
    }

    #[test]
    fn test_kline_payload_parses() {
        let payload = r#"{
            "data": {
                "code": "600000",
                "klines": [
                    "2024-01-02,7.1,7.2,7.3,7.0,123456",
                    "2024-01-03,7.2,7.25,7.3,7.15,98765"
                ]
            }
        }"#;
        let envelope: KlineEnvelope = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.data.unwrap().klines.len(), 2);
    }
}
