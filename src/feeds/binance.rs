use crate::config::BinanceConfig;
use crate::feeds::provider::{FeedError, KlineProvider};
use crate::feeds::rate_limiter::QpsLimiter;
use crate::models::bar::{Bar, KlineInterval};
use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const KLINES_PATH: &str = "/fapi/v1/klines";
const EXCHANGE_INFO_PATH: &str = "/fapi/v1/exchangeInfo";

/// Binance USD-M futures REST client for klines.
///
/// Every request goes through the shared `QpsLimiter` first.
pub struct BinanceKlineClient {
    config: BinanceConfig,
    http: reqwest::Client,
    limiter: Arc<QpsLimiter>,
}

impl BinanceKlineClient {
    pub fn new(config: BinanceConfig, limiter: Arc<QpsLimiter>) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { config, http, limiter })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.config.rest_url, path);
        let resp = self.http.get(&url).query(query).send().await?;
        let status = resp.status();

        // 418 = IP banned after ignoring 429s
        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            warn!("Binance rate limit on {path} (status {status})");
            return Err(FeedError::RateLimited {
                endpoint: path.to_string(),
                retry_after_secs,
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| FeedError::Parse(format!("{path}: {e}")))
    }
}

#[async_trait]
impl KlineProvider for BinanceKlineClient {
    /// Pages forward from `start_time` until a short page comes back. The
    /// kline still forming at request time is left out.
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        start_time: i64,
    ) -> Result<Vec<Bar>, FeedError> {
        let limit = self.config.page_limit.max(1) as usize;
        let now = Utc::now().timestamp_millis();
        let mut out = Vec::new();
        let mut cursor = start_time;

        loop {
            let query = [
                ("symbol", symbol.to_string()),
                ("interval", interval.as_str().to_string()),
                ("startTime", cursor.to_string()),
                ("limit", limit.to_string()),
            ];
            let page: Vec<RawKline> = self.get_json(KLINES_PATH, &query).await?;
            let page_len = page.len();
            let Some(last_open) = page.last().map(|k| k.0) else {
                break;
            };
            for raw in page {
                let bar = Bar::try_from(raw)?;
                if !bar.is_well_formed() {
                    debug!("{symbol} malformed kline at {}", bar.open_time);
                }
                out.push(bar);
            }
            if page_len < limit || last_open >= now {
                break;
            }
            cursor = last_open + 1;
        }

        let bars = closed_only(out, now);
        debug!("{symbol} fetched {} closed {} bars from {start_time}", bars.len(), interval);
        Ok(bars)
    }

    async fn trading_symbols(&self) -> Result<Vec<String>, FeedError> {
        let info: ExchangeInfo = self.get_json(EXCHANGE_INFO_PATH, &[]).await?;
        Ok(usdt_perpetuals(&info))
    }
}

/// Drops bars still open at `now` and anything out of order.
pub fn closed_only(bars: Vec<Bar>, now: i64) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        if bar.close_time > now {
            continue;
        }
        if out.last().is_some_and(|prev| bar.open_time <= prev.open_time) {
            continue;
        }
        out.push(bar);
    }
    out
}

fn usdt_perpetuals(info: &ExchangeInfo) -> Vec<String> {
    let mut symbols: Vec<String> = info
        .symbols
        .iter()
        .filter(|s| s.status == "TRADING" && s.quote_asset == "USDT")
        .filter(|s| s.contract_type.as_deref().map_or(true, |c| c == "PERPETUAL"))
        .map(|s| s.symbol.clone())
        .collect();
    symbols.sort();
    symbols
}

// --- Binance message types ---

/// One kline row: [open time, open, high, low, close, volume, close time,
/// quote volume, trades, taker buy base, taker buy quote, ignore].
#[derive(Debug, Deserialize)]
struct RawKline(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    serde_json::Value,
);

fn num(field: &str, raw: &str) -> Result<f64, FeedError> {
    raw.parse()
        .map_err(|_| FeedError::Parse(format!("kline {field}: {raw:?}")))
}

impl TryFrom<RawKline> for Bar {
    type Error = FeedError;

    fn try_from(k: RawKline) -> Result<Self, Self::Error> {
        Ok(Bar {
            open_time: k.0,
            open: num("open", &k.1)?,
            high: num("high", &k.2)?,
            low: num("low", &k.3)?,
            close: num("close", &k.4)?,
            volume: num("volume", &k.5)?,
            close_time: k.6,
            quote_volume: num("quote_volume", &k.7)?,
            trade_count: k.8,
            buy_volume: num("buy_volume", &k.9)?,
            buy_quote_volume: num("buy_quote_volume", &k.10)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    quote_asset: String,
    contract_type: Option<String>,
}
