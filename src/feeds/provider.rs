use crate::models::bar::{Bar, KlineInterval};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} returned {status}: {body}")]
    Status { endpoint: String, status: u16, body: String },
    #[error("rate limited on {endpoint} (retry after {retry_after_secs:?}s)")]
    RateLimited { endpoint: String, retry_after_secs: Option<u64> },
    #[error("parse error: {0}")]
    Parse(String),
}

/// Source of closed klines.
#[async_trait]
pub trait KlineProvider: Send + Sync {
    /// Closed bars of `symbol` with open time >= `start_time`, ascending.
    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        start_time: i64,
    ) -> Result<Vec<Bar>, FeedError>;

    /// Symbols currently open for trading.
    async fn trading_symbols(&self) -> Result<Vec<String>, FeedError>;
}
