//! Offline replay of one symbol through the live detection step.
//!
//! Fetches history from Binance, walks it bar by bar and prints every phase
//! event as a JSON line on stdout. Logs go to stderr.
//!
//! Usage:  cargo run --bin replay -- SYMBOL ["YYYY-MM-DD HH:MM"] [HOURS]
//!   END defaults to now (UTC), HOURS to 48.

use boxwatch::config::{parse_symbols, Config};
use boxwatch::engine::replay::replay_until;
use boxwatch::feeds::binance::BinanceKlineClient;
use boxwatch::feeds::provider::KlineProvider;
use boxwatch::feeds::rate_limiter::QpsLimiter;

use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

const DEFAULT_HOURS: i64 = 48;

fn parse_end(raw: &str) -> anyhow::Result<i64> {
    let t = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M")
        .with_context(|| format!("END must look like \"2024-01-31 13:05\", got {raw:?}"))?;
    Ok(t.and_utc().timestamp_millis())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.telemetry.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    config.validate()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let symbol = args
        .first()
        .and_then(|s| parse_symbols(s).into_iter().next())
        .context("usage: replay SYMBOL [\"YYYY-MM-DD HH:MM\"] [HOURS]")?;
    let end = match args.get(1) {
        Some(raw) => parse_end(raw)?,
        None => Utc::now().timestamp_millis(),
    };
    let hours: i64 = match args.get(2) {
        Some(raw) => raw.parse().with_context(|| format!("HOURS must be a number, got {raw:?}"))?,
        None => DEFAULT_HOURS,
    };
    anyhow::ensure!(hours > 0, "HOURS must be positive");

    let limiter = Arc::new(QpsLimiter::new(config.monitor.max_qps));
    let client = BinanceKlineClient::new(config.binance.clone(), limiter)?;
    let start = end - hours * 3_600_000;
    let bars = client
        .fetch_klines(&symbol, config.detector.interval, start)
        .await
        .with_context(|| format!("fetching {symbol} klines"))?;
    info!("{symbol}: {} bars of {} from {start} to {end}", bars.len(), config.detector.interval);

    let outcome = replay_until(&symbol, &bars, end, &config.detector);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for event in &outcome.events {
        writeln!(out, "{}", serde_json::to_string(event)?)?;
    }
    out.flush()?;

    info!("Final state: {}", serde_json::to_string(&outcome.runtime.state)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_end() {
        assert_eq!(parse_end("1970-01-01 00:05").unwrap(), 300_000);
        assert!(parse_end("yesterday").is_err());
    }
}
