use crate::models::bar::KlineInterval;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub binance: BinanceConfig,
    pub monitor: MonitorConfig,
    pub detector: DetectorConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    pub rest_url: String,
    pub request_timeout_secs: u64,
    pub page_limit: u32, // klines per request, Binance caps at 1500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub symbols: Vec<String>, // empty = every USDT perpetual currently trading
    pub poll_interval_secs: u64,
    pub warmup_hours: u32,
    pub max_workers: usize,
    pub max_qps: f64,
}

/// Every tunable of the detection core. Only bar timestamps flow through
/// these paths, so the same values give the same events live and in replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub interval: KlineInterval,
    pub silent: SilentParams,
    pub accum: AccumParams,
    pub breakout: BreakoutParams,
    pub phase: PhaseParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilentParams {
    pub quiet_p90: f64,         // p90 range ratio ceiling (e.g. 0.015)
    pub quiet_max: f64,         // max range ratio ceiling (e.g. 0.04)
    pub forbid_down_slope: f64, // close slope floor, price per bar
    pub min_silent: usize,      // shortest run that counts as silent
    pub scan_win: usize,        // sliding sub-window length
    pub step: usize,            // sliding step
    pub slope_tail: usize,      // closes used for the trend check
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumParams {
    pub min_len: usize,
    pub max_len: usize,
    pub sideways_p90: f64,
    pub sideways_max: f64,
    pub vol_floor: f64,     // segment median volume vs silent median
    pub vol_ramp: f64,      // tail quarter median vs head median
    pub spike_ratio: f64,   // tail median must be >= tail mean * this
    pub buy_ratio_min: f64,
    pub tiny_eps: f64,      // closes may poke this far above the box top
    pub floor_eps: f64,     // and this far below the box bottom
    pub mid_dev: f64,       // last close vs segment mean
    pub lookback_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutParams {
    pub window_len: usize,
    pub confirm_len: usize,
    pub break_eps: f64,
    pub max_wick: f64,
    pub min_body: f64,
    pub vol_mult: f64,
    pub persist_count: usize,
    pub buy_ratio_min: f64,
    pub buy_ratio_bars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseParams {
    pub score_min: f64,
    pub trap_max: u32,
    pub confirm_bars: usize,
    pub pending_ttl_bars: i64,
    pub exit_confirm: u32,
    pub breakout_expire_bars: i64,
    pub lookback_bars: usize, // history held per instrument
    pub min_view_bars: usize, // no evaluation below this many bars
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub alert_on_accum: bool,
    pub alert_on_breakout: bool,
    pub alert_on_pending: bool,
    pub alert_on_error: bool,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            rest_url: "https://fapi.binance.com".into(),
            request_timeout_secs: 10,
            page_limit: 1500,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            poll_interval_secs: 180,
            warmup_hours: 24,
            max_workers: 10,
            max_qps: 8.0,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval: KlineInterval::FiveMinutes,
            silent: SilentParams::default(),
            accum: AccumParams::default(),
            breakout: BreakoutParams::default(),
            phase: PhaseParams::default(),
        }
    }
}

impl Default for SilentParams {
    fn default() -> Self {
        Self {
            quiet_p90: 0.015,
            quiet_max: 0.04,
            forbid_down_slope: -0.0008,
            min_silent: 50,
            scan_win: 30,
            step: 2,
            slope_tail: 40,
        }
    }
}

impl Default for AccumParams {
    fn default() -> Self {
        Self {
            min_len: 20,
            max_len: 120,
            sideways_p90: 0.018,
            sideways_max: 0.035,
            vol_floor: 1.4,
            vol_ramp: 1.2,
            spike_ratio: 0.6,
            buy_ratio_min: 0.52,
            tiny_eps: 0.0012,
            floor_eps: 0.004,
            mid_dev: 0.012,
            lookback_len: 240,
        }
    }
}

impl Default for BreakoutParams {
    fn default() -> Self {
        Self {
            window_len: 144,
            confirm_len: 36,
            break_eps: 0.003,
            max_wick: 0.55,
            min_body: 0.30,
            vol_mult: 1.8,
            persist_count: 3,
            buy_ratio_min: 0.55,
            buy_ratio_bars: 5,
        }
    }
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self {
            score_min: 60.0,
            trap_max: 35,
            confirm_bars: 2,
            pending_ttl_bars: 6,
            exit_confirm: 3,
            breakout_expire_bars: 48,
            lookback_bars: 288,
            min_view_bars: 60,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            discord_webhook_url: None,
            alert_on_accum: true,
            alert_on_breakout: true,
            alert_on_pending: false,
            alert_on_error: true,
        }
    }
}

impl DetectorConfig {
    pub fn bar_ms(&self) -> i64 {
        self.interval.duration_ms()
    }
}

/// Parse `key` from the environment into `target`, leaving it untouched when
/// unset. A value that does not parse is logged and ignored.
fn env_override<T: FromStr>(key: &str, target: &mut T) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *target = v,
        Err(_) => tracing::warn!("Ignoring unparsable {key}={raw}"),
    }
}

/// Comma separated, upper-cased, blanks dropped.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from environment variables (.env file) with defaults.
    ///
    /// Optional env vars:
    ///   SYMBOLS: comma separated, e.g. "BTCUSDT,ETHUSDT" (default: all trading USDT)
    ///   KLINE_INTERVAL: Binance interval string (default: 5m)
    ///   POLL_INTERVAL_SECS, WARMUP_HOURS, MAX_WORKERS, MAX_QPS
    ///   SCORE_MIN, TRAP_MAX, CONFIRM_BARS, PENDING_TTL_BARS, EXIT_CONFIRM,
    ///   BREAKOUT_EXPIRE_BARS, LOOKBACK_BARS
    ///   BINANCE_REST_URL
    ///   TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, DISCORD_WEBHOOK_URL
    ///   RUST_LOG: log level (default: info)
    pub fn load_or_default() -> Self {
        let _ = dotenv::dotenv();

        let mut config = Self::default();

        if let Ok(symbols) = std::env::var("SYMBOLS") {
            config.monitor.symbols = parse_symbols(&symbols);
        }
        if let Ok(url) = std::env::var("BINANCE_REST_URL") {
            if !url.is_empty() {
                config.binance.rest_url = url.trim_end_matches('/').to_string();
            }
        }

        env_override("KLINE_INTERVAL", &mut config.detector.interval);
        env_override("POLL_INTERVAL_SECS", &mut config.monitor.poll_interval_secs);
        env_override("WARMUP_HOURS", &mut config.monitor.warmup_hours);
        env_override("MAX_WORKERS", &mut config.monitor.max_workers);
        env_override("MAX_QPS", &mut config.monitor.max_qps);

        let phase = &mut config.detector.phase;
        env_override("SCORE_MIN", &mut phase.score_min);
        env_override("TRAP_MAX", &mut phase.trap_max);
        env_override("CONFIRM_BARS", &mut phase.confirm_bars);
        env_override("PENDING_TTL_BARS", &mut phase.pending_ttl_bars);
        env_override("EXIT_CONFIRM", &mut phase.exit_confirm);
        env_override("BREAKOUT_EXPIRE_BARS", &mut phase.breakout_expire_bars);
        env_override("LOOKBACK_BARS", &mut phase.lookback_bars);

        // Telegram alerts
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            if !token.is_empty() && token != "your_bot_token" {
                config.telemetry.telegram_bot_token = Some(token);
            }
        }
        if let Ok(chat) = std::env::var("TELEGRAM_CHAT_ID") {
            if !chat.is_empty() && chat != "your_chat_id" {
                config.telemetry.telegram_chat_id = Some(chat);
            }
        }

        // Discord alerts
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.is_empty() && url != "your_webhook_url" {
                config.telemetry.discord_webhook_url = Some(url);
            }
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.telemetry.log_level = level;
        }

        config
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.detector.validate()?;
        let m = &self.monitor;
        anyhow::ensure!(m.max_workers > 0, "max_workers must be positive");
        anyhow::ensure!(m.max_qps > 0.0, "max_qps must be positive, got {}", m.max_qps);
        anyhow::ensure!(m.poll_interval_secs > 0, "poll_interval_secs must be positive");
        anyhow::ensure!(
            self.binance.page_limit > 0 && self.binance.page_limit <= 1500,
            "page_limit must be in 1..=1500, got {}",
            self.binance.page_limit
        );
        Ok(())
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.silent;
        anyhow::ensure!(s.step > 0, "silent step must be positive");
        anyhow::ensure!(s.scan_win >= 3, "scan_win must be at least 3");
        anyhow::ensure!(s.min_silent >= s.scan_win, "min_silent must be >= scan_win");

        let a = &self.accum;
        anyhow::ensure!(a.min_len >= 4, "accumulation min_len must be at least 4");
        anyhow::ensure!(a.max_len >= a.min_len, "accumulation max_len must be >= min_len");

        let b = &self.breakout;
        anyhow::ensure!(
            b.confirm_len >= 2 && b.confirm_len < b.window_len,
            "confirm_len must be in 2..window_len"
        );
        anyhow::ensure!(b.buy_ratio_bars > 0, "buy_ratio_bars must be positive");
        anyhow::ensure!(b.vol_mult > 0.0, "vol_mult must be positive");

        let p = &self.phase;
        anyhow::ensure!(
            (0.0..=100.0).contains(&p.score_min),
            "score_min must be between 0 and 100, got {}",
            p.score_min
        );
        anyhow::ensure!(p.confirm_bars >= 2, "confirm_bars must be at least 2");
        anyhow::ensure!(p.pending_ttl_bars > 0, "pending_ttl_bars must be positive");
        anyhow::ensure!(p.exit_confirm > 0, "exit_confirm must be positive");
        anyhow::ensure!(
            p.lookback_bars >= p.min_view_bars,
            "lookback_bars must be >= min_view_bars"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detector.bar_ms(), 300_000);
    }

    #[test]
    fn test_bad_confirm_bars_rejected() {
        let mut config = Config::default();
        config.detector.phase.confirm_bars = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!(
            parse_symbols(" btcusdt, ETHUSDT ,,"),
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
        );
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.detector.interval, KlineInterval::FiveMinutes);
        assert_eq!(back.detector.phase.trap_max, 35);
    }
}
