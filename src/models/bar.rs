use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One kline: OHLCV plus the taker-buy breakdown Binance reports.
///
/// Timestamps are unix millis. Bars are produced once by the feed and only
/// ever read afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trade_count: u64,
    pub buy_volume: f64,       // taker buy base volume
    pub buy_quote_volume: f64, // taker buy quote volume
}

impl Bar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn body_high(&self) -> f64 {
        self.open.max(self.close)
    }

    pub fn body_low(&self) -> f64 {
        self.open.min(self.close)
    }

    /// Taker-buy share of this bar's volume; 0 for an empty bar.
    pub fn buy_ratio(&self) -> f64 {
        if self.volume <= 0.0 {
            return 0.0;
        }
        self.buy_volume / self.volume
    }

    /// high >= body >= low and volume >= buy volume >= 0.
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.body_high()
            && self.body_low() >= self.low
            && self.volume >= self.buy_volume
            && self.buy_volume >= 0.0
    }
}

/// Prefix of `bars` whose close_time is at or before `t_ms`.
///
/// Bars must be time-ascending. Used for point-in-time evaluation so nothing
/// after `t_ms` leaks into a detection.
pub fn bars_closed_by(bars: &[Bar], t_ms: i64) -> &[Bar] {
    let end = bars.partition_point(|b| b.close_time <= t_ms);
    &bars[..end]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl KlineInterval {
    pub const ALL: [KlineInterval; 15] = [
        KlineInterval::OneMinute,
        KlineInterval::ThreeMinutes,
        KlineInterval::FiveMinutes,
        KlineInterval::FifteenMinutes,
        KlineInterval::ThirtyMinutes,
        KlineInterval::OneHour,
        KlineInterval::TwoHours,
        KlineInterval::FourHours,
        KlineInterval::SixHours,
        KlineInterval::EightHours,
        KlineInterval::TwelveHours,
        KlineInterval::OneDay,
        KlineInterval::ThreeDays,
        KlineInterval::OneWeek,
        KlineInterval::OneMonth,
    ];

    /// Wire string used by the Binance klines endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            KlineInterval::OneMinute => "1m",
            KlineInterval::ThreeMinutes => "3m",
            KlineInterval::FiveMinutes => "5m",
            KlineInterval::FifteenMinutes => "15m",
            KlineInterval::ThirtyMinutes => "30m",
            KlineInterval::OneHour => "1h",
            KlineInterval::TwoHours => "2h",
            KlineInterval::FourHours => "4h",
            KlineInterval::SixHours => "6h",
            KlineInterval::EightHours => "8h",
            KlineInterval::TwelveHours => "12h",
            KlineInterval::OneDay => "1d",
            KlineInterval::ThreeDays => "3d",
            KlineInterval::OneWeek => "1w",
            KlineInterval::OneMonth => "1M",
        }
    }

    /// Nominal bar length in millis (a month is counted as 30 days).
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            KlineInterval::OneMinute => MINUTE,
            KlineInterval::ThreeMinutes => 3 * MINUTE,
            KlineInterval::FiveMinutes => 5 * MINUTE,
            KlineInterval::FifteenMinutes => 15 * MINUTE,
            KlineInterval::ThirtyMinutes => 30 * MINUTE,
            KlineInterval::OneHour => 60 * MINUTE,
            KlineInterval::TwoHours => 120 * MINUTE,
            KlineInterval::FourHours => 240 * MINUTE,
            KlineInterval::SixHours => 360 * MINUTE,
            KlineInterval::EightHours => 480 * MINUTE,
            KlineInterval::TwelveHours => 720 * MINUTE,
            KlineInterval::OneDay => 1_440 * MINUTE,
            KlineInterval::ThreeDays => 3 * 1_440 * MINUTE,
            KlineInterval::OneWeek => 7 * 1_440 * MINUTE,
            KlineInterval::OneMonth => 30 * 1_440 * MINUTE,
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown kline interval: {0}")]
pub struct UnknownInterval(pub String);

impl FromStr for KlineInterval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "1M" (month) and "1m" (minute) differ only by case
        KlineInterval::ALL
            .into_iter()
            .find(|i| i.as_str() == s.trim())
            .ok_or_else(|| UnknownInterval(s.to_string()))
    }
}
