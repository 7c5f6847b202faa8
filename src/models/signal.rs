use serde::{Deserialize, Serialize};
use std::fmt;

use super::bar::Bar;

/// Price range of a consolidation, taken from a silent segment's bodies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBox {
    pub top: f64,    // p95 of body highs
    pub bottom: f64, // p5 of body lows
}

impl PriceBox {
    /// (top - bottom) / bottom; 0 when the bottom is not positive.
    pub fn height_ratio(&self) -> f64 {
        if self.bottom <= 0.0 {
            return 0.0;
        }
        (self.top - self.bottom) / self.bottom
    }

    /// Close threshold that counts as a break above the box.
    pub fn break_level(&self, eps: f64) -> f64 {
        self.top * (1.0 + eps)
    }
}

/// Low-volatility run in window index coordinates, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SilentSegment {
    pub start: usize,
    pub end: usize,
    pub len: usize,
    pub p90: f64,   // p90 of per-bar range ratio over the run
    pub max: f64,   // max range ratio over the run
    pub slope: f64, // close slope, price per bar
    pub score: f64,
}

impl SilentSegment {
    /// The run's bars in the window it was found in.
    pub fn slice<'a>(&self, window: &'a [Bar]) -> &'a [Bar] {
        &window[self.start..self.end]
    }
}

/// Metrics of a segment that passed every accumulation check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccumulationSignal {
    pub buy_ratio: f64,
    pub med_vol_ratio: f64,   // segment median volume / silent median volume
    pub tail_head_ratio: f64, // tail quarter median / head median
}

/// Result of the accumulation classifier over a whole window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccumulationPhase {
    pub start_time: i64, // open time of the first accumulation bar
    pub end_time: i64,   // open time of the last accumulation bar
    pub price_box: PriceBox,
    pub silent: SilentSegment,
    pub signal: AccumulationSignal,
}

/// Output of the strict breakout detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakoutSignal {
    /// Open time of the first confirm bar that closed above the break level.
    pub breakout_open_time: i64,
    pub price_box: PriceBox,
    pub break_eps: f64,
    pub score: f64, // 0-100
    pub vol_ratio: f64,
    pub buy_ratio: f64,
    pub magnitude: f64, // last close / top - 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrapFlag {
    BodyShrink,
    VolumeFade,
    NoExtension,
    BackIntoBox,
    LongWick,
    BuyDecay,
}

impl TrapFlag {
    pub fn points(&self) -> u32 {
        match self {
            TrapFlag::BodyShrink => 30,
            TrapFlag::VolumeFade => 20,
            TrapFlag::NoExtension => 20,
            TrapFlag::BackIntoBox => 40,
            TrapFlag::LongWick => 15,
            TrapFlag::BuyDecay => 15,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrapFlag::BodyShrink => "body_shrink",
            TrapFlag::VolumeFade => "volume_fade",
            TrapFlag::NoExtension => "no_extension",
            TrapFlag::BackIntoBox => "back_into_box",
            TrapFlag::LongWick => "long_wick",
            TrapFlag::BuyDecay => "buy_decay",
        }
    }
}

/// False-breakout penalty for the bars that followed a breakout bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrapReport {
    pub score: u32,
    pub back_into_box: bool,
    pub flags: Vec<TrapFlag>,
}

impl TrapReport {
    pub fn describe(&self) -> String {
        if self.flags.is_empty() {
            return "clean".into();
        }
        self.flags
            .iter()
            .map(TrapFlag::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Why a detector found no evidence. Never fatal; the state machine just
/// does not transition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("insufficient data: need {need} bars, have {have}")]
    InsufficientData { need: usize, have: usize },
    #[error("not quiet: p90 range {p90:.4}, max range {max:.4}")]
    NotQuiet { p90: f64, max: f64 },
    #[error("down-trending context: slope {slope:.6}")]
    DownContext { slope: f64 },
    #[error("no silent segment")]
    NoSilentSegment,
    #[error("segment too short: {len} < {min}")]
    TooShort { len: usize, min: usize },
    #[error("not sideways: p90 range {p90:.4}, max range {max:.4}")]
    NotSideways { p90: f64, max: f64 },
    #[error("no baseline volume")]
    NoBaseVolume,
    #[error("volume too low: {ratio:.2}x baseline, need {need:.2}x")]
    LowVolume { ratio: f64, need: f64 },
    #[error("volume not ramping: tail/head {ratio:.2}, need {need:.2}")]
    NoRamp { ratio: f64, need: f64 },
    #[error("spiky tail volume: median {median:.2} vs mean {mean:.2}")]
    SpikyTail { median: f64, mean: f64 },
    #[error("weak buying: buy ratio {ratio:.3} < {min:.3}")]
    WeakBuying { ratio: f64, min: f64 },
    #[error("close {close} above box limit {limit}")]
    AboveBox { close: f64, limit: f64 },
    #[error("close {close} below box limit {limit}")]
    BelowBox { close: f64, limit: f64 },
    #[error("price drift {dev:.4} beyond {max:.4}")]
    Drift { dev: f64, max: f64 },
    #[error("no valid accumulation segment")]
    NoValidSegment,
    #[error("breakout already in progress")]
    BreakoutInProgress,
    #[error("breakout volume {ratio:.2}x baseline, need {need:.2}x")]
    WeakVolume { ratio: f64, need: f64 },
    #[error("only {count} bars above volume threshold, need {need}")]
    NotPersistent { count: usize, need: usize },
    #[error("last close {close} not above {level}")]
    NoBreak { close: f64, level: f64 },
    #[error("previous close {close} not above {level}")]
    NoFollowThrough { close: f64, level: f64 },
    #[error("poor breakout candle: wick {wick:.2}, body {body:.2}")]
    PoorCandle { wick: f64, body: f64 },
}

impl Rejection {
    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InsufficientData { .. } => "insufficient_data",
            Rejection::NotQuiet { .. } => "not_quiet",
            Rejection::DownContext { .. } => "down_context",
            Rejection::NoSilentSegment => "no_silent_segment",
            Rejection::TooShort { .. } => "too_short",
            Rejection::NotSideways { .. } => "not_sideways",
            Rejection::NoBaseVolume => "no_base_volume",
            Rejection::LowVolume { .. } => "low_volume",
            Rejection::NoRamp { .. } => "no_ramp",
            Rejection::SpikyTail { .. } => "spiky_tail",
            Rejection::WeakBuying { .. } => "weak_buying",
            Rejection::AboveBox { .. } => "above_box",
            Rejection::BelowBox { .. } => "below_box",
            Rejection::Drift { .. } => "drift",
            Rejection::NoValidSegment => "no_valid_segment",
            Rejection::BreakoutInProgress => "breakout_in_progress",
            Rejection::WeakVolume { .. } => "weak_volume",
            Rejection::NotPersistent { .. } => "not_persistent",
            Rejection::NoBreak { .. } => "no_break",
            Rejection::NoFollowThrough { .. } => "no_follow_through",
            Rejection::PoorCandle { .. } => "poor_candle",
        }
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Rejection::InsufficientData { .. })
    }
}

impl fmt::Display for TrapFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
