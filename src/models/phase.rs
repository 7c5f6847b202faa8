use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    None,
    Accum,
    Breakout,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::None => "NONE",
            Phase::Accum => "ACCUM",
            Phase::Breakout => "BREAKOUT",
        };
        f.write_str(s)
    }
}

/// A breakout awaiting confirmation. Anchored to its bar by open time, never
/// by window index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakoutCandidate {
    pub created_time: i64,
    pub breakout_open_time: i64,
    pub box_top: f64,
    pub break_eps: f64,
    pub score: f64,
}

impl BreakoutCandidate {
    /// Close each follow-up bar must hold to count toward confirmation.
    pub fn hold_level(&self) -> f64 {
        self.box_top * (1.0 + self.break_eps / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseEventKind {
    AccumStart,
    AccumEnd,
    BreakoutConfirmed,
    BreakoutExpire,
    PendingCreate,
    PendingExpire,
    TrapKill,
}

impl PhaseEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseEventKind::AccumStart => "ACCUM_START",
            PhaseEventKind::AccumEnd => "ACCUM_END",
            PhaseEventKind::BreakoutConfirmed => "BREAKOUT_CONFIRMED",
            PhaseEventKind::BreakoutExpire => "BREAKOUT_EXPIRE",
            PhaseEventKind::PendingCreate => "PENDING_CREATE",
            PhaseEventKind::PendingExpire => "PENDING_EXPIRE",
            PhaseEventKind::TrapKill => "TRAP_KILL",
        }
    }
}

impl fmt::Display for PhaseEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase change emitted by the per-bar step. `time` is always a bar open
/// time, never wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEvent {
    pub symbol: String,
    pub kind: PhaseEventKind,
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_time: Option<i64>, // accumulation start or breakout bar
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trap_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accumulated_duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PhaseEvent {
    pub fn new(symbol: &str, kind: PhaseEventKind, time: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
            time,
            anchor_time: None,
            score: None,
            trap_score: None,
            accumulated_duration_ms: None,
            reason: None,
        }
    }

    pub fn anchor(mut self, t: i64) -> Self {
        self.anchor_time = Some(t);
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn trap_score(mut self, score: u32) -> Self {
        self.trap_score = Some(score);
        self
    }

    pub fn duration(mut self, ms: Option<i64>) -> Self {
        self.accumulated_duration_ms = ms;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// One-line human summary used by the alert sink and the logs.
    pub fn summary(&self) -> String {
        let mut out = format!("{} {} @ {}", self.symbol, self.kind, fmt_ms(self.time));
        if let Some(score) = self.score {
            out.push_str(&format!(" score={score:.1}"));
        }
        if let Some(trap) = self.trap_score {
            out.push_str(&format!(" trap={trap}"));
        }
        if let Some(ms) = self.accumulated_duration_ms {
            out.push_str(&format!(" accumulated={:.1}h", ms as f64 / 3_600_000.0));
        }
        if let Some(t) = self.anchor_time {
            out.push_str(&format!(" anchor={}", fmt_ms(t)));
        }
        if let Some(reason) = &self.reason {
            out.push_str(&format!(" ({reason})"));
        }
        out
    }
}

fn fmt_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}
