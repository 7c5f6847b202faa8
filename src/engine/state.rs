use crate::models::phase::Phase;
use serde::{Deserialize, Serialize};

/// Phase of one instrument. Driven only by bar timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPhaseState {
    pub phase: Phase,
    pub accum_start_time: Option<i64>,
    pub exit_bad_count: u32, // consecutive non-ACCUM observations while in ACCUM
    pub breakout_time: Option<i64>,
    pub last_seen_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    AccumStarted { start_time: i64 },
    AccumEnded { duration_ms: i64 },
    /// Duration is only known when confirming out of ACCUM.
    BreakoutConfirmed { duration_ms: Option<i64> },
    BreakoutExpired,
}

impl InstrumentPhaseState {
    /// The classifier saw accumulation starting at `start_time`.
    pub fn observe_accum(&mut self, start_time: i64) -> Option<Transition> {
        self.exit_bad_count = 0;
        if self.phase == Phase::Accum {
            return None;
        }
        self.phase = Phase::Accum;
        self.accum_start_time = Some(start_time);
        self.breakout_time = None;
        Some(Transition::AccumStarted { start_time })
    }

    /// The classifier saw no accumulation. ACCUM only ends after
    /// `exit_confirm` of these in a row.
    pub fn observe_no_accum(&mut self, now: i64, exit_confirm: u32) -> Option<Transition> {
        if self.phase != Phase::Accum {
            return None;
        }
        self.exit_bad_count += 1;
        if self.exit_bad_count < exit_confirm {
            return None;
        }
        let duration_ms = now - self.accum_start_time.unwrap_or(now);
        self.phase = Phase::None;
        self.accum_start_time = None;
        self.exit_bad_count = 0;
        Some(Transition::AccumEnded { duration_ms })
    }

    /// A pending candidate passed confirmation at bar time `now`.
    pub fn confirm_breakout(&mut self, now: i64) -> Transition {
        let duration_ms = match self.phase {
            Phase::Accum => self.accum_start_time.map(|start| now - start),
            _ => None,
        };
        self.phase = Phase::Breakout;
        self.breakout_time = Some(now);
        self.accum_start_time = None;
        self.exit_bad_count = 0;
        Transition::BreakoutConfirmed { duration_ms }
    }

    /// BREAKOUT falls back to NONE once `expire_after_ms` has passed since
    /// confirmation.
    pub fn expire_breakout(&mut self, now: i64, expire_after_ms: i64) -> Option<Transition> {
        if self.phase != Phase::Breakout {
            return None;
        }
        let confirmed = self.breakout_time?;
        if now - confirmed < expire_after_ms {
            return None;
        }
        self.phase = Phase::None;
        self.breakout_time = None;
        Some(Transition::BreakoutExpired)
    }
}
