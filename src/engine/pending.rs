use crate::config::PhaseParams;
use crate::models::bar::Bar;
use crate::models::phase::BreakoutCandidate;
use crate::models::signal::{BreakoutSignal, TrapReport};
use crate::signals::trap::score_trap;
use serde::{Deserialize, Serialize};

/// Trap scoring looks at no more than this many bars after the breakout bar.
const TRAP_BARS: usize = 3;

/// Holds at most one breakout candidate per instrument.
///
/// `consumed_through` is the newest breakout bar already confirmed, killed or
/// expired; the strict detector keeps re-reporting the same anchor while it
/// sits in the window, and those repeats must not spawn new candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingSlot {
    pub candidate: Option<BreakoutCandidate>,
    pub consumed_through: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingOutcome {
    Waiting,
    Expired { candidate: BreakoutCandidate, reason: &'static str },
    Confirmed { candidate: BreakoutCandidate, trap: TrapReport },
    Killed { candidate: BreakoutCandidate, trap: TrapReport },
}

impl PendingSlot {
    pub fn is_pending(&self) -> bool {
        self.candidate.is_some()
    }

    /// Opens a candidate from a strict detection. Refused while another is
    /// pending, below `score_min`, or when the anchor was already consumed.
    pub fn offer(&mut self, signal: &BreakoutSignal, now: i64, score_min: f64) -> Option<BreakoutCandidate> {
        if self.candidate.is_some() || signal.score < score_min {
            return None;
        }
        if self
            .consumed_through
            .is_some_and(|t| signal.breakout_open_time <= t)
        {
            return None;
        }
        let candidate = BreakoutCandidate {
            created_time: now,
            breakout_open_time: signal.breakout_open_time,
            box_top: signal.price_box.top,
            break_eps: signal.break_eps,
            score: signal.score,
        };
        self.candidate = Some(candidate);
        Some(candidate)
    }

    /// Advances the pending candidate by one bar. `None` when nothing is
    /// pending.
    pub fn evaluate(
        &mut self,
        window: &[Bar],
        now: i64,
        bar_ms: i64,
        params: &PhaseParams,
    ) -> Option<PendingOutcome> {
        let candidate = self.candidate?;

        if now - candidate.created_time > params.pending_ttl_bars * bar_ms {
            self.resolve();
            return Some(PendingOutcome::Expired { candidate, reason: "ttl" });
        }

        // newest bars are at the back, scan from there
        let Some(idx) = window
            .iter()
            .rposition(|b| b.open_time == candidate.breakout_open_time)
        else {
            self.resolve();
            return Some(PendingOutcome::Expired { candidate, reason: "scrolled_out" });
        };

        let after = &window[idx + 1..];
        if after.len() < params.confirm_bars {
            return Some(PendingOutcome::Waiting);
        }
        let follow = &after[..after.len().min(TRAP_BARS)];
        let Ok(trap) = score_trap(follow, candidate.box_top, candidate.break_eps) else {
            return Some(PendingOutcome::Waiting);
        };

        if trap.back_into_box {
            self.resolve();
            return Some(PendingOutcome::Killed { candidate, trap });
        }

        let hold = candidate.hold_level();
        let hold_ok = follow.iter().take(2).all(|b| b.close > hold);
        if hold_ok && trap.score <= params.trap_max {
            self.resolve();
            return Some(PendingOutcome::Confirmed { candidate, trap });
        }
        Some(PendingOutcome::Waiting)
    }

    fn resolve(&mut self) {
        if let Some(c) = self.candidate.take() {
            let through = self
                .consumed_through
                .map_or(c.breakout_open_time, |t| t.max(c.breakout_open_time));
            self.consumed_through = Some(through);
        }
    }
}
