use crate::config::DetectorConfig;
use crate::engine::pending::{PendingOutcome, PendingSlot};
use crate::engine::state::{InstrumentPhaseState, Transition};
use crate::models::bar::Bar;
use crate::models::phase::{PhaseEvent, PhaseEventKind};
use crate::signals::accumulation::classify_accumulation;
use crate::signals::breakout::detect_breakout;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Everything the per-bar step mutates for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub symbol: String,
    pub phase: InstrumentPhaseState,
    pub pending: PendingSlot,
}

impl RuntimeState {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }
}

/// One evaluation for the bar that opened at `now`, with `window` ending at
/// that bar. The only per-bar entry point, shared by live feeding and replay.
///
/// Order: BREAKOUT expiry, then the pending candidate (confirm, kill or
/// expire), then a new strict candidate, then the ACCUM/NONE classifier.
pub fn step(rt: &mut RuntimeState, window: &[Bar], now: i64, config: &DetectorConfig) -> Vec<PhaseEvent> {
    let params = &config.phase;
    let bar_ms = config.bar_ms();
    let mut events = Vec::new();
    rt.phase.last_seen_time = Some(now);

    if let Some(t) = rt.phase.expire_breakout(now, params.breakout_expire_bars * bar_ms) {
        events.push(transition_event(&rt.symbol, t, now));
    }

    match rt.pending.evaluate(window, now, bar_ms, params) {
        None => {}
        Some(PendingOutcome::Waiting) => return events,
        Some(PendingOutcome::Confirmed { candidate, trap }) => {
            let t = rt.phase.confirm_breakout(now);
            let duration = match t {
                Transition::BreakoutConfirmed { duration_ms } => duration_ms,
                _ => None,
            };
            events.push(
                PhaseEvent::new(&rt.symbol, PhaseEventKind::BreakoutConfirmed, now)
                    .anchor(candidate.breakout_open_time)
                    .score(candidate.score)
                    .trap_score(trap.score)
                    .duration(duration)
                    .reason(trap.describe()),
            );
            return events;
        }
        Some(PendingOutcome::Killed { candidate, trap }) => {
            events.push(
                PhaseEvent::new(&rt.symbol, PhaseEventKind::TrapKill, now)
                    .anchor(candidate.breakout_open_time)
                    .score(candidate.score)
                    .trap_score(trap.score)
                    .reason(trap.describe()),
            );
            return events;
        }
        Some(PendingOutcome::Expired { candidate, reason }) => {
            events.push(
                PhaseEvent::new(&rt.symbol, PhaseEventKind::PendingExpire, now)
                    .anchor(candidate.breakout_open_time)
                    .score(candidate.score)
                    .reason(reason),
            );
        }
    }

    match detect_breakout(window, &config.silent, &config.breakout) {
        Ok(signal) => {
            if let Some(c) = rt.pending.offer(&signal, now, params.score_min) {
                debug!(
                    "{} candidate: score={:.1} top={} vol={:.2}x buy={:.3}",
                    rt.symbol, c.score, c.box_top, signal.vol_ratio, signal.buy_ratio
                );
                events.push(
                    PhaseEvent::new(&rt.symbol, PhaseEventKind::PendingCreate, now)
                        .anchor(c.breakout_open_time)
                        .score(c.score),
                );
                return events;
            }
        }
        Err(r) => trace!("{} no breakout: {r}", rt.symbol),
    }

    match classify_accumulation(window, &config.silent, &config.accum, config.breakout.break_eps) {
        Ok(accum) => {
            if let Some(t) = rt.phase.observe_accum(accum.start_time) {
                events.push(transition_event(&rt.symbol, t, now).score(accum.signal.buy_ratio * 100.0));
            }
        }
        // not enough bars is no observation at all
        Err(r) if r.is_insufficient_data() => {}
        Err(r) => {
            if let Some(t) = rt.phase.observe_no_accum(now, params.exit_confirm) {
                events.push(transition_event(&rt.symbol, t, now).reason(r.code()));
            }
        }
    }

    events
}

fn transition_event(symbol: &str, t: Transition, now: i64) -> PhaseEvent {
    match t {
        Transition::AccumStarted { start_time } => {
            PhaseEvent::new(symbol, PhaseEventKind::AccumStart, now).anchor(start_time)
        }
        Transition::AccumEnded { duration_ms } => {
            PhaseEvent::new(symbol, PhaseEventKind::AccumEnd, now).duration(Some(duration_ms))
        }
        Transition::BreakoutConfirmed { duration_ms } => {
            PhaseEvent::new(symbol, PhaseEventKind::BreakoutConfirmed, now).duration(duration_ms)
        }
        Transition::BreakoutExpired => PhaseEvent::new(symbol, PhaseEventKind::BreakoutExpire, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat_series, scenario, BAR_MS};
    use crate::models::phase::{BreakoutCandidate, Phase};

    fn run(bars: &[Bar], rt: &mut RuntimeState) -> Vec<PhaseEvent> {
        let config = DetectorConfig::default();
        let mut out = Vec::new();
        for i in 60..bars.len() {
            out.extend(step(rt, &bars[..=i], bars[i].open_time, &config));
        }
        out
    }

    #[test]
    fn test_step_records_last_seen() {
        let bars = scenario(80);
        let mut rt = RuntimeState::new("BTCUSDT");
        step(&mut rt, &bars, bars[79].open_time, &DetectorConfig::default());
        assert_eq!(rt.phase.last_seen_time, Some(79 * BAR_MS));
        assert_eq!(rt.phase.phase, Phase::None);
    }

    #[test]
    fn test_waiting_candidate_blocks_classification() {
        let bars = scenario(232);
        let mut rt = RuntimeState::new("BTCUSDT");
        rt.pending.candidate = Some(BreakoutCandidate {
            created_time: 231 * BAR_MS,
            breakout_open_time: 230 * BAR_MS,
            box_top: 100.2,
            break_eps: 0.003,
            score: 75.0,
        });
        let events = step(&mut rt, &bars, 231 * BAR_MS, &DetectorConfig::default());
        assert!(events.is_empty());
        assert!(rt.pending.is_pending());
    }

    #[test]
    fn test_short_window_leaves_exit_streak_alone() {
        let config = DetectorConfig::default();
        let mut rt = RuntimeState::new("BTCUSDT");
        rt.phase.observe_accum(0);
        rt.phase.exit_bad_count = 1;

        // too few bars for the classifier: no observation
        let short = flat_series(70);
        assert!(step(&mut rt, &short, 69 * BAR_MS, &config).is_empty());
        assert_eq!(rt.phase.exit_bad_count, 1);

        // silent run reaches the last bar, nothing after it to validate
        let bars = flat_series(122);
        assert!(step(&mut rt, &bars[..121], 120 * BAR_MS, &config).is_empty());
        assert_eq!(rt.phase.exit_bad_count, 2);

        let events = step(&mut rt, &bars, 121 * BAR_MS, &config);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, PhaseEventKind::AccumEnd);
        assert_eq!(events[0].reason.as_deref(), Some("too_short"));
        assert_eq!(events[0].accumulated_duration_ms, Some(121 * BAR_MS));
        assert_eq!(rt.phase.phase, Phase::None);
    }

    #[test]
    fn test_scenario_event_order() {
        let bars = scenario(240);
        let mut rt = RuntimeState::new("BTCUSDT");
        let events = run(&bars, &mut rt);
        let kinds: Vec<PhaseEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PhaseEventKind::AccumStart,
                PhaseEventKind::PendingCreate,
                PhaseEventKind::BreakoutConfirmed,
            ]
        );
        assert_eq!(events[1].anchor_time, Some(230 * BAR_MS));
        assert_eq!(events[2].time, 232 * BAR_MS);
        assert_eq!(rt.phase.phase, Phase::Breakout);
        assert_eq!(rt.pending.consumed_through, Some(230 * BAR_MS));
    }
}
