use crate::config::DetectorConfig;
use crate::engine::step::{step, RuntimeState};
use crate::models::bar::{bars_closed_by, Bar};
use crate::models::phase::{Phase, PhaseEvent};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Per-instrument runtime: phase state plus a bounded bar history.
///
/// Live polling and replay both feed bars through `on_bar`, so given the same
/// bars in the same order they end in the same state with the same events.
#[derive(Debug, Clone)]
pub struct SymbolRuntime {
    pub state: RuntimeState,
    history: VecDeque<Bar>,
}

impl SymbolRuntime {
    pub fn new(symbol: &str) -> Self {
        Self {
            state: RuntimeState::new(symbol),
            history: VecDeque::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.state.symbol
    }

    pub fn phase(&self) -> Phase {
        self.state.phase.phase
    }

    /// Open time of the newest bar held.
    pub fn last_seen(&self) -> Option<i64> {
        self.history.back().map(|b| b.open_time)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Ingest one closed bar and evaluate it.
    ///
    /// Bars not strictly newer than the last one held are dropped, so an
    /// open time appears at most once in the history.
    pub fn on_bar(&mut self, bar: Bar, config: &DetectorConfig) -> Vec<PhaseEvent> {
        if let Some(last) = self.last_seen() {
            if bar.open_time <= last {
                debug!("{} dropping stale bar {} (last {last})", self.state.symbol, bar.open_time);
                return Vec::new();
            }
        }
        self.history.push_back(bar);

        let horizon = bar.open_time - config.phase.lookback_bars as i64 * config.bar_ms();
        while self.history.front().is_some_and(|b| b.open_time <= horizon) {
            self.history.pop_front();
        }

        if self.history.len() < config.phase.min_view_bars {
            return Vec::new();
        }
        let window = self.history.make_contiguous();
        step(&mut self.state, window, bar.open_time, config)
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub runtime: SymbolRuntime,
    pub events: Vec<PhaseEvent>,
}

/// Walks `bars` forward through a fresh runtime. Used for warm-up at start
/// and for offline backtests.
pub fn replay(symbol: &str, bars: &[Bar], config: &DetectorConfig) -> ReplayOutcome {
    let mut runtime = SymbolRuntime::new(symbol);
    let mut events = Vec::new();
    for bar in bars {
        events.extend(runtime.on_bar(*bar, config));
    }
    info!(
        "{symbol} replayed {} bars: {} events, phase {}",
        bars.len(),
        events.len(),
        runtime.phase()
    );
    ReplayOutcome { runtime, events }
}

/// Replay only the bars closed at or before `t_ms`.
pub fn replay_until(symbol: &str, bars: &[Bar], t_ms: i64, config: &DetectorConfig) -> ReplayOutcome {
    replay(symbol, bars_closed_by(bars, t_ms), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{flat_bar, flat_series, scenario, BAR_MS};

    #[test]
    fn test_duplicate_and_stale_bars_are_dropped() {
        let config = DetectorConfig::default();
        let mut rt = SymbolRuntime::new("BTCUSDT");
        rt.on_bar(flat_bar(0), &config);
        rt.on_bar(flat_bar(1), &config);
        rt.on_bar(flat_bar(1), &config);
        rt.on_bar(flat_bar(0), &config);
        assert_eq!(rt.history_len(), 2);
        assert_eq!(rt.last_seen(), Some(BAR_MS));
    }

    #[test]
    fn test_history_is_bounded_by_time() {
        let mut config = DetectorConfig::default();
        config.phase.lookback_bars = 100;
        let out = replay("BTCUSDT", &flat_series(250), &config);
        assert_eq!(out.runtime.history_len(), 100);
    }

    #[test]
    fn test_no_evaluation_below_min_view() {
        let config = DetectorConfig::default();
        let out = replay("BTCUSDT", &flat_series(59), &config);
        assert!(out.events.is_empty());
        assert_eq!(out.runtime.state.phase.last_seen_time, None);
        let out = replay("BTCUSDT", &flat_series(60), &config);
        assert_eq!(out.runtime.state.phase.last_seen_time, Some(59 * BAR_MS));
    }

    #[test]
    fn test_replay_until_cuts_at_close_time() {
        let config = DetectorConfig::default();
        let bars = scenario(300);
        let cut = replay_until("BTCUSDT", &bars, 231 * BAR_MS + BAR_MS - 1, &config);
        assert_eq!(cut.runtime.last_seen(), Some(231 * BAR_MS));
        assert_eq!(cut.runtime.phase(), Phase::Accum);
        assert!(cut.runtime.state.pending.is_pending());
    }
}
