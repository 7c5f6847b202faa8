use crate::config::{Config, DetectorConfig, MonitorConfig};
use crate::engine::registry::RuntimeRegistry;
use crate::engine::replay::replay;
use crate::feeds::provider::{FeedError, KlineProvider};
use crate::models::phase::PhaseEvent;
use crate::telemetry::alerts::AlertManager;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Live evaluation driver: warm-up, polling rounds, alert delivery.
///
/// Instruments are evaluated on a bounded worker pool. A failing fetch only
/// skips that instrument for the round.
pub struct Monitor {
    config: MonitorConfig,
    detector: DetectorConfig,
    provider: Arc<dyn KlineProvider>,
    registry: RuntimeRegistry,
    alerts: Arc<AlertManager>,
    round_lock: Mutex<()>,
    running: AtomicBool,
    rounds: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub evaluated: usize,
    pub failed: usize,
    pub events: Vec<PhaseEvent>,
}

/// Marks a round as running until dropped.
struct RoundGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    running: &'a AtomicBool,
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Monitor {
    pub fn new(config: &Config, provider: Arc<dyn KlineProvider>, alerts: Arc<AlertManager>) -> Self {
        Self {
            config: config.monitor.clone(),
            detector: config.detector.clone(),
            provider,
            registry: RuntimeRegistry::new(),
            alerts,
            round_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            rounds: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }

    fn warmup_start(&self) -> i64 {
        Utc::now().timestamp_millis() - self.config.warmup_hours as i64 * 3_600_000
    }

    /// Rebuilds state for each symbol by replaying recent history. Events
    /// from the replay are returned for inspection, not alerted.
    pub async fn warm_up(&self, symbols: &[String]) -> Vec<PhaseEvent> {
        let workers = self.config.max_workers.max(1);
        let results: Vec<(String, Result<Vec<PhaseEvent>, FeedError>)> = stream::iter(symbols.to_vec())
            .map(|symbol| async move {
                let result = self.warm_symbol(&symbol).await;
                (symbol, result)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut events = Vec::new();
        let mut ok = 0;
        for (symbol, result) in results {
            match result {
                Ok(evs) => {
                    ok += 1;
                    events.extend(evs);
                }
                Err(e) => warn!("{symbol} warm-up failed: {e}"),
            }
        }
        info!("Warm-up done: {ok}/{} symbols", symbols.len());
        events.sort_by(|a, b| (&a.symbol, a.time).cmp(&(&b.symbol, b.time)));
        events
    }

    async fn warm_symbol(&self, symbol: &str) -> Result<Vec<PhaseEvent>, FeedError> {
        let bars = self
            .provider
            .fetch_klines(symbol, self.detector.interval, self.warmup_start())
            .await?;
        let outcome = replay(symbol, &bars, &self.detector);
        for e in &outcome.events {
            debug!("warm-up {}", e.summary());
        }
        self.registry.insert(outcome.runtime);
        Ok(outcome.events)
    }

    /// One evaluation pass over `symbols`. Returns `None` when the previous
    /// round is still in flight.
    pub async fn run_round(&self, symbols: &[String]) -> Option<RoundReport> {
        let Ok(lock) = self.round_lock.try_lock() else {
            warn!("Previous round still running, skipping");
            return None;
        };
        self.running.store(true, Ordering::SeqCst);
        let _guard = RoundGuard {
            _lock: lock,
            running: &self.running,
        };

        let workers = self.config.max_workers.max(1);
        // owned symbols keep the round future Send for tokio::spawn
        let results: Vec<(String, Result<Vec<PhaseEvent>, FeedError>)> = stream::iter(symbols.to_vec())
            .map(|symbol| async move {
                let result = self.evaluate_symbol(&symbol).await;
                if let Ok(events) = &result {
                    for e in events {
                        info!("{}", e.summary());
                        self.alerts.on_phase_event(e).await;
                    }
                }
                (symbol, result)
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut report = RoundReport {
            evaluated: results.len(),
            ..Default::default()
        };
        for (symbol, result) in results {
            match result {
                Ok(events) => report.events.extend(events),
                Err(e) => {
                    warn!("{symbol} skipped this round: {e}");
                    report.failed += 1;
                }
            }
        }
        report
            .events
            .sort_by(|a, b| (&a.symbol, a.time).cmp(&(&b.symbol, b.time)));

        if report.evaluated > 0 && report.failed == report.evaluated {
            self.alerts
                .on_error(&format!("all {} kline fetches failed", report.failed))
                .await;
        }

        let n = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Round {n}: {} evaluated, {} failed, {} events",
            report.evaluated,
            report.failed,
            report.events.len()
        );
        Some(report)
    }

    /// Fetch bars newer than the last one held and feed them through the
    /// runtime. Unknown symbols are warmed up first.
    async fn evaluate_symbol(&self, symbol: &str) -> Result<Vec<PhaseEvent>, FeedError> {
        if !self.registry.contains(symbol) {
            self.warm_symbol(symbol).await?;
            return Ok(Vec::new());
        }
        let start = self
            .registry
            .last_seen(symbol)
            .map_or_else(|| self.warmup_start(), |t| t + 1);

        // fetch outside the registry; the entry is only locked below
        let bars = self
            .provider
            .fetch_klines(symbol, self.detector.interval, start)
            .await?;

        let detector = &self.detector;
        let events = self
            .registry
            .with_runtime(symbol, |rt| {
                bars.into_iter()
                    .flat_map(|bar| rt.on_bar(bar, detector))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelemetryConfig;
    use crate::fixtures::{scenario, BAR_MS};
    use crate::models::bar::{Bar, KlineInterval};
    use crate::models::phase::{Phase, PhaseEventKind};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Serves the first `visible` bars of each series.
    struct MockProvider {
        series: HashMap<String, Vec<Bar>>,
        failing: HashSet<String>,
        visible: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockProvider {
        fn new(series: HashMap<String, Vec<Bar>>, visible: usize) -> Self {
            Self {
                series,
                failing: HashSet::new(),
                visible: AtomicUsize::new(visible),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl KlineProvider for MockProvider {
        async fn fetch_klines(
            &self,
            symbol: &str,
            _interval: KlineInterval,
            start_time: i64,
        ) -> Result<Vec<Bar>, FeedError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.failing.contains(symbol) {
                return Err(FeedError::Status {
                    endpoint: "/fapi/v1/klines".into(),
                    status: 500,
                    body: "boom".into(),
                });
            }
            let visible = self.visible.load(Ordering::SeqCst);
            Ok(self
                .series
                .get(symbol)
                .map(|bars| {
                    bars.iter()
                        .take(visible)
                        .filter(|b| b.open_time >= start_time)
                        .copied()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn trading_symbols(&self) -> Result<Vec<String>, FeedError> {
            let mut symbols: Vec<String> = self.series.keys().cloned().collect();
            symbols.sort();
            Ok(symbols)
        }
    }

    /// The shared scenario moved to end shortly before now.
    fn recent_scenario() -> Vec<Bar> {
        let now = Utc::now().timestamp_millis();
        let base = (now / BAR_MS - 400) * BAR_MS;
        scenario(300)
            .into_iter()
            .map(|mut b| {
                b.open_time += base;
                b.close_time += base;
                b
            })
            .collect()
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.monitor.warmup_hours = 48;
        config.monitor.max_workers = 4;
        config
    }

    fn monitor_with(provider: Arc<MockProvider>) -> Monitor {
        Monitor::new(
            &test_config(),
            provider,
            Arc::new(AlertManager::new(TelemetryConfig::default())),
        )
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_provider_failure_only_skips_that_symbol() {
        let bars = recent_scenario();
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), bars.clone());
        series.insert("ETHUSDT".to_string(), bars);
        let mut provider = MockProvider::new(series, 300);
        provider.failing.insert("ETHUSDT".to_string());
        let monitor = monitor_with(Arc::new(provider));

        let report = monitor.run_round(&symbols(&["BTCUSDT", "ETHUSDT"])).await.unwrap();
        assert_eq!(report.evaluated, 2);
        assert_eq!(report.failed, 1);
        assert!(monitor.registry().contains("BTCUSDT"));
        assert!(!monitor.registry().contains("ETHUSDT"));
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_live_rounds_match_replay() {
        let bars = recent_scenario();
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), bars.clone());
        let provider = Arc::new(MockProvider::new(series, 200));
        let monitor = monitor_with(provider.clone());
        let syms = symbols(&["BTCUSDT"]);

        let mut live = monitor.warm_up(&syms).await;
        let mut visible = 200;
        while visible < 300 {
            visible = (visible + 7).min(300);
            provider.visible.store(visible, Ordering::SeqCst);
            live.extend(monitor.run_round(&syms).await.unwrap().events);
        }

        let expected = replay("BTCUSDT", &bars, &test_config().detector).events;
        assert_eq!(live, expected);
        assert!(live.iter().any(|e| e.kind == PhaseEventKind::BreakoutConfirmed));
        assert_eq!(monitor.registry().phase("BTCUSDT"), Some(Phase::None));
        assert_eq!(monitor.rounds_completed(), 15);
    }

    #[tokio::test]
    async fn test_rounds_run_on_spawned_tasks() {
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), recent_scenario());
        let monitor = Arc::new(monitor_with(Arc::new(MockProvider::new(series, 250))));
        let syms = Arc::new(symbols(&["BTCUSDT"]));

        let (m, s) = (monitor.clone(), syms.clone());
        let warmed = tokio::spawn(async move { m.warm_up(&s).await }).await.unwrap();
        assert!(warmed.iter().any(|e| e.kind == PhaseEventKind::AccumStart));

        let (m, s) = (monitor.clone(), syms.clone());
        let report = tokio::spawn(async move { m.run_round(&s).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(monitor.rounds_completed(), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_round_is_skipped() {
        let mut series = HashMap::new();
        series.insert("BTCUSDT".to_string(), recent_scenario());
        let mut provider = MockProvider::new(series, 300);
        provider.delay = Some(Duration::from_secs(5));
        let monitor = monitor_with(Arc::new(provider));
        let syms = symbols(&["BTCUSDT"]);

        let (first, second) = tokio::join!(monitor.run_round(&syms), async {
            tokio::task::yield_now().await;
            monitor.run_round(&syms).await
        });
        assert!(first.is_some());
        assert!(second.is_none());
        assert!(monitor.run_round(&syms).await.is_some());
    }
}
