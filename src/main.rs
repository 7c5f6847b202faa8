use boxwatch::config::Config;
use boxwatch::feeds::binance::BinanceKlineClient;
use boxwatch::feeds::provider::KlineProvider;
use boxwatch::feeds::rate_limiter::QpsLimiter;
use boxwatch::monitor::Monitor;
use boxwatch::telemetry::alerts::AlertManager;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load and validate config (reads .env automatically)
    let config = Config::load_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.telemetry.log_level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("================================================");
    info!("  BOXWATCH v{}", env!("CARGO_PKG_VERSION"));
    info!("  Quiet accumulation -> box breakout monitor");
    info!("================================================");

    if let Err(e) = config.validate() {
        error!("Config validation failed: {e}");
        return Err(e);
    }

    // === Initialize components ===

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let limiter = Arc::new(QpsLimiter::new(config.monitor.max_qps));
    let provider: Arc<dyn KlineProvider> =
        Arc::new(BinanceKlineClient::new(config.binance.clone(), limiter.clone())?);
    let alerts = Arc::new(AlertManager::new(config.telemetry.clone()));
    let monitor = Arc::new(Monitor::new(&config, provider.clone(), alerts.clone()));

    let symbols = if config.monitor.symbols.is_empty() {
        let all = provider.trading_symbols().await?;
        info!("No SYMBOLS configured, watching all {} USDT perpetuals", all.len());
        all
    } else {
        config.monitor.symbols.clone()
    };
    anyhow::ensure!(!symbols.is_empty(), "no symbols to watch");

    info!("--- Detector configuration ---");
    info!("  Interval:        {}", config.detector.interval);
    info!("  Score min:       {}", config.detector.phase.score_min);
    info!("  Trap max:        {}", config.detector.phase.trap_max);
    info!("  Confirm bars:    {}", config.detector.phase.confirm_bars);
    info!("  Pending TTL:     {} bars", config.detector.phase.pending_ttl_bars);
    info!("  Exit confirm:    {} bars", config.detector.phase.exit_confirm);
    info!("--- Monitor configuration ---");
    info!("  Symbols:         {}", symbols.len());
    info!("  Poll every:      {}s", config.monitor.poll_interval_secs);
    info!("  Workers:         {}", config.monitor.max_workers);
    info!("  Max QPS:         {}", config.monitor.max_qps);

    // === Warm up from history ===
    let warm_events = monitor.warm_up(&symbols).await;
    info!(
        "Warm-up replayed {} historical events across {} symbols",
        warm_events.len(),
        monitor.registry().len()
    );
    for (symbol, phase) in monitor.registry().phases() {
        info!("  {symbol}: {phase}");
    }

    // === Spawn polling loop ===
    {
        let monitor = monitor.clone();
        let symbols = Arc::new(symbols);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let period = tokio::time::Duration::from_secs(config.monitor.poll_interval_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // warm-up just ran

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        // rounds run detached so a slow one is skipped, not queued
                        let m = monitor.clone();
                        let syms = symbols.clone();
                        tokio::spawn(async move {
                            if m.run_round(&syms).await.is_none() {
                                warn!("Round skipped: previous round still in flight");
                            }
                        });
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
    }

    info!("=== BOXWATCH running ===");
    info!("Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    let _ = shutdown_tx.send(());

    for (symbol, phase) in monitor.registry().phases() {
        info!("  {symbol}: {phase}");
    }
    info!("BOXWATCH shutdown complete.");
    Ok(())
}
