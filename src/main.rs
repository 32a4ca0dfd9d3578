//! FlowGen binary - runs a wall-clock synchronized session
//!
//! Loads configuration, starts a real-time flow and logs candle closes until
//! ctrl-c, then prints a JSON snapshot of the session tail.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use flowgen::config::AppConfig;
use flowgen::flow::{FlowGenerator, FlowObserver};
use flowgen::oracle::{PriceOracle, SeededOracle};
use flowgen::types::{CandleSet, Tick, Timeframe};

/// Logs a heartbeat every N ticks and every candle set at cycle end
struct LoggingObserver {
    ticks_seen: AtomicU64,
}

impl FlowObserver for LoggingObserver {
    fn on_tick(&self, tick: &Tick, candles: &CandleSet) {
        let seen = self.ticks_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % 120 == 0 {
            let minute = &candles[Timeframe::Min1.index()];
            info!(
                timestamp = tick.timestamp,
                price = tick.price,
                minute_open = minute.open,
                minute_high = minute.high,
                minute_low = minute.low,
                "tick heartbeat"
            );
        }
    }

    fn on_cycle_end(&self, tick: &Tick) {
        info!(timestamp = tick.timestamp, price = tick.price, "cycle complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("flowgen=info")),
        )
        .init();

    let app_config = AppConfig::load()?;
    let config = app_config.generator_config();
    info!(config = %config, "starting flowgen");

    let oracle: Arc<dyn PriceOracle> = Arc::new(SeededOracle::new());
    let flow = FlowGenerator::with_system_clock(oracle);

    flow.reset(config).await.context("session setup failed")?;
    info!(seed_hash = %flow.seed_digest().await?, "session ready");

    flow.set_observer(Arc::new(LoggingObserver {
        ticks_seen: AtomicU64::new(0),
    }))
    .await;
    flow.start_synchronized().await?;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");

    // Snapshot before stop: stop clears the observer, not the data, but the
    // tail is most useful from the moment the run halted.
    flow.stop().await;
    let snapshot = flow.snapshot(100, false).await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
