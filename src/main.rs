// src/main.rs
use adaptive_trader::config::AppConfig;
use adaptive_trader::connectors::spot::SpotClient;
use adaptive_trader::connectors::traits::ExchangeGateway;
use adaptive_trader::core::engine::TradingLoop;
use adaptive_trader::core::indicators::IndicatorSettings;
use adaptive_trader::core::shutdown;
use adaptive_trader::strategies::scalper::SimpleScalper;
use adaptive_trader::telemetry;
use adaptive_trader::types::EngineEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load Configuration
    let config = AppConfig::new()?;
    let _log_guard = telemetry::init(&config.logging)?;

    info!("========================================");
    info!("       ADAPTIVE TRADER - v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Target: {}", config.exchange.pair);
    info!(
        "Mode:   {}",
        if config.exchange.live_trading {
            "LIVE TRADING"
        } else {
            "PAPER TRADING"
        }
    );

    // 2. Initialize Components
    let indicators = IndicatorSettings::from(&config.adaptation);
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(SpotClient::new(&config.exchange, indicators)?);
    let provider = SimpleScalper::new(config.adaptation.long_ma_period, 0.02, 0.03);

    // 3. Shutdown + event channels
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Ctrl+C received, finishing current cycle");
                trigger.trigger();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(100);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(target: "events", ?event, "engine event");
        }
    });

    // 4. Run Engine
    let tick = config.engine.tick_interval();
    let engine = TradingLoop::bootstrap(config, gateway, provider, shutdown)
        .await?
        .with_events(event_tx);

    engine.run(tick).await;

    let status = engine.status().await;
    info!(
        cycles = status.cycle,
        open_positions = status.open_positions.len(),
        net_profit = %status.profit.net(),
        "Shutdown complete"
    );
    Ok(())
}
