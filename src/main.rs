// src/main.rs
use crate::config::{AppConfig, MarkSource};
use crate::connectors::oracle::HttpOracle;
use crate::connectors::user_state::HttpUserState;
use crate::connectors::wallet::PaperWallet;
use crate::core::classifier::RiskClassifier;
use crate::core::engine::TradingDesk;
use crate::core::ledger::PositionLedger;
use crate::core::settlement::SettlementPolicy;
use crate::core::sampler::PriceSampler;
use crate::core::session::Session;
use crate::storage::JsonFileStore;
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

mod config;
mod connectors;
mod core;
mod storage;
mod tui;
mod types;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let cfg = AppConfig::new().context("Failed to load configuration")?;

    // 2. Logging goes to a file; the terminal belongs to the dashboard.
    let file_appender =
        tracing_appender::rolling::daily(&cfg.logging.directory, &cfg.logging.file_prefix);
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    let level = cfg.logging.level_filter()?;
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_max_level(level)
        .init();

    let thresholds = cfg.risk.thresholds()?;
    info!(
        "Risk thresholds: low < {} <= medium < {} <= high (min {} samples)",
        thresholds.low_ceiling(),
        thresholds.medium_ceiling(),
        cfg.risk.min_samples
    );

    // 3. Initialize Components
    let session = Session::new(
        cfg.feed.window_capacity,
        RiskClassifier::new(thresholds, cfg.risk.min_samples),
        PositionLedger::new(SettlementPolicy::default()),
    )
    .shared();

    let oracle = HttpOracle::new(
        &cfg.feed.oracle_url,
        cfg.feed.request_timeout(),
        cfg.feed.fallback_on_error,
    )?;
    let wallet = Arc::new(PaperWallet::new(
        cfg.wallet.address.clone(),
        Duration::from_millis(cfg.wallet.write_latency_ms),
    ));
    let store = Arc::new(JsonFileStore::new(&cfg.storage.state_file));

    // 4. Create Channels
    let (ui_tx, ui_rx) = mpsc::channel(100);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    let sampler = PriceSampler::new(Arc::new(oracle), session.clone(), cfg.feed.poll_interval())
        .with_ui(ui_tx.clone());
    let mut desk = TradingDesk::new(session, sampler, wallet, store, ui_tx);
    if cfg.trading.mark_source == MarkSource::Oracle {
        let reader =
            HttpUserState::new(cfg.wallet.user_state_url.clone(), cfg.feed.request_timeout())?;
        desk = desk.with_oracle_marks(Arc::new(reader));
    }

    // 5. Run Desk
    let desk_task = tokio::spawn(async move {
        if let Err(e) = desk.run(cmd_rx).await {
            error!("Fatal Desk Error: {}", e);
        }
    });

    // Feed starts visible, like an open chart.
    cmd_tx
        .send(types::DeskCommand::SetFeedActive(true))
        .await
        .context("Desk exited before startup")?;

    let ui_result = tui::run(
        ui_rx,
        cmd_tx.clone(),
        cfg.trading.default_size,
        cfg.trading.size_step,
    )
    .await;

    let _ = cmd_tx.send(types::DeskCommand::Shutdown).await;
    if let Err(e) = desk_task.await {
        error!("Desk task panicked: {}", e);
    }

    ui_result
}
