// src/main.rs
use risk_control::adapter::RiskCoordinator;
use risk_control::application::usecase::RiskEvaluator;
use risk_control::config::Config;
use risk_control::domain::errors::AppResult;
use risk_control::infrastructure::seed::seed_demo_data;
use risk_control::infrastructure::{EvaluationLockTable, MemoryStore};

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting risk_control v{}", env!("CARGO_PKG_VERSION"));

    // In-memory store backing every repository seam, with demonstration data
    let store = Arc::new(MemoryStore::new());
    let accounts = seed_demo_data(&store).await?;

    let evaluator = Arc::new(RiskEvaluator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(EvaluationLockTable::new()),
        config.engine.clone(),
    ));

    let coordinator = Arc::new(RiskCoordinator::new(
        evaluator,
        store.clone(),
        config.scheduler.clone(),
    ));

    // One evaluation up front, before the periodic schedule takes over
    log::info!("Running initial risk evaluation...");
    let results = coordinator.run_once().await?;
    for outcome in &results {
        log::info!(
            "violation: account {} rule '{}' ({}) - {} [incident: {:?}, actions: {}]",
            outcome.account_login,
            outcome.rule_name,
            outcome.severity,
            outcome.message,
            outcome.incident_id,
            outcome.action_executed
        );
    }

    // Demonstrate the event path: a short-lived trade closing right now
    if let Some(account) = accounts.first() {
        let trade = store
            .insert_open_trade(account.id, dec!(1.0), Utc::now() - Duration::seconds(20))
            .await;

        log::info!("Closing trade {} to trigger event evaluation...", trade.id);
        let event_results = coordinator.handle_trade_closed(trade.id, dec!(150.55)).await?;
        for outcome in &event_results {
            log::info!(
                "violation: account {} rule '{}' ({}) - {}",
                outcome.account_login,
                outcome.rule_name,
                outcome.severity,
                outcome.message
            );
        }
    }

    // Periodic evaluation until shutdown
    log::info!(
        "Scheduling periodic evaluation every {} seconds",
        config.scheduler.evaluation_interval_secs
    );
    tokio::spawn(coordinator.clone().run_periodic());

    ctrl_c().await?;
    log::info!("Shutting down");

    Ok(())
}
