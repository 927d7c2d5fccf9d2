// src/adapter/coordinator.rs
// Wires the evaluation engine to its triggers: the periodic batch tick and
// trade-closure events.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::{interval, Duration};

use crate::application::dto::EvaluationOutcome;
use crate::application::usecase::RiskEvaluationUseCase;
use crate::config::SchedulerConfig;
use crate::domain::errors::AppResult;
use crate::infrastructure::store::MemoryStore;

pub struct RiskCoordinator {
    evaluator: Arc<dyn RiskEvaluationUseCase>,
    store: Arc<MemoryStore>,
    evaluation_interval_secs: u64,
}

impl RiskCoordinator {
    pub fn new(
        evaluator: Arc<dyn RiskEvaluationUseCase>,
        store: Arc<MemoryStore>,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            evaluator,
            store,
            evaluation_interval_secs: scheduler.evaluation_interval_secs,
        }
    }

    /// One batch evaluation of all active accounts, with a summary log line.
    pub async fn run_once(&self) -> AppResult<Vec<EvaluationOutcome>> {
        let results = self.evaluator.evaluate_all_active_accounts().await?;

        let mut accounts: Vec<i64> = results.iter().map(|r| r.account_id).collect();
        accounts.sort_unstable();
        accounts.dedup();

        log::info!(
            "periodic risk evaluation completed: {} accounts with violations, {} violations found",
            accounts.len(),
            results.len()
        );

        Ok(results)
    }

    /// Periodic evaluation loop. Runs until the task is aborted.
    pub async fn run_periodic(self: Arc<Self>) {
        let mut ticker = interval(Duration::from_secs(self.evaluation_interval_secs));
        // The first tick fires immediately; skip it, the caller already ran
        // a startup evaluation.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                log::error!("periodic risk evaluation failed: {}", e);
            }
        }
    }

    /// Trade-closure event hook: transition the trade to closed, then
    /// evaluate every active rule against it.
    pub async fn handle_trade_closed(
        &self,
        trade_id: i64,
        close_price: Decimal,
    ) -> AppResult<Vec<EvaluationOutcome>> {
        let trade = self.store.close_trade(trade_id, close_price, Utc::now()).await?;
        log::debug!(
            "trade {} closed at {} after {:?}s",
            trade.id,
            close_price,
            trade.duration_seconds()
        );

        self.evaluator.evaluate_trade(trade.id).await
    }
}
