// src/application/usecase/evaluation_usecase.rs
// Risk rule evaluation orchestrator

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::application::dto::EvaluationOutcome;
use crate::application::usecase::action_usecase::ActionExecutor;
use crate::config::EngineConfig;
use crate::domain::errors::{AppError, AppResult, RepositoryError};
use crate::domain::models::{Account, RiskRule, RuleType, Trade};
use crate::domain::repository::{
    AccountRepository, EvaluationLockRepository, IncidentRepository, IncidentWrite, NewIncident,
    NotificationRepository, RuleRepository, TradeRepository,
};
use crate::domain::service::ViolationData;
use crate::infrastructure::rules::RuleHandlers;

/// Risk evaluation entry points. All three are synchronous, side-effecting
/// calls: they may create incidents and notifications and mutate account
/// state. Re-invocation is protected only by the cooldown windows.
#[async_trait]
pub trait RiskEvaluationUseCase: Send + Sync {
    /// Evaluate all active rules against one account (periodic context).
    async fn evaluate_account(&self, account_id: i64) -> AppResult<Vec<EvaluationOutcome>>;

    /// Evaluate all active rules against one trade (event context).
    /// No-op for trades that are still open.
    async fn evaluate_trade(&self, trade_id: i64) -> AppResult<Vec<EvaluationOutcome>>;

    /// Evaluate every account whose status and trading status are enabled,
    /// holding a short-lived per-account lock to keep overlapping batch runs
    /// off the same account.
    async fn evaluate_all_active_accounts(&self) -> AppResult<Vec<EvaluationOutcome>>;
}

pub struct RiskEvaluator {
    accounts: Arc<dyn AccountRepository>,
    trades: Arc<dyn TradeRepository>,
    rules: Arc<dyn RuleRepository>,
    incidents: Arc<dyn IncidentRepository>,
    locks: Arc<dyn EvaluationLockRepository>,
    handlers: RuleHandlers,
    actions: ActionExecutor,
    config: EngineConfig,
}

impl RiskEvaluator {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        trades: Arc<dyn TradeRepository>,
        rules: Arc<dyn RuleRepository>,
        incidents: Arc<dyn IncidentRepository>,
        notifications: Arc<dyn NotificationRepository>,
        locks: Arc<dyn EvaluationLockRepository>,
        config: EngineConfig,
    ) -> Self {
        let handlers = RuleHandlers::new(
            trades.clone(),
            incidents.clone(),
            config.duration_scan_window_hours,
        );
        let actions = ActionExecutor::new(rules.clone(), accounts.clone(), notifications);

        Self {
            accounts,
            trades,
            rules,
            incidents,
            locks,
            handlers,
            actions,
            config,
        }
    }

    /// Cooldown before the same rule may re-fire for the same key.
    fn cooldown_minutes(&self, rule_type: RuleType) -> i64 {
        match rule_type {
            RuleType::OpenTrades => self.config.open_trades_cooldown_minutes,
            _ => self.config.default_cooldown_minutes,
        }
    }

    /// The trade id an incident for this rule would carry. OPEN_TRADES is
    /// account-scoped and never references a trade.
    fn incident_trade_key(rule: &RiskRule, trade: Option<&Trade>) -> Option<i64> {
        match rule.rule_type {
            RuleType::OpenTrades => None,
            _ => trade.map(|t| t.id),
        }
    }

    async fn evaluate_account_inner(
        &self,
        account: &Account,
    ) -> AppResult<Vec<EvaluationOutcome>> {
        let mut results = Vec::new();
        let active_rules = self.rules.active_rules().await?;

        for rule in &active_rules {
            match self.evaluate_rule(rule, account, None).await {
                Ok(outcome) if outcome.violated => results.push(outcome),
                Ok(_) => {}
                // One rule failing aborts only that rule's incident for this
                // cycle; the remaining rules are still evaluated.
                Err(e) => {
                    log::error!(
                        "evaluation of rule {} failed for account {}: {}",
                        rule.id,
                        account.id,
                        e
                    );
                }
            }
        }

        Ok(results)
    }

    /// Evaluate one rule in account or trade mode. The duplicate guard runs
    /// before the strategy; it is a cheap advisory filter, the authoritative
    /// check lives inside the guarded insert.
    async fn evaluate_rule(
        &self,
        rule: &RiskRule,
        account: &Account,
        trade: Option<&Trade>,
    ) -> AppResult<EvaluationOutcome> {
        let now = Utc::now();
        let trade_key = Self::incident_trade_key(rule, trade);
        let cooldown_start = now - Duration::minutes(self.cooldown_minutes(rule.rule_type));

        if self
            .incidents
            .exists_recent(rule.id, account.id, trade_key, cooldown_start)
            .await?
        {
            log::debug!(
                "recent incident exists for rule {} on account {}, skipping",
                rule.id,
                account.id
            );
            return Ok(EvaluationOutcome::not_violated(
                rule,
                account,
                "recent incident inside cooldown window",
            ));
        }

        let strategy = self.handlers.strategy(rule.rule_type);
        let evaluation = match trade {
            Some(trade) => strategy.evaluate_for_trade(rule, trade, account, now).await,
            None => strategy.evaluate_for_account(rule, account, now).await,
        };

        match evaluation {
            Ok(Some(evidence)) => self.create_incident(rule, account, trade, evidence).await,
            Ok(None) => Ok(EvaluationOutcome::not_violated(rule, account, "")),
            // A misconfigured rule is informational, never fatal.
            Err(AppError::Rule(e)) => {
                log::warn!("rule {} not evaluated: {}", rule.id, e);
                Ok(EvaluationOutcome::not_violated(rule, account, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Materialize an incident for a violation and drive the rule's actions.
    /// The dedup re-check and the insert are one atomic step in the
    /// repository, closing the race left open by the advisory pre-check.
    async fn create_incident(
        &self,
        rule: &RiskRule,
        account: &Account,
        trade: Option<&Trade>,
        evidence: ViolationData,
    ) -> AppResult<EvaluationOutcome> {
        let now = Utc::now();
        let trade_key = Self::incident_trade_key(rule, trade);
        let dedup_since = now - Duration::minutes(self.cooldown_minutes(rule.rule_type));
        let count_since = now - Duration::hours(self.config.soft_rule_window_hours);

        let candidate = NewIncident {
            rule_id: rule.id,
            account_id: account.id,
            trade_id: trade_key,
            severity: rule.severity,
            description: generate_description(rule, Some(&evidence)),
        };

        let write = self
            .incidents
            .create_guarded(candidate, dedup_since, count_since)
            .await?;

        let (incident, recent_count) = match write {
            IncidentWrite::Duplicate => {
                log::warn!(
                    "duplicate incident detected in transaction for account {}, rule {}",
                    account.id,
                    rule.id
                );
                return Ok(EvaluationOutcome::not_violated(
                    rule,
                    account,
                    "duplicate incident detected",
                ));
            }
            IncidentWrite::Created {
                incident,
                recent_count,
            } => (incident, recent_count),
        };

        log::info!(
            "incident {} created (account: {}, rule: {}, type: {}, trade: {:?})",
            incident.id,
            account.id,
            rule.id,
            rule.rule_type,
            trade_key
        );

        let mut outcome = EvaluationOutcome {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type,
            severity: rule.severity,
            violated: true,
            message: String::new(),
            incident_id: Some(incident.id),
            incident_created: true,
            action_executed: false,
            trade_id: trade_key,
            account_id: account.id,
            account_login: account.login,
            created_at: Some(incident.created_at),
        };

        // Soft rules accumulate: below the threshold the incident is
        // recorded but no actions run yet.
        if rule.is_soft() {
            if let Some(threshold) = rule.incidents_before_action {
                if recent_count < threshold {
                    outcome.message = format!(
                        "incident created ({}/{} in {}h)",
                        recent_count, threshold, self.config.soft_rule_window_hours
                    );
                    return Ok(outcome);
                }
            }
        }

        outcome.action_executed = self.actions.execute_for_incident(rule, &incident).await?;
        outcome.message = "incident created and actions executed".to_string();
        Ok(outcome)
    }
}

#[async_trait]
impl RiskEvaluationUseCase for RiskEvaluator {
    async fn evaluate_account(&self, account_id: i64) -> AppResult<Vec<EvaluationOutcome>> {
        let account = self.accounts.find(account_id).await?.ok_or(
            AppError::Repository(RepositoryError::NotFound {
                entity: "account",
                id: account_id,
            }),
        )?;

        self.evaluate_account_inner(&account).await
    }

    async fn evaluate_trade(&self, trade_id: i64) -> AppResult<Vec<EvaluationOutcome>> {
        let trade = self.trades.find(trade_id).await?.ok_or(AppError::Repository(
            RepositoryError::NotFound {
                entity: "trade",
                id: trade_id,
            },
        ))?;

        // Only closed trades are evaluated.
        if !trade.is_closed() {
            return Ok(Vec::new());
        }

        let account = self.accounts.find(trade.account_id).await?.ok_or(
            AppError::Repository(RepositoryError::NotFound {
                entity: "account",
                id: trade.account_id,
            }),
        )?;

        let mut results = Vec::new();
        let active_rules = self.rules.active_rules().await?;

        for rule in &active_rules {
            match self.evaluate_rule(rule, &account, Some(&trade)).await {
                Ok(outcome) if outcome.violated => results.push(outcome),
                Ok(_) => {}
                Err(e) => {
                    log::error!(
                        "evaluation of rule {} failed for trade {}: {}",
                        rule.id,
                        trade.id,
                        e
                    );
                }
            }
        }

        Ok(results)
    }

    async fn evaluate_all_active_accounts(&self) -> AppResult<Vec<EvaluationOutcome>> {
        let mut results = Vec::new();
        let active_accounts = self.accounts.active_accounts().await?;
        let lock_ttl = std::time::Duration::from_secs(self.config.account_lock_ttl_secs);

        for account in &active_accounts {
            let lock_key = format!("account_evaluation_{}", account.id);

            if !self.locks.try_acquire(&lock_key, lock_ttl) {
                log::debug!("account {} is already being evaluated, skipping", account.id);
                continue;
            }

            let evaluation = self.evaluate_account_inner(account).await;
            self.locks.release(&lock_key);

            match evaluation {
                Ok(outcomes) => results.extend(outcomes),
                // Failure isolation: one account failing is logged and
                // omitted, the batch carries on.
                Err(e) => {
                    log::error!("evaluation failed for account {}: {}", account.id, e);
                }
            }
        }

        Ok(results)
    }
}

/// Render the incident description from the violation evidence. Missing or
/// mismatched evidence degrades to a generic message; this never fails.
fn generate_description(rule: &RiskRule, evidence: Option<&ViolationData>) -> String {
    match (rule.rule_type, evidence) {
        (
            RuleType::Duration,
            Some(ViolationData::Duration {
                duration_seconds,
                min_duration_seconds,
                ..
            }),
        ) => format!(
            "closed in {}s (minimum required: {}s)",
            duration_seconds, min_duration_seconds
        ),
        (
            RuleType::Volume,
            Some(ViolationData::Volume {
                current_volume,
                min_expected,
                max_expected,
                ..
            }),
        ) => format!(
            "volume {} out of range [{}, {}]",
            current_volume, min_expected, max_expected
        ),
        (
            RuleType::OpenTrades,
            Some(ViolationData::OpenTrades {
                current_count,
                time_window_minutes,
                min_allowed,
                max_allowed,
            }),
        ) => {
            if max_allowed.is_some_and(|max| *current_count as u32 > max) {
                format!(
                    "account has {} open trades in the last {} minutes (maximum allowed: {})",
                    current_count,
                    time_window_minutes,
                    max_allowed.unwrap_or_default()
                )
            } else if min_allowed.is_some_and(|min| (*current_count as u32) < min) {
                format!(
                    "account has {} open trades in the last {} minutes (minimum required: {})",
                    current_count,
                    time_window_minutes,
                    min_allowed.unwrap_or_default()
                )
            } else {
                format!("open trades rule violated: {} trades", current_count)
            }
        }
        _ => format!("rule violated: {}", rule.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AccountStatus, ActionType, NotificationStatus, RuleSeverity};
    use crate::infrastructure::lock::EvaluationLockTable;
    use crate::infrastructure::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn evaluator(store: &Arc<MemoryStore>) -> RiskEvaluator {
        RiskEvaluator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(EvaluationLockTable::new()),
            EngineConfig::default(),
        )
    }

    fn duration_rule(min_seconds: i64, severity: RuleSeverity) -> RiskRule {
        let mut rule = RiskRule::new("fast trade", RuleType::Duration, severity);
        rule.min_duration_seconds = Some(min_seconds);
        rule
    }

    #[tokio::test]
    async fn hard_duration_rule_fires_actions_and_disables_trading() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002001, true, true).await;
        let rule = store
            .insert_rule(duration_rule(60, RuleSeverity::Hard))
            .await;
        store.insert_action(rule.id, ActionType::Email, 1, None).await;
        store
            .insert_action(rule.id, ActionType::DisableTrading, 2, None)
            .await;

        let now = Utc::now();
        let trade = store
            .insert_closed_trade(account.id, dec!(2.5), now - Duration::seconds(45), now)
            .await;

        let results = evaluator(&store).evaluate_trade(trade.id).await.unwrap();

        assert_eq!(results.len(), 1);
        let outcome = &results[0];
        assert!(outcome.violated);
        assert!(outcome.incident_created);
        assert!(outcome.action_executed);
        assert_eq!(outcome.rule_id, rule.id);
        assert_eq!(outcome.trade_id, Some(trade.id));
        assert_eq!(outcome.account_login, 21002001);

        let incidents = store.incidents_for_account(account.id).await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].severity, RuleSeverity::Hard);
        assert_eq!(
            incidents[0].description,
            "closed in 45s (minimum required: 60s)"
        );

        let notifications = store.for_incident(incidents[0].id).await.unwrap();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].action_type, ActionType::Email);
        assert_eq!(notifications[0].status, NotificationStatus::Executed);
        assert_eq!(notifications[1].action_type, ActionType::DisableTrading);
        assert_eq!(notifications[1].status, NotificationStatus::Executed);

        let account = AccountRepository::find(store.as_ref(), account.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.trading_status, AccountStatus::Disable);
    }

    #[tokio::test]
    async fn evaluating_an_open_trade_is_a_noop() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002001, true, true).await;
        store
            .insert_rule(duration_rule(60, RuleSeverity::Hard))
            .await;
        let trade = store
            .insert_open_trade(account.id, dec!(1.0), Utc::now() - Duration::seconds(5))
            .await;

        let results = evaluator(&store).evaluate_trade(trade.id).await.unwrap();

        assert!(results.is_empty());
        assert!(store
            .incidents_for_account(account.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn soft_rule_accumulates_before_firing_actions() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002002, true, true).await;

        let mut rule = RiskRule::new("volume control", RuleType::Volume, RuleSeverity::Soft);
        rule.min_factor = Some(dec!(0.5));
        rule.max_factor = Some(dec!(2.0));
        rule.lookback_trades = Some(5);
        rule.incidents_before_action = Some(3);
        let rule = store.insert_rule(rule).await;
        store.insert_action(rule.id, ActionType::Email, 1, None).await;

        let now = Utc::now();
        for i in 0..5 {
            let close = now - Duration::hours(2) - Duration::minutes(i * 10);
            store
                .insert_closed_trade(account.id, dec!(1.0), close - Duration::minutes(30), close)
                .await;
        }

        let engine = evaluator(&store);
        let mut incident_ids = Vec::new();

        for i in 0..3u32 {
            let close = now - Duration::minutes(3 - i64::from(i));
            let trade = store
                .insert_closed_trade(
                    account.id,
                    dec!(50.0),
                    close - Duration::minutes(10),
                    close,
                )
                .await;

            let results = engine.evaluate_trade(trade.id).await.unwrap();
            assert_eq!(results.len(), 1);
            let outcome = &results[0];
            assert!(outcome.violated);
            assert!(outcome.incident_created);
            incident_ids.push(outcome.incident_id.unwrap());

            if i < 2 {
                assert!(!outcome.action_executed);
                assert!(outcome
                    .message
                    .contains(&format!("{}/3", i + 1)));
            } else {
                assert!(outcome.action_executed);
            }
        }

        // Actions fired only for the third incident.
        assert!(store.for_incident(incident_ids[0]).await.unwrap().is_empty());
        assert!(store.for_incident(incident_ids[1]).await.unwrap().is_empty());
        assert_eq!(store.for_incident(incident_ids[2]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cooldown_suppresses_refire_within_window() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002003, true, true).await;
        let rule = store
            .insert_rule(duration_rule(60, RuleSeverity::Hard))
            .await;

        let now = Utc::now();
        store
            .insert_closed_trade(account.id, dec!(1.0), now - Duration::seconds(40), now)
            .await;

        let engine = evaluator(&store);
        let first = engine.evaluate_account(account.id).await.unwrap();
        assert_eq!(first.len(), 1);

        // Second run inside the 10 minute cooldown: guard skips the rule.
        let second = engine.evaluate_account(account.id).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(
            store.incidents_for_account(account.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn elapsed_cooldown_allows_a_second_incident() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002003, true, true).await;
        let rule = store
            .insert_rule(duration_rule(60, RuleSeverity::Hard))
            .await;

        let now = Utc::now();
        store
            .insert_closed_trade(account.id, dec!(1.0), now - Duration::seconds(40), now)
            .await;

        // A prior account-mode incident just outside the cooldown window.
        store
            .insert_incident_at(
                NewIncident {
                    rule_id: rule.id,
                    account_id: account.id,
                    trade_id: None,
                    severity: rule.severity,
                    description: "closed in 40s (minimum required: 60s)".to_string(),
                },
                now - Duration::minutes(11),
            )
            .await;

        let results = evaluator(&store)
            .evaluate_account(account.id)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(
            store.incidents_for_account(account.id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn concurrent_evaluations_create_exactly_one_incident() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002004, true, true).await;
        store
            .insert_rule(duration_rule(60, RuleSeverity::Hard))
            .await;

        let now = Utc::now();
        let trade = store
            .insert_closed_trade(account.id, dec!(1.0), now - Duration::seconds(30), now)
            .await;

        let engine = evaluator(&store);
        let (a, b) = tokio::join!(engine.evaluate_trade(trade.id), engine.evaluate_trade(trade.id));

        let violated = a.unwrap().len() + b.unwrap().len();
        assert_eq!(violated, 1);
        assert_eq!(
            store.incidents_for_account(account.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn batch_evaluates_only_active_accounts_and_tags_results() {
        let store = Arc::new(MemoryStore::new());
        let active = store.insert_account(21002005, true, true).await;
        let disabled = store.insert_account(21002006, true, false).await;

        let mut rule = RiskRule::new("too many open", RuleType::OpenTrades, RuleSeverity::Hard);
        rule.time_window_minutes = Some(30);
        rule.max_open_trades = Some(2);
        store.insert_rule(rule).await;

        let now = Utc::now();
        for account_id in [active.id, disabled.id] {
            for i in 0..3 {
                store
                    .insert_open_trade(account_id, dec!(1.0), now - Duration::minutes(5 + i))
                    .await;
            }
        }

        let results = evaluator(&store)
            .evaluate_all_active_accounts()
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].account_id, active.id);
        assert_eq!(results[0].account_login, 21002005);
        // OPEN_TRADES incidents are account-scoped and carry no trade id.
        assert_eq!(results[0].trade_id, None);
    }

    #[tokio::test]
    async fn batch_skips_accounts_whose_lock_is_held() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002007, true, true).await;
        store
            .insert_rule(duration_rule(60, RuleSeverity::Hard))
            .await;

        let now = Utc::now();
        store
            .insert_closed_trade(account.id, dec!(1.0), now - Duration::seconds(30), now)
            .await;

        let locks = Arc::new(EvaluationLockTable::new());
        let engine = RiskEvaluator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            locks.clone(),
            EngineConfig::default(),
        );

        let lock_key = format!("account_evaluation_{}", account.id);
        assert!(locks.try_acquire(&lock_key, std::time::Duration::from_secs(60)));

        let results = engine.evaluate_all_active_accounts().await.unwrap();

        assert!(results.is_empty());
        assert!(store
            .incidents_for_account(account.id)
            .await
            .unwrap()
            .is_empty());
        // The foreign holder keeps the lock; a skipped account is not released.
        assert!(locks.is_held(&lock_key));
    }

    #[tokio::test]
    async fn misconfigured_rule_is_informational_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002008, true, true).await;

        // DURATION rule without its required parameter.
        let rule = RiskRule::new("fast trade", RuleType::Duration, RuleSeverity::Hard);
        store.insert_rule(rule).await;

        let now = Utc::now();
        let trade = store
            .insert_closed_trade(account.id, dec!(1.0), now - Duration::seconds(10), now)
            .await;

        let results = evaluator(&store).evaluate_trade(trade.id).await.unwrap();

        assert!(results.is_empty());
        assert!(store
            .incidents_for_account(account.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn description_degrades_on_missing_or_mismatched_evidence() {
        let rule = duration_rule(60, RuleSeverity::Hard);
        assert_eq!(
            generate_description(&rule, None),
            "rule violated: fast trade"
        );

        // Evidence from the wrong rule type falls back too.
        let mismatched = ViolationData::OpenTrades {
            current_count: 4,
            time_window_minutes: 30,
            min_allowed: None,
            max_allowed: Some(3),
        };
        assert_eq!(
            generate_description(&rule, Some(&mismatched)),
            "rule violated: fast trade"
        );
    }

    #[test]
    fn open_trades_description_names_the_breached_bound() {
        let mut rule = RiskRule::new("too many open", RuleType::OpenTrades, RuleSeverity::Soft);
        rule.time_window_minutes = Some(30);
        rule.max_open_trades = Some(3);

        let over_max = ViolationData::OpenTrades {
            current_count: 5,
            time_window_minutes: 30,
            min_allowed: None,
            max_allowed: Some(3),
        };
        assert_eq!(
            generate_description(&rule, Some(&over_max)),
            "account has 5 open trades in the last 30 minutes (maximum allowed: 3)"
        );

        let under_min = ViolationData::OpenTrades {
            current_count: 1,
            time_window_minutes: 30,
            min_allowed: Some(2),
            max_allowed: None,
        };
        assert_eq!(
            generate_description(&rule, Some(&under_min)),
            "account has 1 open trades in the last 30 minutes (minimum required: 2)"
        );
    }
}
