// src/infrastructure/rules/open_trades.rs
// Open trade count rule

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::errors::{AppResult, RuleError};
use crate::domain::models::{Account, RiskRule, Trade};
use crate::domain::repository::{IncidentRepository, TradeRepository};
use crate::domain::service::{RuleStrategy, ViolationData};

/// Flags accounts whose count of open trades inside a time window breaches
/// the configured minimum or maximum. Inherently account-scoped: trade-mode
/// evaluation delegates to account mode and its incidents never carry a
/// trade id.
pub struct OpenTradesRule {
    trades: Arc<dyn TradeRepository>,
    incidents: Arc<dyn IncidentRepository>,
}

impl OpenTradesRule {
    pub fn new(trades: Arc<dyn TradeRepository>, incidents: Arc<dyn IncidentRepository>) -> Self {
        Self { trades, incidents }
    }

    fn time_window(rule: &RiskRule) -> Result<i64, RuleError> {
        rule.time_window_minutes.ok_or(RuleError::MissingParameter {
            rule_id: rule.id,
            parameter: "time_window_minutes",
        })
    }

    async fn check_open_trades(
        &self,
        rule: &RiskRule,
        account: &Account,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        let since = now - Duration::minutes(window_minutes);
        let open_count = self
            .trades
            .count_open_trades_since(account.id, since)
            .await?;

        let above_max = rule
            .max_open_trades
            .is_some_and(|max| open_count as u32 > max);
        let below_min = rule
            .min_open_trades
            .is_some_and(|min| (open_count as u32) < min);

        if above_max || below_min {
            return Ok(Some(ViolationData::OpenTrades {
                current_count: open_count,
                time_window_minutes: window_minutes,
                min_allowed: rule.min_open_trades,
                max_allowed: rule.max_open_trades,
            }));
        }

        Ok(None)
    }
}

#[async_trait]
impl RuleStrategy for OpenTradesRule {
    async fn evaluate_for_account(
        &self,
        rule: &RiskRule,
        account: &Account,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        let window_minutes = Self::time_window(rule)?;

        // The rule carries its own dedup: an incident for this account inside
        // the counting window suppresses a new violation, independent of the
        // generic cooldown guard.
        let window_start = now - Duration::minutes(window_minutes);
        if self
            .incidents
            .exists_for_account_since(rule.id, account.id, window_start)
            .await?
        {
            return Ok(None);
        }

        self.check_open_trades(rule, account, window_minutes, now)
            .await
    }

    async fn evaluate_for_trade(
        &self,
        rule: &RiskRule,
        _trade: &Trade,
        account: &Account,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        self.evaluate_for_account(rule, account, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RuleSeverity, RuleType};
    use crate::domain::repository::NewIncident;
    use crate::infrastructure::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn open_trades_rule(min: Option<u32>, max: Option<u32>) -> RiskRule {
        let mut rule = RiskRule::new("too many open", RuleType::OpenTrades, RuleSeverity::Soft);
        rule.id = 3;
        rule.time_window_minutes = Some(30);
        rule.min_open_trades = min;
        rule.max_open_trades = max;
        rule
    }

    async fn setup(open_trades_in_window: usize) -> (Arc<MemoryStore>, OpenTradesRule, Account) {
        let store = Arc::new(MemoryStore::new());
        let account = store.insert_account(21002003, true, true).await;
        let now = Utc::now();

        for i in 0..open_trades_in_window {
            store
                .insert_open_trade(
                    account.id,
                    dec!(1.0),
                    now - Duration::minutes(5 + i as i64),
                )
                .await;
        }

        let strategy = OpenTradesRule::new(store.clone(), store.clone());
        (store, strategy, account)
    }

    #[tokio::test]
    async fn count_above_max_violates() {
        let (_store, strategy, account) = setup(4).await;
        let rule = open_trades_rule(None, Some(3));

        let violation = strategy
            .evaluate_for_account(&rule, &account, Utc::now())
            .await
            .unwrap();

        assert_eq!(
            violation,
            Some(ViolationData::OpenTrades {
                current_count: 4,
                time_window_minutes: 30,
                min_allowed: None,
                max_allowed: Some(3),
            })
        );
    }

    #[tokio::test]
    async fn count_at_max_does_not_violate() {
        let (_store, strategy, account) = setup(3).await;
        let rule = open_trades_rule(None, Some(3));

        let violation = strategy
            .evaluate_for_account(&rule, &account, Utc::now())
            .await
            .unwrap();

        assert_eq!(violation, None);
    }

    #[tokio::test]
    async fn count_below_min_violates() {
        let (_store, strategy, account) = setup(1).await;
        let rule = open_trades_rule(Some(2), None);

        let violation = strategy
            .evaluate_for_account(&rule, &account, Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            violation,
            Some(ViolationData::OpenTrades {
                current_count: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn trades_opened_before_window_are_not_counted() {
        let (store, strategy, account) = setup(2).await;
        let now = Utc::now();
        // Opened well before the 30 minute window.
        store
            .insert_open_trade(account.id, dec!(1.0), now - Duration::hours(2))
            .await;
        store
            .insert_open_trade(account.id, dec!(1.0), now - Duration::hours(3))
            .await;

        let rule = open_trades_rule(None, Some(3));
        let violation = strategy
            .evaluate_for_account(&rule, &account, now)
            .await
            .unwrap();

        assert_eq!(violation, None);
    }

    #[tokio::test]
    async fn recent_incident_inside_window_suppresses_violation() {
        let (store, strategy, account) = setup(5).await;
        let now = Utc::now();
        let rule = open_trades_rule(None, Some(3));

        store
            .insert_incident_at(
                NewIncident {
                    rule_id: rule.id,
                    account_id: account.id,
                    trade_id: None,
                    severity: rule.severity,
                    description: "account has 5 open trades".to_string(),
                },
                now - Duration::minutes(10),
            )
            .await;

        let violation = strategy
            .evaluate_for_account(&rule, &account, now)
            .await
            .unwrap();

        assert_eq!(violation, None);
    }

    #[tokio::test]
    async fn trade_mode_is_account_scoped() {
        let (store, strategy, account) = setup(4).await;
        let now = Utc::now();
        let trade = store
            .insert_closed_trade(account.id, dec!(1.0), now - Duration::minutes(20), now)
            .await;

        let rule = open_trades_rule(None, Some(3));
        let violation = strategy
            .evaluate_for_trade(&rule, &trade, &account, now)
            .await
            .unwrap();

        // Same result as account mode, regardless of the trade passed in.
        assert!(matches!(
            violation,
            Some(ViolationData::OpenTrades {
                current_count: 4,
                ..
            })
        ));
    }
}
