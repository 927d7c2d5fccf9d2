// src/infrastructure/store/mod.rs
// In-memory store backing every repository seam

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::domain::errors::{RepoResult, RepositoryError};
use crate::domain::models::{
    Account, AccountStatus, Incident, Notification, RiskRule, RuleAction, Trade, TradeSide,
    TradeStatus,
};
use crate::domain::repository::{
    AccountRepository, IncidentRepository, IncidentWrite, NewIncident, NewNotification,
    NotificationRepository, RuleRepository, TradeRepository,
};

/// Input shape for inserting a trade with full control over its fields.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub account_id: i64,
    pub side: TradeSide,
    pub volume: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub open_price: Option<Decimal>,
    pub close_price: Option<Decimal>,
    pub status: TradeStatus,
}

#[derive(Default)]
struct StoreInner {
    accounts: HashMap<i64, Account>,
    trades: HashMap<i64, Trade>,
    rules: HashMap<i64, RiskRule>,
    actions: Vec<RuleAction>,
    incidents: Vec<Incident>,
    notifications: Vec<Notification>,
    next_id: i64,
}

impl StoreInner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// All tables live behind a single mutex, so every repository call is one
/// lock acquisition and the guarded incident insert observes a consistent
/// snapshot while it checks, writes and counts.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    pub async fn insert_account(&self, login: i64, active: bool, trading_active: bool) -> Account {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let account = Account {
            id: inner.next_id(),
            login,
            status: if active {
                AccountStatus::Enable
            } else {
                AccountStatus::Disable
            },
            trading_status: if trading_active {
                AccountStatus::Enable
            } else {
                AccountStatus::Disable
            },
            created_at: now,
            updated_at: now,
        };
        inner.accounts.insert(account.id, account.clone());
        account
    }

    pub async fn insert_trade(&self, new_trade: NewTrade) -> Trade {
        let mut inner = self.inner.lock().await;
        let trade = Trade {
            id: inner.next_id(),
            account_id: new_trade.account_id,
            side: new_trade.side,
            volume: new_trade.volume,
            open_time: new_trade.open_time,
            close_time: new_trade.close_time,
            open_price: new_trade.open_price,
            close_price: new_trade.close_price,
            status: new_trade.status,
            metadata: None,
        };
        inner.trades.insert(trade.id, trade.clone());
        trade
    }

    pub async fn insert_closed_trade(
        &self,
        account_id: i64,
        volume: Decimal,
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
    ) -> Trade {
        self.insert_trade(NewTrade {
            account_id,
            side: TradeSide::Buy,
            volume,
            open_time,
            close_time: Some(close_time),
            open_price: None,
            close_price: None,
            status: TradeStatus::Closed,
        })
        .await
    }

    pub async fn insert_open_trade(
        &self,
        account_id: i64,
        volume: Decimal,
        open_time: DateTime<Utc>,
    ) -> Trade {
        self.insert_trade(NewTrade {
            account_id,
            side: TradeSide::Buy,
            volume,
            open_time,
            close_time: None,
            open_price: None,
            close_price: None,
            status: TradeStatus::Open,
        })
        .await
    }

    /// Transition a trade from open to closed. The transition happens exactly
    /// once; closing an already closed trade is a conflict.
    pub async fn close_trade(
        &self,
        trade_id: i64,
        close_price: Decimal,
        at: DateTime<Utc>,
    ) -> RepoResult<Trade> {
        let mut inner = self.inner.lock().await;
        let trade = inner
            .trades
            .get_mut(&trade_id)
            .ok_or(RepositoryError::NotFound {
                entity: "trade",
                id: trade_id,
            })?;

        if trade.is_closed() {
            return Err(RepositoryError::Conflict(format!(
                "trade {} is already closed",
                trade_id
            )));
        }

        trade.status = TradeStatus::Closed;
        trade.close_time = Some(at);
        trade.close_price = Some(close_price);
        Ok(trade.clone())
    }

    pub async fn insert_rule(&self, mut rule: RiskRule) -> RiskRule {
        let mut inner = self.inner.lock().await;
        rule.id = inner.next_id();
        inner.rules.insert(rule.id, rule.clone());
        rule
    }

    pub async fn insert_action(
        &self,
        rule_id: i64,
        action_type: crate::domain::models::ActionType,
        order: i32,
        config: Option<serde_json::Value>,
    ) -> RuleAction {
        let mut inner = self.inner.lock().await;
        let action = RuleAction {
            id: inner.next_id(),
            rule_id,
            action_type,
            config,
            order,
        };
        inner.actions.push(action.clone());
        action
    }

    /// Direct incident insert with an explicit timestamp, bypassing the
    /// dedup guard. Used to plant pre-existing incidents.
    pub async fn insert_incident_at(
        &self,
        candidate: NewIncident,
        created_at: DateTime<Utc>,
    ) -> Incident {
        let mut inner = self.inner.lock().await;
        let incident = Incident {
            id: inner.next_id(),
            rule_id: candidate.rule_id,
            account_id: candidate.account_id,
            trade_id: candidate.trade_id,
            severity: candidate.severity,
            description: candidate.description,
            created_at,
        };
        inner.incidents.push(incident.clone());
        incident
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn find(&self, account_id: i64) -> RepoResult<Option<Account>> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(&account_id).cloned())
    }

    async fn active_accounts(&self) -> RepoResult<Vec<Account>> {
        let inner = self.inner.lock().await;
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.is_trading_active())
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn disable_account(&self, account_id: i64) -> RepoResult<()> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .accounts
            .get_mut(&account_id)
            .ok_or(RepositoryError::NotFound {
                entity: "account",
                id: account_id,
            })?;
        account.status = AccountStatus::Disable;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn disable_trading(&self, account_id: i64) -> RepoResult<()> {
        let mut inner = self.inner.lock().await;
        let account = inner
            .accounts
            .get_mut(&account_id)
            .ok_or(RepositoryError::NotFound {
                entity: "account",
                id: account_id,
            })?;
        account.trading_status = AccountStatus::Disable;
        account.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TradeRepository for MemoryStore {
    async fn find(&self, trade_id: i64) -> RepoResult<Option<Trade>> {
        let inner = self.inner.lock().await;
        Ok(inner.trades.get(&trade_id).cloned())
    }

    async fn closed_trades_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<Trade>> {
        let inner = self.inner.lock().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| {
                t.account_id == account_id
                    && t.is_closed()
                    && t.close_time.is_some_and(|c| c >= since)
            })
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.close_time.cmp(&a.close_time).then(b.id.cmp(&a.id)));
        Ok(trades)
    }

    async fn recent_closed_trades(
        &self,
        account_id: i64,
        exclude_trade: Option<i64>,
        limit: usize,
    ) -> RepoResult<Vec<Trade>> {
        let inner = self.inner.lock().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| {
                t.account_id == account_id
                    && t.is_closed()
                    && exclude_trade != Some(t.id)
            })
            .cloned()
            .collect();
        trades.sort_by(|a, b| b.close_time.cmp(&a.close_time).then(b.id.cmp(&a.id)));
        trades.truncate(limit);
        Ok(trades)
    }

    async fn count_open_trades_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> RepoResult<usize> {
        let inner = self.inner.lock().await;
        Ok(inner
            .trades
            .values()
            .filter(|t| t.account_id == account_id && t.is_open() && t.open_time >= since)
            .count())
    }
}

#[async_trait]
impl RuleRepository for MemoryStore {
    async fn active_rules(&self) -> RepoResult<Vec<RiskRule>> {
        let inner = self.inner.lock().await;
        let mut rules: Vec<RiskRule> = inner
            .rules
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn actions_for_rule(&self, rule_id: i64) -> RepoResult<Vec<RuleAction>> {
        let inner = self.inner.lock().await;
        let mut actions: Vec<RuleAction> = inner
            .actions
            .iter()
            .filter(|a| a.rule_id == rule_id)
            .cloned()
            .collect();
        actions.sort_by(|a, b| a.order.cmp(&b.order).then(a.id.cmp(&b.id)));
        Ok(actions)
    }
}

#[async_trait]
impl IncidentRepository for MemoryStore {
    async fn exists_recent(
        &self,
        rule_id: i64,
        account_id: i64,
        trade_key: Option<i64>,
        since: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.incidents.iter().any(|i| {
            i.rule_id == rule_id
                && i.account_id == account_id
                && i.trade_id == trade_key
                && i.created_at >= since
        }))
    }

    async fn exists_for_trade(&self, rule_id: i64, trade_id: i64) -> RepoResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner
            .incidents
            .iter()
            .any(|i| i.rule_id == rule_id && i.trade_id == Some(trade_id)))
    }

    async fn exists_for_account_since(
        &self,
        rule_id: i64,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.incidents.iter().any(|i| {
            i.rule_id == rule_id && i.account_id == account_id && i.created_at >= since
        }))
    }

    async fn create_guarded(
        &self,
        candidate: NewIncident,
        dedup_since: DateTime<Utc>,
        count_since: DateTime<Utc>,
    ) -> RepoResult<IncidentWrite> {
        // Check, insert and count under one lock acquisition; concurrent
        // writers targeting the same key serialize here.
        let mut inner = self.inner.lock().await;

        let duplicate = inner.incidents.iter().any(|i| {
            i.rule_id == candidate.rule_id
                && i.account_id == candidate.account_id
                && i.trade_id == candidate.trade_id
                && i.created_at >= dedup_since
        });
        if duplicate {
            return Ok(IncidentWrite::Duplicate);
        }

        let incident = Incident {
            id: inner.next_id(),
            rule_id: candidate.rule_id,
            account_id: candidate.account_id,
            trade_id: candidate.trade_id,
            severity: candidate.severity,
            description: candidate.description,
            created_at: Utc::now(),
        };
        inner.incidents.push(incident.clone());

        let recent_count = inner
            .incidents
            .iter()
            .filter(|i| {
                i.rule_id == candidate.rule_id
                    && i.account_id == candidate.account_id
                    && i.created_at >= count_since
            })
            .count() as u32;

        Ok(IncidentWrite::Created {
            incident,
            recent_count,
        })
    }

    async fn incidents_for_account(&self, account_id: i64) -> RepoResult<Vec<Incident>> {
        let inner = self.inner.lock().await;
        let mut incidents: Vec<Incident> = inner
            .incidents
            .iter()
            .filter(|i| i.account_id == account_id)
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(incidents)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn create(&self, notification: NewNotification) -> RepoResult<Notification> {
        let mut inner = self.inner.lock().await;
        let record = Notification {
            id: inner.next_id(),
            incident_id: notification.incident_id,
            action_type: notification.action_type,
            status: notification.status,
            details: notification.details,
            metadata: notification.metadata,
            executed_at: notification.executed_at,
            created_at: Utc::now(),
        };
        inner.notifications.push(record.clone());
        Ok(record)
    }

    async fn for_incident(&self, incident_id: i64) -> RepoResult<Vec<Notification>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .notifications
            .iter()
            .filter(|n| n.incident_id == incident_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RuleSeverity;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn candidate(rule_id: i64, account_id: i64, trade_id: Option<i64>) -> NewIncident {
        NewIncident {
            rule_id,
            account_id,
            trade_id,
            severity: RuleSeverity::Hard,
            description: "closed in 45s (minimum required: 60s)".to_string(),
        }
    }

    #[tokio::test]
    async fn create_guarded_rejects_duplicates_inside_window() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let dedup_since = now - Duration::minutes(10);
        let count_since = now - Duration::hours(24);

        let first = store
            .create_guarded(candidate(1, 1, Some(7)), dedup_since, count_since)
            .await
            .unwrap();
        assert!(matches!(
            first,
            IncidentWrite::Created {
                recent_count: 1,
                ..
            }
        ));

        let second = store
            .create_guarded(candidate(1, 1, Some(7)), dedup_since, count_since)
            .await
            .unwrap();
        assert!(matches!(second, IncidentWrite::Duplicate));
    }

    #[tokio::test]
    async fn create_guarded_allows_insert_after_window_and_counts_both() {
        let store = MemoryStore::new();
        let now = Utc::now();

        // Prior incident just outside the 10 minute dedup window.
        store
            .insert_incident_at(candidate(1, 1, Some(7)), now - Duration::minutes(11))
            .await;

        let write = store
            .create_guarded(
                candidate(1, 1, Some(7)),
                now - Duration::minutes(10),
                now - Duration::hours(24),
            )
            .await
            .unwrap();

        match write {
            IncidentWrite::Created { recent_count, .. } => assert_eq!(recent_count, 2),
            other => panic!("expected created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn null_trade_key_only_matches_null_trade_ids() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_incident_at(candidate(1, 1, Some(7)), now - Duration::minutes(1))
            .await;

        let since = now - Duration::minutes(10);
        assert!(!store.exists_recent(1, 1, None, since).await.unwrap());
        assert!(store.exists_recent(1, 1, Some(7), since).await.unwrap());
    }

    #[tokio::test]
    async fn closed_trades_are_returned_most_recent_first() {
        let store = MemoryStore::new();
        let account = store.insert_account(21002001, true, true).await;
        let now = Utc::now();

        let older = store
            .insert_closed_trade(
                account.id,
                dec!(1.0),
                now - Duration::hours(3),
                now - Duration::hours(2),
            )
            .await;
        let newer = store
            .insert_closed_trade(
                account.id,
                dec!(1.0),
                now - Duration::hours(1),
                now - Duration::minutes(30),
            )
            .await;

        let trades = store
            .closed_trades_since(account.id, now - Duration::hours(24))
            .await
            .unwrap();
        let ids: Vec<i64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn close_trade_transitions_exactly_once() {
        let store = MemoryStore::new();
        let account = store.insert_account(21002001, true, true).await;
        let trade = store
            .insert_open_trade(account.id, dec!(1.0), Utc::now() - Duration::minutes(5))
            .await;

        let closed = store
            .close_trade(trade.id, dec!(101.25), Utc::now())
            .await
            .unwrap();
        assert!(closed.is_closed());
        assert_eq!(closed.close_price, Some(dec!(101.25)));

        let again = store.close_trade(trade.id, dec!(102.00), Utc::now()).await;
        assert!(matches!(again, Err(RepositoryError::Conflict(_))));
    }
}
