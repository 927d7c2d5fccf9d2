// src/domain/repository/mod.rs
// Repository interfaces for domain entities

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::RepoResult;
use crate::domain::models::{
    Account, ActionType, Incident, Notification, NotificationStatus, RiskRule, RuleAction,
    RuleSeverity, Trade,
};

/// Repository interface for account state
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find(&self, account_id: i64) -> RepoResult<Option<Account>>;

    /// Accounts whose status and trading status are both enabled.
    async fn active_accounts(&self) -> RepoResult<Vec<Account>>;

    async fn disable_account(&self, account_id: i64) -> RepoResult<()>;

    async fn disable_trading(&self, account_id: i64) -> RepoResult<()>;
}

/// Repository interface for trade history
#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn find(&self, trade_id: i64) -> RepoResult<Option<Trade>>;

    /// Closed trades of an account with a close time at or after `since`,
    /// most recently closed first.
    async fn closed_trades_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> RepoResult<Vec<Trade>>;

    /// The `limit` most recently closed trades of an account, optionally
    /// excluding one trade id, most recently closed first.
    async fn recent_closed_trades(
        &self,
        account_id: i64,
        exclude_trade: Option<i64>,
        limit: usize,
    ) -> RepoResult<Vec<Trade>>;

    /// Number of currently open trades opened at or after `since`.
    async fn count_open_trades_since(
        &self,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> RepoResult<usize>;
}

/// Repository interface for rule configuration
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Active rules in stable id order.
    async fn active_rules(&self) -> RepoResult<Vec<RiskRule>>;

    /// Actions of a rule, ascending by `order`, ties broken by insertion.
    async fn actions_for_rule(&self, rule_id: i64) -> RepoResult<Vec<RuleAction>>;
}

/// A not-yet-persisted incident.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub rule_id: i64,
    pub account_id: i64,
    pub trade_id: Option<i64>,
    pub severity: RuleSeverity,
    pub description: String,
}

/// Outcome of the guarded incident insert.
#[derive(Debug, Clone)]
pub enum IncidentWrite {
    /// An incident for the same key already existed inside the dedup window.
    Duplicate,
    /// The incident was persisted; `recent_count` is the number of incidents
    /// for the same (rule, account) pair since `count_since`, including this one.
    Created {
        incident: Incident,
        recent_count: u32,
    },
}

/// Repository interface for incident records. Incidents are append-only;
/// the guarded insert is the serialization point for concurrent evaluations.
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// Whether an incident exists for (rule, account, trade key) created at
    /// or after `since`. A `None` trade key matches only null trade ids.
    async fn exists_recent(
        &self,
        rule_id: i64,
        account_id: i64,
        trade_key: Option<i64>,
        since: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Whether any incident exists for (rule, trade), regardless of age.
    async fn exists_for_trade(&self, rule_id: i64, trade_id: i64) -> RepoResult<bool>;

    /// Whether any incident exists for (rule, account) created at or after
    /// `since`, regardless of trade id.
    async fn exists_for_account_since(
        &self,
        rule_id: i64,
        account_id: i64,
        since: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Atomically re-check the dedup condition and insert. The check, the
    /// insert and the rolling count must be one atomic step with respect to
    /// concurrent writers targeting the same key.
    async fn create_guarded(
        &self,
        candidate: NewIncident,
        dedup_since: DateTime<Utc>,
        count_since: DateTime<Utc>,
    ) -> RepoResult<IncidentWrite>;

    /// Incidents of an account, most recent first.
    async fn incidents_for_account(&self, account_id: i64) -> RepoResult<Vec<Incident>>;
}

/// A not-yet-persisted notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub incident_id: i64,
    pub action_type: ActionType,
    pub status: NotificationStatus,
    pub details: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Repository interface for action execution records
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: NewNotification) -> RepoResult<Notification>;

    async fn for_incident(&self, incident_id: i64) -> RepoResult<Vec<Notification>>;
}

/// Short-lived advisory lock primitive keyed by an arbitrary string, used by
/// the batch path to keep overlapping runs off the same account. Best-effort
/// and process-local; correctness is carried by the guarded incident insert.
pub trait EvaluationLockRepository: Send + Sync {
    /// Acquire the key for `ttl` unless it is already held. Expired entries
    /// count as free.
    fn try_acquire(&self, key: &str, ttl: std::time::Duration) -> bool;

    fn is_held(&self, key: &str) -> bool;

    fn release(&self, key: &str);
}
