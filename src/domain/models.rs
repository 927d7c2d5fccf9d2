// src/domain/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored trading account. Trading is considered active only when both
/// `status` and `trading_status` are enabled.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub login: i64,
    pub status: AccountStatus,
    pub trading_status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Enable
    }

    pub fn is_trading_active(&self) -> bool {
        self.is_active() && self.trading_status == AccountStatus::Enable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Enable,
    Disable,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Enable => "enable",
            AccountStatus::Disable => "disable",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single executed operation on an account.
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: i64,
    pub account_id: i64,
    pub side: TradeSide,
    pub volume: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    pub open_price: Option<Decimal>,
    pub close_price: Option<Decimal>,
    pub status: TradeStatus,
    pub metadata: Option<serde_json::Value>,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == TradeStatus::Closed
    }

    /// Duration in seconds, only defined once the trade has a close time.
    pub fn duration_seconds(&self) -> Option<i64> {
        self.close_time
            .map(|close| (close - self.open_time).num_seconds())
    }

    /// Realized P&L, only defined when both prices are set.
    pub fn profit_loss(&self) -> Option<Decimal> {
        match (self.open_price, self.close_price) {
            (Some(open), Some(close)) => Some((close - open) * self.volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Open,
    Closed,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "open"),
            TradeStatus::Closed => write!(f, "closed"),
        }
    }
}

/// A configurable risk policy. The parameters a rule needs depend on its
/// type; unused parameters stay `None`.
#[derive(Debug, Clone)]
pub struct RiskRule {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub severity: RuleSeverity,
    pub is_active: bool,
    /// DURATION: minimum acceptable trade duration.
    pub min_duration_seconds: Option<i64>,
    /// VOLUME: lower bound factor applied to the historical average.
    pub min_factor: Option<Decimal>,
    /// VOLUME: upper bound factor applied to the historical average.
    pub max_factor: Option<Decimal>,
    /// VOLUME: number of recent closed trades forming the baseline.
    pub lookback_trades: Option<usize>,
    /// OPEN_TRADES: counting window.
    pub time_window_minutes: Option<i64>,
    /// OPEN_TRADES: minimum open trades allowed inside the window.
    pub min_open_trades: Option<u32>,
    /// OPEN_TRADES: maximum open trades allowed inside the window.
    pub max_open_trades: Option<u32>,
    /// SOFT rules: incidents accumulated in 24h before actions fire.
    pub incidents_before_action: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RiskRule {
    /// New rule with all type-specific parameters unset.
    pub fn new(name: &str, rule_type: RuleType, severity: RuleSeverity) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: name.to_string(),
            description: None,
            rule_type,
            severity,
            is_active: true,
            min_duration_seconds: None,
            min_factor: None,
            max_factor: None,
            lookback_trades: None,
            time_window_minutes: None,
            min_open_trades: None,
            max_open_trades: None,
            incidents_before_action: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_hard(&self) -> bool {
        self.severity == RuleSeverity::Hard
    }

    pub fn is_soft(&self) -> bool {
        self.severity == RuleSeverity::Soft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    Duration,
    Volume,
    OpenTrades,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Duration => "DURATION",
            RuleType::Volume => "VOLUME",
            RuleType::OpenTrades => "OPEN_TRADES",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleSeverity {
    Hard,
    Soft,
}

impl RuleSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSeverity::Hard => "HARD",
            RuleSeverity::Soft => "SOFT",
        }
    }
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One mitigating action attached to a rule. Actions run in ascending
/// `order`, ties broken by insertion order.
#[derive(Debug, Clone)]
pub struct RuleAction {
    pub id: i64,
    pub rule_id: i64,
    pub action_type: ActionType,
    pub config: Option<serde_json::Value>,
    pub order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Email,
    Slack,
    DisableAccount,
    DisableTrading,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Email => "EMAIL",
            ActionType::Slack => "SLACK",
            ActionType::DisableAccount => "DISABLE_ACCOUNT",
            ActionType::DisableTrading => "DISABLE_TRADING",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted record of one rule violation. Immutable once created.
#[derive(Debug, Clone)]
pub struct Incident {
    pub id: i64,
    pub rule_id: i64,
    pub account_id: i64,
    /// Null for account-scoped rules such as OPEN_TRADES.
    pub trade_id: Option<i64>,
    pub severity: RuleSeverity,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted record of one action's execution attempt for an incident.
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: i64,
    pub incident_id: i64,
    pub action_type: ActionType,
    pub status: NotificationStatus,
    pub details: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Executed,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Executed => "EXECUTED",
            NotificationStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn trade(open_offset_secs: i64, close_offset_secs: Option<i64>) -> Trade {
        let now = Utc::now();
        Trade {
            id: 1,
            account_id: 1,
            side: TradeSide::Buy,
            volume: dec!(1.5),
            open_time: now - Duration::seconds(open_offset_secs),
            close_time: close_offset_secs.map(|s| now - Duration::seconds(s)),
            open_price: None,
            close_price: None,
            status: if close_offset_secs.is_some() {
                TradeStatus::Closed
            } else {
                TradeStatus::Open
            },
            metadata: None,
        }
    }

    #[test]
    fn duration_requires_close_time() {
        assert_eq!(trade(120, None).duration_seconds(), None);
        assert_eq!(trade(120, Some(75)).duration_seconds(), Some(45));
    }

    #[test]
    fn profit_loss_requires_both_prices() {
        let mut t = trade(300, Some(10));
        assert_eq!(t.profit_loss(), None);

        t.open_price = Some(dec!(100.00));
        t.close_price = Some(dec!(102.00));
        assert_eq!(t.profit_loss(), Some(dec!(3.000)));
    }

    #[test]
    fn trading_active_requires_both_flags() {
        let now = Utc::now();
        let mut account = Account {
            id: 1,
            login: 21002001,
            status: AccountStatus::Enable,
            trading_status: AccountStatus::Enable,
            created_at: now,
            updated_at: now,
        };
        assert!(account.is_trading_active());

        account.trading_status = AccountStatus::Disable;
        assert!(!account.is_trading_active());

        account.trading_status = AccountStatus::Enable;
        account.status = AccountStatus::Disable;
        assert!(!account.is_trading_active());
    }
}
