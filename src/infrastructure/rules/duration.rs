// src/infrastructure/rules/duration.rs
// Minimum trade duration rule

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::errors::{AppResult, RuleError};
use crate::domain::models::{Account, RiskRule, Trade};
use crate::domain::repository::{IncidentRepository, TradeRepository};
use crate::domain::service::{RuleStrategy, ViolationData};

/// Flags closed trades that were held for less than the configured minimum
/// number of seconds.
pub struct DurationRule {
    trades: Arc<dyn TradeRepository>,
    incidents: Arc<dyn IncidentRepository>,
    /// How far back the account-mode scan looks for closed trades.
    scan_window_hours: i64,
}

impl DurationRule {
    pub fn new(
        trades: Arc<dyn TradeRepository>,
        incidents: Arc<dyn IncidentRepository>,
        scan_window_hours: i64,
    ) -> Self {
        Self {
            trades,
            incidents,
            scan_window_hours,
        }
    }

    fn min_duration(rule: &RiskRule) -> Result<i64, RuleError> {
        rule.min_duration_seconds.ok_or(RuleError::MissingParameter {
            rule_id: rule.id,
            parameter: "min_duration_seconds",
        })
    }

    fn check_trade(trade: &Trade, min_duration_seconds: i64) -> Option<ViolationData> {
        // A trade without a close time never violates.
        let duration = trade.duration_seconds()?;

        if duration < min_duration_seconds {
            Some(ViolationData::Duration {
                duration_seconds: duration,
                min_duration_seconds,
                trade_id: trade.id,
            })
        } else {
            None
        }
    }
}

#[async_trait]
impl RuleStrategy for DurationRule {
    async fn evaluate_for_account(
        &self,
        rule: &RiskRule,
        account: &Account,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        let min_duration_seconds = Self::min_duration(rule)?;
        let since = now - Duration::hours(self.scan_window_hours);

        // Most recently closed first; the first violation wins.
        let recent_closed = self.trades.closed_trades_since(account.id, since).await?;

        for trade in &recent_closed {
            if self.incidents.exists_for_trade(rule.id, trade.id).await? {
                continue;
            }

            if let Some(violation) = Self::check_trade(trade, min_duration_seconds) {
                return Ok(Some(violation));
            }
        }

        Ok(None)
    }

    async fn evaluate_for_trade(
        &self,
        rule: &RiskRule,
        trade: &Trade,
        _account: &Account,
        _now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        let min_duration_seconds = Self::min_duration(rule)?;

        // Short-circuit if this trade already produced an incident for the rule.
        if self.incidents.exists_for_trade(rule.id, trade.id).await? {
            return Ok(None);
        }

        Ok(Self::check_trade(trade, min_duration_seconds))
    }
}
