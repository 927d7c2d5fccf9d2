// src/infrastructure/rules/volume.rs
// Volume consistency rule

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::{AppResult, RuleError};
use crate::domain::models::{Account, RiskRule, Trade};
use crate::domain::repository::{IncidentRepository, TradeRepository};
use crate::domain::service::{RuleStrategy, ViolationData};

/// Flags trades whose volume falls outside a factor band around the average
/// of the account's most recent closed trades.
pub struct VolumeRule {
    trades: Arc<dyn TradeRepository>,
    incidents: Arc<dyn IncidentRepository>,
}

struct VolumeParams {
    min_factor: Decimal,
    max_factor: Decimal,
    lookback_trades: usize,
}

impl VolumeRule {
    pub fn new(trades: Arc<dyn TradeRepository>, incidents: Arc<dyn IncidentRepository>) -> Self {
        Self { trades, incidents }
    }

    fn params(rule: &RiskRule) -> Result<VolumeParams, RuleError> {
        let missing = |parameter| RuleError::MissingParameter {
            rule_id: rule.id,
            parameter,
        };

        Ok(VolumeParams {
            min_factor: rule.min_factor.ok_or_else(|| missing("min_factor"))?,
            max_factor: rule.max_factor.ok_or_else(|| missing("max_factor"))?,
            lookback_trades: rule
                .lookback_trades
                .ok_or_else(|| missing("lookback_trades"))?,
        })
    }

    /// Evaluate one candidate trade against the historical baseline.
    async fn evaluate_candidate(
        &self,
        rule: &RiskRule,
        trade: &Trade,
        account: &Account,
    ) -> AppResult<Option<ViolationData>> {
        let params = Self::params(rule)?;

        let history = self
            .trades
            .recent_closed_trades(account.id, Some(trade.id), params.lookback_trades)
            .await?;

        // No historical trades means no baseline to compare against.
        if history.is_empty() {
            return Ok(None);
        }

        let total: Decimal = history.iter().map(|t| t.volume).sum();
        let average_volume = total / Decimal::from(history.len() as u64);
        let min_expected = average_volume * params.min_factor;
        let max_expected = average_volume * params.max_factor;

        if trade.volume < min_expected || trade.volume > max_expected {
            return Ok(Some(ViolationData::Volume {
                current_volume: trade.volume,
                average_volume,
                min_expected,
                max_expected,
                trade_id: trade.id,
            }));
        }

        Ok(None)
    }
}

#[async_trait]
impl RuleStrategy for VolumeRule {
    async fn evaluate_for_account(
        &self,
        rule: &RiskRule,
        account: &Account,
        _now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        // The candidate is the most recently closed trade that has not yet
        // produced an incident for this rule.
        let recent = self
            .trades
            .recent_closed_trades(account.id, None, usize::MAX)
            .await?;

        let mut candidate = None;
        for trade in recent {
            if !self.incidents.exists_for_trade(rule.id, trade.id).await? {
                candidate = Some(trade);
                break;
            }
        }

        match candidate {
            Some(trade) => self.evaluate_candidate(rule, &trade, account).await,
            None => Ok(None),
        }
    }

    async fn evaluate_for_trade(
        &self,
        rule: &RiskRule,
        trade: &Trade,
        account: &Account,
        _now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>> {
        if self.incidents.exists_for_trade(rule.id, trade.id).await? {
            return Ok(None);
        }

        self.evaluate_candidate(rule, trade, account).await
    }
}
