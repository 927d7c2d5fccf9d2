// src/domain/service/mod.rs
// Domain service interfaces

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::errors::AppResult;
use crate::domain::models::{Account, RiskRule, Trade};

/// Structured evidence describing a violation, one variant per rule type.
/// Carries enough data for the incident description (actual value,
/// thresholds, window size).
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationData {
    Duration {
        duration_seconds: i64,
        min_duration_seconds: i64,
        trade_id: i64,
    },
    Volume {
        current_volume: Decimal,
        average_volume: Decimal,
        min_expected: Decimal,
        max_expected: Decimal,
        trade_id: i64,
    },
    OpenTrades {
        current_count: usize,
        time_window_minutes: i64,
        min_allowed: Option<u32>,
        max_allowed: Option<u32>,
    },
}

/// Evaluation contract shared by all rule types. `Some(evidence)` means the
/// rule is violated; `None` means it is not.
#[async_trait]
pub trait RuleStrategy: Send + Sync {
    /// Evaluate a rule for an account (periodic/batch context).
    async fn evaluate_for_account(
        &self,
        rule: &RiskRule,
        account: &Account,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>>;

    /// Evaluate a rule for a single closed trade (event context).
    async fn evaluate_for_trade(
        &self,
        rule: &RiskRule,
        trade: &Trade,
        account: &Account,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ViolationData>>;
}
