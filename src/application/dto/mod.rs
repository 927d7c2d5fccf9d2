// src/application/dto/mod.rs
// Result shapes returned by the evaluation use cases

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::models::{Account, RiskRule, RuleSeverity, RuleType};

/// Outcome of evaluating one rule against one account or trade. Callers
/// inspect `violated` / `action_executed` instead of relying on errors to
/// signal business results.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub rule_id: i64,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub severity: RuleSeverity,
    pub violated: bool,
    pub message: String,
    pub incident_id: Option<i64>,
    pub incident_created: bool,
    pub action_executed: bool,
    pub trade_id: Option<i64>,
    pub account_id: i64,
    pub account_login: i64,
    pub created_at: Option<DateTime<Utc>>,
}

impl EvaluationOutcome {
    /// A non-violated outcome with an informational message.
    pub fn not_violated(rule: &RiskRule, account: &Account, message: impl Into<String>) -> Self {
        Self {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type,
            severity: rule.severity,
            violated: false,
            message: message.into(),
            incident_id: None,
            incident_created: false,
            action_executed: false,
            trade_id: None,
            account_id: account.id,
            account_login: account.login,
            created_at: None,
        }
    }
}
