// src/application/usecase/action_usecase.rs
// Executes the mitigating actions attached to a rule once an incident exists

use std::sync::Arc;

use chrono::Utc;

use crate::domain::errors::{AppError, AppResult, RepositoryError};
use crate::domain::models::{
    ActionType, Incident, NotificationStatus, RiskRule, RuleAction,
};
use crate::domain::repository::{
    AccountRepository, NewNotification, NotificationRepository, RuleRepository,
};

/// Runs a rule's ordered action list for a materialized incident, recording
/// one notification per attempt. The email and chat channels are stubs that
/// write structured log entries; the disable actions mutate account state.
pub struct ActionExecutor {
    rules: Arc<dyn RuleRepository>,
    accounts: Arc<dyn AccountRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl ActionExecutor {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        accounts: Arc<dyn AccountRepository>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            rules,
            accounts,
            notifications,
        }
    }

    /// Execute every action of the rule in ascending order. One action
    /// failing records a FAILED notification and does not stop the rest.
    /// Returns whether at least one action executed.
    pub async fn execute_for_incident(
        &self,
        rule: &RiskRule,
        incident: &Incident,
    ) -> AppResult<bool> {
        let actions = self.rules.actions_for_rule(rule.id).await?;
        let mut any_executed = false;

        for action in &actions {
            match self.execute_single(action, incident).await {
                Ok(details) => {
                    self.record(incident, action, NotificationStatus::Executed, details)
                        .await;
                    any_executed = true;
                }
                Err(e) => {
                    log::error!(
                        "error executing action {} for incident {}: {}",
                        action.action_type,
                        incident.id,
                        e
                    );
                    self.record(incident, action, NotificationStatus::Failed, e.to_string())
                        .await;
                }
            }
        }

        Ok(any_executed)
    }

    async fn execute_single(&self, action: &RuleAction, incident: &Incident) -> AppResult<String> {
        match action.action_type {
            ActionType::Email => {
                log::info!(
                    "EMAIL sent for incident {} (account: {}, rule: {}): {}",
                    incident.id,
                    incident.account_id,
                    incident.rule_id,
                    incident.description
                );
                Ok("Mock email sent to logs".to_string())
            }
            ActionType::Slack => {
                log::info!(
                    "SLACK notification for incident {} (account: {}, rule: {}, severity: {})",
                    incident.id,
                    incident.account_id,
                    incident.rule_id,
                    incident.severity
                );
                Ok("Mock Slack notification sent to logs".to_string())
            }
            ActionType::DisableAccount => {
                let account = self.find_account(incident.account_id).await?;
                self.accounts.disable_account(account.id).await?;
                log::warn!(
                    "ACCOUNT DISABLED for incident {} (account: {}, login: {}, rule: {})",
                    incident.id,
                    account.id,
                    account.login,
                    incident.rule_id
                );
                Ok(format!("Account {} disabled", account.login))
            }
            ActionType::DisableTrading => {
                let account = self.find_account(incident.account_id).await?;
                self.accounts.disable_trading(account.id).await?;
                log::warn!(
                    "TRADING DISABLED for incident {} (account: {}, login: {}, rule: {})",
                    incident.id,
                    account.id,
                    account.login,
                    incident.rule_id
                );
                Ok(format!("Trading disabled for account {}", account.login))
            }
        }
    }

    async fn find_account(&self, account_id: i64) -> AppResult<crate::domain::models::Account> {
        self.accounts
            .find(account_id)
            .await?
            .ok_or(AppError::Repository(RepositoryError::NotFound {
                entity: "account",
                id: account_id,
            }))
    }

    /// Recording the notification is itself best-effort; a storage failure
    /// here must not abort the remaining actions.
    async fn record(
        &self,
        incident: &Incident,
        action: &RuleAction,
        status: NotificationStatus,
        details: String,
    ) {
        let executed_at = match status {
            NotificationStatus::Executed => Some(Utc::now()),
            _ => None,
        };

        let result = self
            .notifications
            .create(NewNotification {
                incident_id: incident.id,
                action_type: action.action_type,
                status,
                details: Some(details),
                metadata: None,
                executed_at,
            })
            .await;

        if let Err(e) = result {
            log::error!(
                "failed to record {} notification for incident {}: {}",
                status,
                incident.id,
                e
            );
        }
    }
}
