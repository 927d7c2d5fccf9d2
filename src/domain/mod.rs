// src/domain/mod.rs
pub mod errors;
pub mod models;
pub mod repository;
pub mod service;

// Re-export common types for convenience
pub use errors::{AppError, AppResult, RepoResult, RepositoryError, RuleError, RuleResult};
pub use models::{
    Account, AccountStatus, ActionType, Incident, Notification, NotificationStatus, RiskRule,
    RuleAction, RuleSeverity, RuleType, Trade, TradeSide, TradeStatus,
};
