// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Implement From for common error types
impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule {rule_id} is missing parameter `{parameter}`")]
    MissingParameter { rule_id: i64, parameter: &'static str },

    #[error("Action execution error: {0}")]
    Action(String),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type RepoResult<T> = Result<T, RepositoryError>;
pub type RuleResult<T> = Result<T, RuleError>;
