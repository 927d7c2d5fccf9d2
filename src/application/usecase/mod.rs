pub mod action_usecase;
pub mod evaluation_usecase;

// Re-export public API
pub use action_usecase::ActionExecutor;
pub use evaluation_usecase::{RiskEvaluationUseCase, RiskEvaluator};
