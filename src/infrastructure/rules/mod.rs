// src/infrastructure/rules/mod.rs
// Rule strategy implementations

mod duration;
mod open_trades;
mod volume;

pub use duration::DurationRule;
pub use open_trades::OpenTradesRule;
pub use volume::VolumeRule;

use std::sync::Arc;

use crate::domain::models::RuleType;
use crate::domain::repository::{IncidentRepository, TradeRepository};
use crate::domain::service::RuleStrategy;

/// The closed set of rule strategies, selected by a rule's type. One
/// instance of each is built up front; dispatch is a plain match instead of
/// an open registry.
pub struct RuleHandlers {
    duration: DurationRule,
    volume: VolumeRule,
    open_trades: OpenTradesRule,
}

impl RuleHandlers {
    pub fn new(
        trades: Arc<dyn TradeRepository>,
        incidents: Arc<dyn IncidentRepository>,
        duration_scan_window_hours: i64,
    ) -> Self {
        Self {
            duration: DurationRule::new(
                trades.clone(),
                incidents.clone(),
                duration_scan_window_hours,
            ),
            volume: VolumeRule::new(trades.clone(), incidents.clone()),
            open_trades: OpenTradesRule::new(trades, incidents),
        }
    }

    pub fn strategy(&self, rule_type: RuleType) -> &dyn RuleStrategy {
        match rule_type {
            RuleType::Duration => &self.duration,
            RuleType::Volume => &self.volume,
            RuleType::OpenTrades => &self.open_trades,
        }
    }
}
