// src/infrastructure/seed.rs
// Demonstration dataset: accounts in mixed states, a trade history that
// trips each rule type, and the three reference rules with their actions.

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::json;

use crate::domain::errors::AppResult;
use crate::domain::models::{Account, ActionType, RiskRule, RuleSeverity, RuleType};
use crate::infrastructure::store::MemoryStore;

/// Returns the seeded accounts so callers can drive demonstrations off them.
pub async fn seed_demo_data(store: &MemoryStore) -> AppResult<Vec<Account>> {
    let now = Utc::now();
    let mut trade_count = 0usize;

    // Eight accounts; the last two are partially or fully disabled.
    let mut accounts = Vec::new();
    for i in 1..=8i64 {
        let login = 21_002_000 + i;
        let account = store
            .insert_account(login, i <= 7, i <= 6)
            .await;
        log::debug!("seeded account {} (id: {})", login, account.id);
        accounts.push(account);
    }

    for (idx, account) in accounts.iter().enumerate() {
        let i = idx as i64;

        // Baseline of normally paced closed trades at volume 1.0.
        for j in 0..7i64 {
            let open = now - Duration::days(1 + (i + j) % 5) - Duration::hours(1 + j * 3 % 23);
            let close = open + Duration::minutes(20 + j * 25);
            store
                .insert_closed_trade(account.id, dec!(1.0), open, close)
                .await;
            trade_count += 1;
        }

        // One trade closed faster than the 60 second duration threshold.
        let fast_open = now - Duration::minutes(10);
        let fast_close = fast_open + Duration::seconds(15 + (i * 7) % 30);
        store
            .insert_closed_trade(account.id, dec!(2.5), fast_open, fast_close)
            .await;
        trade_count += 1;

        // One trade with a volume far outside the factor band.
        let extreme_volume = if i % 2 == 0 { dec!(5.0) } else { dec!(0.1) };
        store
            .insert_closed_trade(
                account.id,
                extreme_volume,
                now - Duration::minutes(15),
                now - Duration::minutes(10),
            )
            .await;
        trade_count += 1;

        // A handful of open trades inside the open-trades window.
        for k in 0..(2 + i % 4) {
            store
                .insert_open_trade(
                    account.id,
                    dec!(1.5),
                    now - Duration::minutes(5 + (k * 5) % 20),
                )
                .await;
            trade_count += 1;
        }
    }

    // DURATION, hard: alert and cut trading on the first fast trade.
    let mut duration = RiskRule::new("fast trade", RuleType::Duration, RuleSeverity::Hard);
    duration.description = Some("alert when a trade lasts less than 60 seconds".to_string());
    duration.min_duration_seconds = Some(60);
    let duration = store.insert_rule(duration).await;
    store
        .insert_action(
            duration.id,
            ActionType::Email,
            1,
            Some(json!({ "email_to": "risk@example.com" })),
        )
        .await;
    store
        .insert_action(duration.id, ActionType::DisableTrading, 2, None)
        .await;

    // VOLUME, soft: accumulate three incidents in 24h before notifying.
    let mut volume = RiskRule::new("volume control", RuleType::Volume, RuleSeverity::Soft);
    volume.description =
        Some("volume outside 0.5x - 2.0x of the historical average".to_string());
    volume.min_factor = Some(dec!(0.5));
    volume.max_factor = Some(dec!(2.0));
    volume.lookback_trades = Some(5);
    volume.incidents_before_action = Some(3);
    let volume = store.insert_rule(volume).await;
    store
        .insert_action(
            volume.id,
            ActionType::Email,
            1,
            Some(json!({ "email_to": "alerts@example.com" })),
        )
        .await;
    store
        .insert_action(
            volume.id,
            ActionType::Slack,
            2,
            Some(json!({ "channel": "#risk-alerts" })),
        )
        .await;

    // OPEN_TRADES, soft: more than 3 open trades inside 30 minutes.
    let mut open_trades =
        RiskRule::new("too many open trades", RuleType::OpenTrades, RuleSeverity::Soft);
    open_trades.description = Some("more than 3 open trades in 30 minutes".to_string());
    open_trades.time_window_minutes = Some(30);
    open_trades.max_open_trades = Some(3);
    open_trades.incidents_before_action = Some(2);
    let open_trades = store.insert_rule(open_trades).await;
    store
        .insert_action(
            open_trades.id,
            ActionType::Email,
            1,
            Some(json!({ "email_to": "manager@example.com" })),
        )
        .await;
    store
        .insert_action(
            open_trades.id,
            ActionType::Slack,
            2,
            Some(json!({ "channel": "#trading-monitor" })),
        )
        .await;

    log::info!(
        "seeded {} accounts, {} trades, 3 rules",
        accounts.len(),
        trade_count
    );

    Ok(accounts)
}
