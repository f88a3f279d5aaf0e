//! Orphan-position auto-adoption (spec §4.7.4): on supervisor start,
//! any base asset with a positive free balance and no bot config
//! already targeting its quote-paired symbol becomes a new *stopped*
//! bot, pre-seeded with a position snapshot reconstructed from the
//! live balance.

use crate::error::SupervisorError;
use crate::registry::BotRegistry;
use accounting::AllocationAccountant;
use chrono::Utc;
use core_types::{BotConfig, BotRunState, CapitalAddition, OrderSide, PositionSnapshot, StrategyKind};
use exchange_client::ExchangeClient;
use position_store::PositionStore;
use risk::RiskParams;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

/// Quote asset every orphan symbol is paired against (spec §1: USDT).
const QUOTE_ASSET: &str = "USDT";

/// Scans exchange balances for orphaned positions and adopts each one
/// as a new stopped bot. Returns the configs created, for the caller
/// to log/broadcast.
pub async fn detect_and_adopt(
    registry: &dyn BotRegistry,
    exchange: &dyn ExchangeClient,
    position_store: &PositionStore,
    risk_defaults: &RiskParams,
    min_notional: Decimal,
) -> Result<Vec<BotConfig>, SupervisorError> {
    let existing = registry.list_bots().await?;
    let existing_symbols: std::collections::HashSet<String> =
        existing.iter().map(|b| b.symbol.clone()).collect();

    let balances = exchange.get_account_balances().await?;
    let usdt_free = balances
        .iter()
        .find(|(asset, _)| asset == QUOTE_ASSET)
        .map(|(_, b)| b.free)
        .unwrap_or(Decimal::ZERO);

    // Candidates: every non-quote asset with free balance and no
    // existing bot config for its symbol, dedup'd regardless of that
    // bot's run state — a stopped, not-yet-started orphan bot from a
    // prior sweep must not be re-adopted as a duplicate on every
    // restart.
    let mut candidates = Vec::new();
    for (asset, balance) in &balances {
        if asset == QUOTE_ASSET || balance.free.is_zero() {
            continue;
        }
        let symbol = format!("{asset}{QUOTE_ASSET}");
        if existing_symbols.contains(&symbol) {
            continue;
        }
        let price = match exchange.get_price(&symbol).await {
            Ok(p) => p,
            Err(_) => continue, // unlisted pair against USDT, nothing to adopt
        };
        let estimated_value = balance.free * price;
        candidates.push((symbol, balance.free, price, estimated_value));
    }

    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let per_bot_allocation =
        AllocationAccountant::default_orphan_allocation(usdt_free, candidates.len(), min_notional);

    let mut adopted = Vec::new();
    for (symbol, quantity, price, estimated_value) in candidates {
        let now = Utc::now();
        let bot_id = Uuid::new_v4();

        let stop_loss_price = risk_defaults.stop_loss_price(price)?;
        let take_profit_price = risk_defaults.take_profit_price(price)?;
        let max_hold_until = now + risk_defaults.max_hold;

        let config = BotConfig {
            bot_id,
            name: format!("orphan-{symbol}"),
            symbol: symbol.clone(),
            strategy: StrategyKind::Technical,
            strategy_params: json!({}),
            allocated: per_bot_allocation,
            state: BotRunState::Stopped,
            has_traded: true,
            orphan_adopted: true,
            adopted_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        let snapshot = PositionSnapshot {
            bot_id,
            symbol,
            side: OrderSide::Buy,
            quantity,
            entry_price: price,
            opened_at: now,
            max_hold_until,
            stop_loss_price,
            take_profit_price,
            // Resolved open question (DESIGN.md): the current market
            // value at adoption time, not the placeholder allocation,
            // since that is the only cost figure this position ever had.
            initial_investment: estimated_value,
            capital_additions: Vec::<CapitalAddition>::new(),
            last_updated: now,
        };

        registry.insert_bot(&config).await?;
        position_store.save(&snapshot)?;
        adopted.push(config);
    }

    Ok(adopted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FileBotRegistry;
    use async_trait::async_trait;
    use configuration::RiskDefaults;
    use core_types::{Kline, OrderRequest};
    use exchange_client::{AssetBalance, error::ExchangeError, FillResult, SymbolFilters};
    use rust_decimal_macros::dec;

    struct StubExchange {
        balances: Vec<(String, AssetBalance)>,
        prices: std::collections::HashMap<String, Decimal>,
    }

    #[async_trait]
    impl ExchangeClient for StubExchange {
        async fn get_balance(&self, asset: &str) -> Result<AssetBalance, ExchangeError> {
            Ok(self
                .balances
                .iter()
                .find(|(a, _)| a == asset)
                .map(|(_, b)| *b)
                .unwrap_or(AssetBalance { free: Decimal::ZERO, locked: Decimal::ZERO }))
        }

        async fn get_account_balances(&self) -> Result<Vec<(String, AssetBalance)>, ExchangeError> {
            Ok(self.balances.clone())
        }

        async fn get_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
            self.prices.get(symbol).copied().ok_or_else(|| ExchangeError::BadSymbol(symbol.to_string()))
        }

        async fn get_klines(&self, _symbol: &str, _interval: &str, _limit: u32) -> Result<Vec<Kline>, ExchangeError> {
            Ok(Vec::new())
        }

        async fn get_symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters, ExchangeError> {
            unimplemented!("not needed for orphan detection")
        }

        async fn market_order(&self, _order: &OrderRequest) -> Result<FillResult, ExchangeError> {
            unimplemented!("not needed for orphan detection")
        }
    }

    fn risk() -> RiskParams {
        RiskParams::from_defaults(&RiskDefaults {
            stop_loss_pct: dec!(0.03),
            take_profit_pct: dec!(0.05),
            min_confidence: dec!(0.70),
            max_hold_hours: 24,
            check_interval_secs: 900,
            reset_hold_on_add: true,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn adopts_every_non_quote_balance_as_a_stopped_bot() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), Vec::new());
        let store = PositionStore::new(dir.path());

        let exchange = StubExchange {
            balances: vec![
                ("USDT".to_string(), AssetBalance { free: dec!(454.38), locked: Decimal::ZERO }),
                ("BTC".to_string(), AssetBalance { free: dec!(0.00016), locked: Decimal::ZERO }),
                ("ETH".to_string(), AssetBalance { free: dec!(0.0042), locked: Decimal::ZERO }),
                ("SOL".to_string(), AssetBalance { free: dec!(0.909), locked: Decimal::ZERO }),
            ],
            prices: [
                ("BTCUSDT".to_string(), dec!(60000)),
                ("ETHUSDT".to_string(), dec!(3000)),
                ("SOLUSDT".to_string(), dec!(150)),
            ]
            .into_iter()
            .collect(),
        };

        let adopted = detect_and_adopt(&registry, &exchange, &store, &risk(), dec!(10)).await.unwrap();

        assert_eq!(adopted.len(), 3);
        for config in &adopted {
            assert_eq!(config.state, BotRunState::Stopped);
            assert!(config.has_traded);
            assert!(config.orphan_adopted);
            let snapshot = store.load(config.bot_id).unwrap().unwrap();
            assert!(snapshot.stop_loss_price < snapshot.entry_price);
            assert!(snapshot.entry_price < snapshot.take_profit_price);
        }

        // spec S5: (454.38 * 0.9) / 3 ≈ 136.31
        let expected_alloc = (dec!(454.38) * dec!(0.9)) / dec!(3);
        assert_eq!(adopted[0].allocated, expected_alloc);
    }

    #[tokio::test]
    async fn skips_assets_already_owned_by_an_existing_bot() {
        let dir = tempfile::tempdir().unwrap();
        let existing = BotConfig {
            bot_id: Uuid::new_v4(),
            name: "manual-btc".to_string(),
            symbol: "BTCUSDT".to_string(),
            strategy: StrategyKind::Technical,
            strategy_params: json!({}),
            allocated: dec!(100),
            state: BotRunState::Running,
            has_traded: true,
            orphan_adopted: false,
            adopted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), vec![existing]);
        let store = PositionStore::new(dir.path());

        let exchange = StubExchange {
            balances: vec![
                ("USDT".to_string(), AssetBalance { free: dec!(100), locked: Decimal::ZERO }),
                ("BTC".to_string(), AssetBalance { free: dec!(0.01), locked: Decimal::ZERO }),
            ],
            prices: [("BTCUSDT".to_string(), dec!(60000))].into_iter().collect(),
        };

        let adopted = detect_and_adopt(&registry, &exchange, &store, &risk(), dec!(10)).await.unwrap();
        assert!(adopted.is_empty());
    }

    #[tokio::test]
    async fn adopts_sub_min_notional_balances_too() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileBotRegistry::new(dir.path().join("bots.toml"), Vec::new());
        let store = PositionStore::new(dir.path());

        let exchange = StubExchange {
            balances: vec![
                ("USDT".to_string(), AssetBalance { free: dec!(100), locked: Decimal::ZERO }),
                ("DOGE".to_string(), AssetBalance { free: dec!(0.001), locked: Decimal::ZERO }),
            ],
            prices: [("DOGEUSDT".to_string(), dec!(0.1))].into_iter().collect(),
        };

        let adopted = detect_and_adopt(&registry, &exchange, &store, &risk(), dec!(10)).await.unwrap();
        assert_eq!(adopted.len(), 1);
    }
}
