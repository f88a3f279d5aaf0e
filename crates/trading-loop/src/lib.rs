//! The per-bot state machine (spec C6): one independent async task per
//! bot, cycling FLAT → LONG → FLAT (or pausing in COOLDOWN), reading
//! fresh balances every pass and never holding a lock shared with
//! other bots (spec §5).

pub mod error;

pub use error::TradingLoopError;

use chrono::Utc;
use core_types::{
    BotState, CapitalAddition, ExitReason, NewsArticle, OrderSide, PositionSnapshot,
};
use events::{BotEvent, CrashEvent, CycleSummary, ExitEvent, HaltEvent, StateTransition};
use exchange_client::{ExchangeClient, FillResult, SymbolFilters};
use executor::{submit_buy, submit_sell, weighted_average_entry};
use news::NewsService;
use position_store::PositionStore;
use risk::RiskParams;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use strategies::{Strategy, StrategyContext, StrategyOutcome, SymbolMode};
use tokio::sync::{broadcast, watch};
use tokio::time::Duration;
use uuid::Uuid;

/// Default kline interval the strategies evaluate against. Not the
/// same thing as the cycle cadence: a bot wakes every `cycle_interval`
/// but still reads a window of sub-interval candles each time.
const KLINE_INTERVAL: &str = "15m";
const KLINE_LOOKBACK: u32 = 100;

/// Quote currency every bot's allocation and balances are denominated
/// in (spec §1: USDT). Not configurable per bot — the spec's cash pool
/// is a single shared USDT balance.
const QUOTE_ASSET: &str = "USDT";

/// Backoff window entered after an `InsufficientBalance` buy attempt
/// (spec §4.6 COOLDOWN).
const COOLDOWN_SECS: u64 = 300;

/// Fixed quote-currency reserve left untouched on an add-to-position
/// buy (spec §4.6, scenario S2).
const ADD_TO_POSITION_RESERVE: Decimal = dec!(20);

/// Everything a bot's trading loop needs, injected by the supervisor.
/// Shared handles (`exchange`, `news`) are cloned `Arc`s; the strategy
/// and position store are owned by this one bot's loop.
pub struct BotLoop {
    bot_id: Uuid,
    symbol: String,
    allocated: Decimal,
    has_traded: bool,
    state: BotState,
    position: Option<PositionSnapshot>,
    strategy: Box<dyn Strategy>,
    exchange: Arc<dyn ExchangeClient>,
    news: Arc<NewsService>,
    position_store: PositionStore,
    risk_defaults: risk::RiskParams,
    cycle_interval: Duration,
    events: broadcast::Sender<BotEvent>,
}

/// Why a bot's loop returned control to the supervisor.
#[derive(Debug, Clone)]
pub enum BotExit {
    /// Cooperative stop request observed; snapshot is flushed.
    Stopped,
    /// An unrecoverable error halted the bot; carries the last error
    /// for the registry's `last_error` field.
    Halted(String),
}

impl BotLoop {
    /// Builds a bot loop, loading whatever position snapshot already
    /// exists on disk (spec §4.5: "load on bot start").
    pub fn new(
        bot_id: Uuid,
        symbol: String,
        allocated: Decimal,
        has_traded: bool,
        strategy: Box<dyn Strategy>,
        exchange: Arc<dyn ExchangeClient>,
        news: Arc<NewsService>,
        position_store: PositionStore,
        risk_defaults: RiskParams,
        cycle_interval: Duration,
        events: broadcast::Sender<BotEvent>,
    ) -> Result<Self, TradingLoopError> {
        let position = position_store.load(bot_id).map_err(|e| {
            TradingLoopError::CorruptSnapshot(format!("bot {bot_id}: {e}"))
        })?;
        let state = if position.is_some() { BotState::Long } else { BotState::Flat };

        Ok(Self {
            bot_id,
            symbol,
            allocated,
            has_traded,
            state,
            position,
            strategy,
            exchange,
            news,
            position_store,
            risk_defaults,
            cycle_interval,
            events,
        })
    }

    /// Runs cycles until the cancellation watch fires or the bot
    /// halts. This is the task body the supervisor spawns per bot.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> BotExit {
        loop {
            if *cancel.borrow() {
                return BotExit::Stopped;
            }

            let sleep_for = match self.run_cycle().await {
                Ok(duration) => duration,
                Err(e) if e.is_halting() => {
                    tracing::error!(bot_id = %self.bot_id, error = %e, "bot halted");
                    let _ = self.events.send(BotEvent::Halt(HaltEvent {
                        bot_id: self.bot_id,
                        timestamp: Utc::now(),
                        last_error: e.to_string(),
                    }));
                    return BotExit::Halted(e.to_string());
                }
                Err(e) => {
                    tracing::warn!(bot_id = %self.bot_id, error = %e, "cycle failed, retrying next interval");
                    self.cycle_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return BotExit::Stopped;
                    }
                }
            }
        }
    }

    /// Runs one pass of the cycle appropriate to the current state and
    /// returns how long to sleep before the next one.
    async fn run_cycle(&mut self) -> Result<Duration, TradingLoopError> {
        let state_before = self.state;

        let sleep_for = match self.state {
            BotState::Flat => self.cycle_flat().await?,
            BotState::Long => self.cycle_long().await?,
            BotState::Cooldown => {
                self.state = BotState::Flat;
                Duration::from_secs(0)
            }
            BotState::Halted => return Err(TradingLoopError::OperatorHalt("already halted".into())),
        };

        if state_before != self.state {
            let _ = self.events.send(BotEvent::StateTransition(StateTransition {
                bot_id: self.bot_id,
                timestamp: Utc::now(),
                from: state_before,
                to: self.state,
                reason: format!("{state_before:?} -> {:?}", self.state),
            }));
        }

        Ok(sleep_for)
    }

    async fn available_quote(&self) -> Result<Decimal, TradingLoopError> {
        Ok(self.exchange.get_balance(QUOTE_ASSET).await?.free)
    }

    async fn recent_klines(&self) -> Result<Vec<core_types::Kline>, TradingLoopError> {
        Ok(self
            .exchange
            .get_klines(&self.symbol, KLINE_INTERVAL, KLINE_LOOKBACK)
            .await?)
    }

    async fn recent_news(&self) -> Vec<NewsArticle> {
        self.news.articles().await
    }

    fn account_snapshot(&self, usdt_free: Decimal) -> core_types::AccountSnapshot {
        core_types::AccountSnapshot {
            bot_id: self.bot_id,
            state: self.state,
            usdt_allocated: self.allocated,
            usdt_free,
            position: self.position.clone(),
            unrealized_pnl: None,
            last_cycle_at: Some(Utc::now()),
        }
    }

    fn emit_cycle(
        &self,
        state_before: BotState,
        signal_action: Option<core_types::SignalAction>,
        confidence: Option<Decimal>,
        price: Option<Decimal>,
        available_quote: Option<Decimal>,
        order_id: Option<Uuid>,
    ) {
        let summary = CycleSummary {
            bot_id: self.bot_id,
            timestamp: Utc::now(),
            state_before,
            state_after: self.state,
            signal: signal_action,
            confidence,
            price,
            available_quote,
            order_id,
        };
        tracing::info!(
            bot_id = %self.bot_id,
            state_before = ?summary.state_before,
            state_after = ?summary.state_after,
            signal = ?summary.signal,
            confidence = ?summary.confidence,
            price = ?summary.price,
            available_quote = ?summary.available_quote,
            order_id = ?summary.order_id,
            "bot cycle"
        );
        let _ = self.events.send(BotEvent::Cycle(summary));
    }

    /// Spec §4.6 "Cycle (state=FLAT)".
    async fn cycle_flat(&mut self) -> Result<Duration, TradingLoopError> {
        let state_before = self.state;
        let usdt_free = self.available_quote().await?;
        let klines = self.recent_klines().await?;
        let news = self.recent_news().await;
        let account = self.account_snapshot(usdt_free);

        let ctx = StrategyContext {
            symbol: &self.symbol,
            klines: &klines,
            position: None,
            account: &account,
            news: &news,
        };
        let outcome = self.strategy.analyse(&ctx).await?;
        let signal = &outcome.signal;
        let risk = self.risk_defaults.apply_dynamic_adjustment(signal);

        if signal.action != core_types::SignalAction::Buy || signal.confidence < risk.min_confidence {
            self.emit_cycle(state_before, Some(signal.action), Some(signal.confidence), None, Some(usdt_free), None);
            return Ok(self.cycle_interval);
        }

        // Advisory strategies (spec §4.4, autonomous) may nominate a
        // different symbol for this entry; a fixed-symbol strategy never
        // sets `symbol_hint`, so this is a no-op for technical/ticker-news.
        // Once a position is open the bot is pinned to it (spec §4.6
        // tie-break), since this path only runs while flat.
        if self.strategy.symbol_mode() == SymbolMode::Advisory {
            if let Some(hint) = &signal.symbol_hint {
                if *hint != self.symbol {
                    tracing::info!(bot_id = %self.bot_id, from = %self.symbol, to = %hint, "advisory strategy switched trading symbol");
                    self.symbol = hint.clone();
                }
            }
        }

        let filters = self.exchange.get_symbol_filters(&self.symbol).await?;

        // Spec §4.6 FLAT step 4: the first-ever trade spends the full
        // allocation (S1); the ATR sizing fraction only scales back a
        // reinvest entry, never the bot's initial commitment.
        let quote_to_spend = if !self.has_traded {
            self.allocated
        } else {
            (usdt_free * dec!(0.99)).min(self.allocated) * outcome.position_size_fraction
        };

        if quote_to_spend < filters.min_notional {
            tracing::warn!(bot_id = %self.bot_id, quote_to_spend = %quote_to_spend, min_notional = %filters.min_notional, "insufficient balance for entry, entering cooldown");
            self.state = BotState::Cooldown;
            self.emit_cycle(state_before, Some(signal.action), Some(signal.confidence), None, Some(usdt_free), None);
            return Ok(Duration::from_secs(COOLDOWN_SECS));
        }

        let fill = submit_buy(self.exchange.as_ref(), &self.symbol, quote_to_spend, &filters).await?;
        self.open_position(&fill, &risk, &outcome)?;
        self.has_traded = true;
        self.state = BotState::Long;

        self.emit_cycle(
            state_before,
            Some(signal.action),
            Some(signal.confidence),
            Some(fill.fill_price),
            Some(usdt_free),
            None,
        );
        Ok(self.cycle_interval)
    }

    fn open_position(
        &mut self,
        fill: &FillResult,
        risk: &RiskParams,
        outcome: &StrategyOutcome,
    ) -> Result<(), TradingLoopError> {
        let now = Utc::now();
        let stop_loss_price = match outcome.stop_loss_distance_override {
            Some(distance) => fill.fill_price - distance,
            None => risk.stop_loss_price(fill.fill_price)?,
        };
        let take_profit_price = match outcome.take_profit_distance_override {
            Some(distance) => fill.fill_price + distance,
            None => risk.take_profit_price(fill.fill_price)?,
        };

        let snapshot = PositionSnapshot {
            bot_id: self.bot_id,
            symbol: self.symbol.clone(),
            side: OrderSide::Buy,
            quantity: fill.filled_qty,
            entry_price: fill.fill_price,
            opened_at: now,
            max_hold_until: now + risk.max_hold,
            stop_loss_price,
            take_profit_price,
            initial_investment: fill.quote_spent,
            capital_additions: Vec::new(),
            last_updated: now,
        };
        self.position_store.save(&snapshot)?;
        self.position = Some(snapshot);
        Ok(())
    }

    /// Spec §4.6 "Cycle (state=LONG)".
    async fn cycle_long(&mut self) -> Result<Duration, TradingLoopError> {
        let state_before = self.state;
        let position = self
            .position
            .clone()
            .ok_or_else(|| TradingLoopError::CorruptSnapshot("LONG state with no position snapshot".into()))?;

        let price = self.exchange.get_price(&self.symbol).await?;
        let now = Utc::now();

        // Priority order per spec §4.6: stop-loss, take-profit, max-hold,
        // strategy SELL. Stop-loss wins ties (scenario S3).
        let exit_reason = if price <= position.stop_loss_price {
            Some(ExitReason::StopLoss)
        } else if price >= position.take_profit_price {
            Some(ExitReason::TakeProfit)
        } else if now >= position.max_hold_until {
            Some(ExitReason::MaxHoldExpired)
        } else {
            None
        };

        if let Some(reason) = exit_reason {
            self.close_position(&position, price, reason).await?;
            self.emit_cycle(state_before, None, None, Some(price), None, None);
            return Ok(self.cycle_interval);
        }

        let usdt_free = self.available_quote().await?;
        let klines = self.recent_klines().await?;
        let news = self.recent_news().await;
        let account = self.account_snapshot(usdt_free);

        let ctx = StrategyContext {
            symbol: &self.symbol,
            klines: &klines,
            position: Some(&position),
            account: &account,
            news: &news,
        };
        let outcome = self.strategy.analyse(&ctx).await?;
        let signal = &outcome.signal;
        let risk = self.risk_defaults.apply_dynamic_adjustment(signal);

        if signal.action == core_types::SignalAction::Sell && signal.confidence >= risk.min_confidence {
            self.close_position(&position, price, ExitReason::StrategySell).await?;
            self.emit_cycle(state_before, Some(signal.action), Some(signal.confidence), Some(price), Some(usdt_free), None);
            return Ok(self.cycle_interval);
        }

        if signal.action == core_types::SignalAction::Buy && signal.confidence >= risk.min_confidence {
            self.add_to_position(&position, usdt_free, &risk, &outcome).await?;
        }

        self.emit_cycle(state_before, Some(signal.action), Some(signal.confidence), Some(price), Some(usdt_free), None);
        Ok(self.cycle_interval)
    }

    async fn close_position(
        &mut self,
        position: &PositionSnapshot,
        price: Decimal,
        reason: ExitReason,
    ) -> Result<(), TradingLoopError> {
        let filters = self.exchange.get_symbol_filters(&self.symbol).await?;
        let fill = submit_sell(self.exchange.as_ref(), &self.symbol, position.quantity, price, &filters).await?;

        let cost_basis = position.initial_investment
            + position.capital_additions.iter().map(|c| c.amount).sum::<Decimal>();
        let realized_pnl = fill.quote_spent - cost_basis;

        let entry = core_types::TradeLogEntry {
            trade_id: Uuid::new_v4(),
            bot_id: self.bot_id,
            symbol: self.symbol.clone(),
            side: OrderSide::Sell,
            quantity: fill.filled_qty,
            price: fill.fill_price,
            quote_amount: fill.quote_spent,
            fee: Decimal::ZERO,
            realized_pnl: Some(realized_pnl),
            exit_reason: Some(reason),
            timestamp: fill.ts,
        };
        self.position_store.append_trade(&entry)?;
        self.position_store.delete(self.bot_id)?;
        self.position = None;
        self.state = BotState::Flat;

        let _ = self.events.send(BotEvent::Exit(ExitEvent {
            bot_id: self.bot_id,
            timestamp: Utc::now(),
            reason,
            realized_pnl,
        }));

        Ok(())
    }

    /// Spec §4.6 add-to-position path.
    async fn add_to_position(
        &mut self,
        position: &PositionSnapshot,
        usdt_free: Decimal,
        risk: &RiskParams,
        outcome: &StrategyOutcome,
    ) -> Result<(), TradingLoopError> {
        let add_quote =
            ((usdt_free * dec!(0.5)).min(usdt_free - ADD_TO_POSITION_RESERVE)) * outcome.position_size_fraction;
        let filters = self.exchange.get_symbol_filters(&self.symbol).await?;
        let floor = filters.min_notional.max(dec!(10));

        if add_quote < floor {
            return Ok(());
        }

        let fill = submit_buy(self.exchange.as_ref(), &self.symbol, add_quote, &filters).await?;

        let new_entry = weighted_average_entry(position.quantity, position.entry_price, fill.filled_qty, fill.fill_price);
        let new_qty = position.quantity + fill.filled_qty;
        let now = Utc::now();

        let mut capital_additions = position.capital_additions.clone();
        capital_additions.push(CapitalAddition {
            bot_id: self.bot_id,
            amount: fill.quote_spent,
            added_at: now,
        });

        let max_hold_until = if risk.reset_hold_on_add {
            now + risk.max_hold
        } else {
            position.max_hold_until
        };

        let snapshot = PositionSnapshot {
            bot_id: self.bot_id,
            symbol: self.symbol.clone(),
            side: OrderSide::Buy,
            quantity: new_qty,
            entry_price: new_entry,
            opened_at: position.opened_at,
            max_hold_until,
            stop_loss_price: match outcome.stop_loss_distance_override {
                Some(distance) => new_entry - distance,
                None => risk.stop_loss_price(new_entry)?,
            },
            take_profit_price: match outcome.take_profit_distance_override {
                Some(distance) => new_entry + distance,
                None => risk.take_profit_price(new_entry)?,
            },
            initial_investment: position.initial_investment,
            capital_additions,
            last_updated: now,
        };
        self.position_store.save(&snapshot)?;
        self.position = Some(snapshot);
        Ok(())
    }
}

/// Emitted by the supervisor when a spawned task itself panics or the
/// join handle errors out before `BotLoop::run` could return an
/// orderly `BotExit` (spec §4.7.3: crash, no auto-restart).
pub fn crash_event(bot_id: Uuid, last_error: String) -> BotEvent {
    BotEvent::Crash(CrashEvent {
        bot_id,
        timestamp: Utc::now(),
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{Kline, OrderRequest, Signal, SignalAction};
    use exchange_client::AssetBalance;
    use strategies::{StrategyError, StrategyOutcome, SymbolMode};

    struct StubExchange {
        balance: Decimal,
        price: Decimal,
        filters: SymbolFilters,
        fill_price: Decimal,
    }

    #[async_trait]
    impl ExchangeClient for StubExchange {
        async fn get_balance(&self, _asset: &str) -> Result<AssetBalance, exchange_client::error::ExchangeError> {
            Ok(AssetBalance { free: self.balance, locked: Decimal::ZERO })
        }

        async fn get_account_balances(&self) -> Result<Vec<(String, AssetBalance)>, exchange_client::error::ExchangeError> {
            Ok(vec![("USDT".to_string(), AssetBalance { free: self.balance, locked: Decimal::ZERO })])
        }

        async fn get_price(&self, _symbol: &str) -> Result<Decimal, exchange_client::error::ExchangeError> {
            Ok(self.price)
        }

        async fn get_klines(&self, _symbol: &str, interval: &str, _limit: u32) -> Result<Vec<Kline>, exchange_client::error::ExchangeError> {
            let t = Utc::now();
            Ok(vec![Kline {
                open_time: t,
                open: self.price,
                high: self.price,
                low: self.price,
                close: self.price,
                volume: dec!(100),
                close_time: t,
                interval: interval.to_string(),
            }])
        }

        async fn get_symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters, exchange_client::error::ExchangeError> {
            Ok(self.filters.clone())
        }

        async fn market_order(&self, order: &OrderRequest) -> Result<FillResult, exchange_client::error::ExchangeError> {
            match order.side {
                OrderSide::Buy => Ok(FillResult {
                    fill_price: self.fill_price,
                    filled_qty: order.quantity / self.fill_price,
                    quote_spent: order.quantity,
                    ts: Utc::now(),
                }),
                OrderSide::Sell => Ok(FillResult {
                    fill_price: self.fill_price,
                    filled_qty: order.quantity,
                    quote_spent: order.quantity * self.fill_price,
                    ts: Utc::now(),
                }),
            }
        }
    }

    impl Clone for SymbolFilters {
        fn clone(&self) -> Self {
            SymbolFilters { min_notional: self.min_notional, qty_step: self.qty_step, price_step: self.price_step }
        }
    }

    struct AlwaysBuyStrategy {
        confidence: Decimal,
    }

    #[async_trait]
    impl Strategy for AlwaysBuyStrategy {
        fn symbol_mode(&self) -> SymbolMode {
            SymbolMode::Fixed
        }

        async fn analyse(&self, _ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, StrategyError> {
            Ok(StrategyOutcome::plain(Signal {
                signal_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                action: SignalAction::Buy,
                confidence: self.confidence,
                sentiment: core_types::Sentiment::Neutral,
                urgency: core_types::Urgency::Moderate,
                risk_level: core_types::RiskLevel::Medium,
                reasoning: "test".to_string(),
                symbol_hint: None,
                source_article_ids: Vec::new(),
            }))
        }
    }

    fn test_risk() -> RiskParams {
        RiskParams::from_defaults(&configuration::RiskDefaults {
            stop_loss_pct: dec!(0.03),
            take_profit_pct: dec!(0.05),
            min_confidence: dec!(0.70),
            max_hold_hours: 24,
            check_interval_secs: 900,
            reset_hold_on_add: true,
        })
        .unwrap()
    }

    fn news_service() -> Arc<NewsService> {
        Arc::new(NewsService::new(&configuration::NewsConfig::default(), &configuration::LlmConfig::default()))
    }

    #[tokio::test]
    async fn first_buy_spends_full_allocation_and_opens_long() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let bot_id = Uuid::new_v4();
        let exchange: Arc<dyn ExchangeClient> = Arc::new(StubExchange {
            balance: dec!(1000),
            price: dec!(60_000),
            filters: SymbolFilters { min_notional: dec!(10), qty_step: dec!(0.00001), price_step: dec!(0.01) },
            fill_price: dec!(60_000),
        });
        let (tx, _rx) = broadcast::channel(16);

        let mut bot_loop = BotLoop::new(
            bot_id,
            "BTCUSDT".to_string(),
            dec!(100),
            false,
            Box::new(AlwaysBuyStrategy { confidence: dec!(0.9) }),
            exchange,
            news_service(),
            store.clone(),
            test_risk(),
            Duration::from_secs(900),
            tx,
        )
        .unwrap();

        bot_loop.run_cycle().await.unwrap();
        assert!(bot_loop.has_traded);
        assert_eq!(bot_loop.state, BotState::Long);
        let saved = store.load(bot_id).unwrap().unwrap();
        assert_eq!(saved.entry_price, dec!(60_000));
        assert_eq!(saved.initial_investment, dec!(100));
    }

    #[tokio::test]
    async fn low_balance_first_buy_enters_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let store = PositionStore::new(dir.path());
        let bot_id = Uuid::new_v4();
        let exchange: Arc<dyn ExchangeClient> = Arc::new(StubExchange {
            balance: dec!(4),
            price: dec!(60_000),
            filters: SymbolFilters { min_notional: dec!(10), qty_step: dec!(0.00001), price_step: dec!(0.01) },
            fill_price: dec!(60_000),
        });
        let (tx, _rx) = broadcast::channel(16);

        let mut bot_loop = BotLoop::new(
            bot_id,
            "BTCUSDT".to_string(),
            dec!(100),
            false,
            Box::new(AlwaysBuyStrategy { confidence: dec!(0.9) }),
            exchange,
            news_service(),
            store,
            test_risk(),
            Duration::from_secs(900),
            tx,
        )
        .unwrap();

        bot_loop.run_cycle().await.unwrap();
        assert!(!bot_loop.has_traded);
        assert_eq!(bot_loop.state, BotState::Cooldown);
    }
}
