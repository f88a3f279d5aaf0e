use crate::enums::{
    ArticleSentiment, BotRunState, BotState, ExitReason, OrderSide, OrderType, RiskLevel,
    Sentiment, SignalAction, StrategyKind, Urgency,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single OHLCV candle, always UTC-canonicalized at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub interval: String,
}

/// A request to place an order, prior to exchange-side rounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

/// A confirmed fill returned by the exchange (or simulated in tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: Uuid,
    pub client_order_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An article fetched from the configured news provider, normalised to
/// UTC on ingest (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub headline: String,
    pub body: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub sentiment: ArticleSentiment,
    pub tickers: Vec<String>,
    pub impact: Option<String>,
    pub urgency: Option<Urgency>,
    pub risk_level: Option<RiskLevel>,
}

/// The verdict produced by the AI analyser for one headline batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: SignalAction,
    pub confidence: Decimal,
    pub sentiment: Sentiment,
    pub urgency: Urgency,
    pub risk_level: RiskLevel,
    pub reasoning: String,
    pub symbol_hint: Option<String>,
    pub source_article_ids: Vec<String>,
}

/// The persisted, durable state of a single bot's open position
/// (spec C5, invariant I2). Absent while the bot is flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub bot_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub max_hold_until: DateTime<Utc>,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    /// Quote-currency cost of the first entry that opened this position.
    pub initial_investment: Decimal,
    /// Operator-added funds recorded while this position has been running.
    pub capital_additions: Vec<CapitalAddition>,
    pub last_updated: DateTime<Utc>,
}

/// A record of additional capital added to a bot's allocation mid-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalAddition {
    pub bot_id: Uuid,
    pub amount: Decimal,
    pub added_at: DateTime<Utc>,
}

/// One line of the append-only trade log (spec C5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub trade_id: Uuid,
    pub bot_id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub quote_amount: Decimal,
    pub fee: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub timestamp: DateTime<Utc>,
}

/// The persisted configuration for a single bot (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub bot_id: Uuid,
    pub name: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub strategy_params: Value,
    /// Quote-currency budget the operator has earmarked for this bot —
    /// the spend ceiling on its first entry, not a running balance.
    pub allocated: Decimal,
    pub state: BotRunState,
    /// Monotonic once set (invariant I3): survives restarts and flat
    /// periods, only cleared by explicit bot deletion/reset.
    pub has_traded: bool,
    pub orphan_adopted: bool,
    pub adopted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A point-in-time view of a bot's runtime state, for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub bot_id: Uuid,
    pub state: BotState,
    pub usdt_allocated: Decimal,
    pub usdt_free: Decimal,
    pub position: Option<PositionSnapshot>,
    pub unrealized_pnl: Option<Decimal>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}
