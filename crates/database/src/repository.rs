use crate::DbError;
use chrono::{DateTime, Utc};
use core_types::{BotConfig, BotRunState, ExitReason, OrderSide, StrategyKind, TradeLogEntry};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database: the bot-config registry (spec §3, §6) and a mirror of
/// the append-only trade log (spec C5) for the dashboard's historical
/// queries. It encapsulates all SQL behind a small, typed API.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

/// Raw row shape for the `bots` table. `strategy` and `run_state` are
/// stored as text and converted to their enum forms on the way out, since
/// `StrategyKind`/`BotRunState` have no direct Postgres mapping.
#[derive(Debug, Clone, FromRow)]
struct BotRow {
    bot_id: Uuid,
    name: String,
    symbol: String,
    strategy: String,
    strategy_params: JsonValue,
    allocated: Decimal,
    run_state: String,
    has_traded: bool,
    orphan_adopted: bool,
    adopted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BotRow> for BotConfig {
    type Error = DbError;

    fn try_from(row: BotRow) -> Result<Self, Self::Error> {
        Ok(BotConfig {
            bot_id: row.bot_id,
            name: row.name,
            symbol: row.symbol,
            strategy: strategy_from_str(&row.strategy)?,
            strategy_params: row.strategy_params,
            allocated: row.allocated,
            state: run_state_from_str(&row.run_state)?,
            has_traded: row.has_traded,
            orphan_adopted: row.orphan_adopted,
            adopted_at: row.adopted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn strategy_to_str(s: StrategyKind) -> &'static str {
    match s {
        StrategyKind::Technical => "technical",
        StrategyKind::TickerNews => "ticker_news",
        StrategyKind::Autonomous => "autonomous",
    }
}

fn strategy_from_str(s: &str) -> Result<StrategyKind, DbError> {
    match s {
        "technical" => Ok(StrategyKind::Technical),
        "ticker_news" => Ok(StrategyKind::TickerNews),
        "autonomous" => Ok(StrategyKind::Autonomous),
        other => Err(DbError::ConnectionConfigError(format!(
            "unknown strategy kind `{other}` in bots table"
        ))),
    }
}

fn run_state_to_str(s: BotRunState) -> &'static str {
    match s {
        BotRunState::Stopped => "stopped",
        BotRunState::Starting => "starting",
        BotRunState::Running => "running",
        BotRunState::Crashed => "crashed",
    }
}

fn run_state_from_str(s: &str) -> Result<BotRunState, DbError> {
    match s {
        "stopped" => Ok(BotRunState::Stopped),
        "starting" => Ok(BotRunState::Starting),
        "running" => Ok(BotRunState::Running),
        "crashed" => Ok(BotRunState::Crashed),
        other => Err(DbError::ConnectionConfigError(format!(
            "unknown run state `{other}` in bots table"
        ))),
    }
}

fn side_to_str(s: OrderSide) -> &'static str {
    match s {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn side_from_str(s: &str) -> Result<OrderSide, DbError> {
    match s {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(DbError::ConnectionConfigError(format!(
            "unknown order side `{other}` in trade_log table"
        ))),
    }
}

fn exit_reason_to_str(r: ExitReason) -> &'static str {
    match r {
        ExitReason::StopLoss => "stop_loss",
        ExitReason::TakeProfit => "take_profit",
        ExitReason::MaxHoldExpired => "max_hold_expired",
        ExitReason::StrategySell => "strategy_sell",
        ExitReason::ManualStop => "manual_stop",
    }
}

fn exit_reason_from_str(r: &str) -> Result<ExitReason, DbError> {
    match r {
        "stop_loss" => Ok(ExitReason::StopLoss),
        "take_profit" => Ok(ExitReason::TakeProfit),
        "max_hold_expired" => Ok(ExitReason::MaxHoldExpired),
        "strategy_sell" => Ok(ExitReason::StrategySell),
        "manual_stop" => Ok(ExitReason::ManualStop),
        other => Err(DbError::ConnectionConfigError(format!(
            "unknown exit reason `{other}` in trade_log table"
        ))),
    }
}

#[derive(Debug, Clone, FromRow)]
struct TradeLogRow {
    trade_id: Uuid,
    bot_id: Uuid,
    symbol: String,
    side: String,
    quantity: Decimal,
    price: Decimal,
    quote_amount: Decimal,
    fee: Decimal,
    realized_pnl: Option<Decimal>,
    exit_reason: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TryFrom<TradeLogRow> for TradeLogEntry {
    type Error = DbError;

    fn try_from(row: TradeLogRow) -> Result<Self, Self::Error> {
        Ok(TradeLogEntry {
            trade_id: row.trade_id,
            bot_id: row.bot_id,
            symbol: row.symbol,
            side: side_from_str(&row.side)?,
            quantity: row.quantity,
            price: row.price,
            quote_amount: row.quote_amount,
            fee: row.fee,
            realized_pnl: row.realized_pnl,
            exit_reason: row.exit_reason.as_deref().map(exit_reason_from_str).transpose()?,
            timestamp: row.timestamp,
        })
    }
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists every bot in the registry, running or stopped (spec §6
    /// `GET /api/overview`).
    pub async fn list_bots(&self) -> Result<Vec<BotConfig>, DbError> {
        let rows = sqlx::query_as::<_, BotRow>(
            "SELECT bot_id, name, symbol, strategy, strategy_params, allocated, run_state, \
             has_traded, orphan_adopted, adopted_at, created_at, updated_at \
             FROM bots ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BotConfig::try_from).collect()
    }

    /// Fetches a single bot's config by id (spec §6 `GET /api/bot/{id}`).
    pub async fn get_bot(&self, bot_id: Uuid) -> Result<BotConfig, DbError> {
        let row = sqlx::query_as::<_, BotRow>(
            "SELECT bot_id, name, symbol, strategy, strategy_params, allocated, run_state, \
             has_traded, orphan_adopted, adopted_at, created_at, updated_at \
             FROM bots WHERE bot_id = $1",
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        BotConfig::try_from(row)
    }

    /// Inserts a brand-new bot config (spec §6 `POST /api/bot`).
    pub async fn insert_bot(&self, bot: &BotConfig) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO bots (bot_id, name, symbol, strategy, strategy_params, allocated, \
             run_state, has_traded, orphan_adopted, adopted_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(bot.bot_id)
        .bind(&bot.name)
        .bind(&bot.symbol)
        .bind(strategy_to_str(bot.strategy))
        .bind(&bot.strategy_params)
        .bind(bot.allocated)
        .bind(run_state_to_str(bot.state))
        .bind(bot.has_traded)
        .bind(bot.orphan_adopted)
        .bind(bot.adopted_at)
        .bind(bot.created_at)
        .bind(bot.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Overwrites the mutable fields of an existing bot config (spec §6
    /// `PATCH /api/bot/{id}`). Does not move `created_at`, `bot_id`, or
    /// `has_traded` (invariant I3: monotonic, never reset here).
    pub async fn update_bot(&self, bot: &BotConfig) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE bots SET name = $2, symbol = $3, strategy = $4, strategy_params = $5, \
             allocated = $6, run_state = $7, has_traded = $8, orphan_adopted = $9, \
             adopted_at = $10, updated_at = $11 WHERE bot_id = $1",
        )
        .bind(bot.bot_id)
        .bind(&bot.name)
        .bind(&bot.symbol)
        .bind(strategy_to_str(bot.strategy))
        .bind(&bot.strategy_params)
        .bind(bot.allocated)
        .bind(run_state_to_str(bot.state))
        .bind(bot.has_traded)
        .bind(bot.orphan_adopted)
        .bind(bot.adopted_at)
        .bind(bot.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Updates only the run-state column, used by the supervisor on
    /// start/stop/crash transitions without re-sending the whole config.
    pub async fn update_run_state(
        &self,
        bot_id: Uuid,
        state: BotRunState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE bots SET run_state = $2, updated_at = $3 WHERE bot_id = $1")
            .bind(bot_id)
            .bind(run_state_to_str(state))
            .bind(updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Deletes a bot config (spec §6 `DELETE /api/bot/{id}`).
    pub async fn delete_bot(&self, bot_id: Uuid) -> Result<(), DbError> {
        let result = sqlx::query("DELETE FROM bots WHERE bot_id = $1")
            .bind(bot_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Appends a trade to the Postgres mirror of the local trade log
    /// (spec C5). The local append-only file in `position-store` remains
    /// the durable source of truth; this mirror only serves the
    /// dashboard's historical queries.
    pub async fn insert_trade_log_entry(&self, entry: &TradeLogEntry) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO trade_log (trade_id, bot_id, symbol, side, quantity, price, \
             quote_amount, fee, realized_pnl, exit_reason, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(entry.trade_id)
        .bind(entry.bot_id)
        .bind(&entry.symbol)
        .bind(side_to_str(entry.side))
        .bind(entry.quantity)
        .bind(entry.price)
        .bind(entry.quote_amount)
        .bind(entry.fee)
        .bind(entry.realized_pnl)
        .bind(entry.exit_reason.map(exit_reason_to_str))
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches the most recent trades for a bot, newest first (spec §6
    /// `GET /api/bot/{id}`'s trade history panel).
    pub async fn list_trade_log_for_bot(
        &self,
        bot_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TradeLogEntry>, DbError> {
        let rows = sqlx::query_as::<_, TradeLogRow>(
            "SELECT trade_id, bot_id, symbol, side, quantity, price, quote_amount, fee, \
             realized_pnl, exit_reason, timestamp \
             FROM trade_log WHERE bot_id = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(bot_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TradeLogEntry::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_kind_round_trips_through_its_text_encoding() {
        for kind in [StrategyKind::Technical, StrategyKind::TickerNews, StrategyKind::Autonomous] {
            let encoded = strategy_to_str(kind);
            assert_eq!(strategy_from_str(encoded).unwrap(), kind);
        }
    }

    #[test]
    fn run_state_round_trips_through_its_text_encoding() {
        for state in [BotRunState::Stopped, BotRunState::Starting, BotRunState::Running, BotRunState::Crashed] {
            let encoded = run_state_to_str(state);
            assert_eq!(run_state_from_str(encoded).unwrap(), state);
        }
    }

    #[test]
    fn order_side_round_trips_through_its_text_encoding() {
        for side in [OrderSide::Buy, OrderSide::Sell] {
            let encoded = side_to_str(side);
            assert_eq!(side_from_str(encoded).unwrap(), side);
        }
    }

    #[test]
    fn exit_reason_round_trips_through_its_text_encoding() {
        for reason in [
            ExitReason::StopLoss,
            ExitReason::TakeProfit,
            ExitReason::MaxHoldExpired,
            ExitReason::StrategySell,
            ExitReason::ManualStop,
        ] {
            let encoded = exit_reason_to_str(reason);
            assert_eq!(exit_reason_from_str(encoded).unwrap(), reason);
        }
    }

    #[test]
    fn unknown_strategy_text_is_rejected() {
        assert!(strategy_from_str("scalping").is_err());
    }
}
