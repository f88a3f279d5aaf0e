//! The strategy set (spec C4): a polymorphic `Strategy::analyse(ctx) ->
//! StrategyOutcome` capability with three variants — technical-only,
//! ticker-news, and autonomous. Pure logic crate: no exchange calls, no
//! persistence. The `news` dependency is a read-only shared cache, not
//! a network client owned by this crate.

pub mod autonomous;
pub mod context;
pub mod error;
pub mod factory;
pub mod technical;
pub mod ticker_news;

pub use autonomous::AutonomousStrategy;
pub use context::{StrategyContext, SymbolMode};
pub use error::StrategyError;
pub use factory::create_strategy;
pub use technical::TechnicalStrategy;
pub use ticker_news::TickerNewsStrategy;

use async_trait::async_trait;
use core_types::Signal;
use rust_decimal::Decimal;

/// The outcome of one `analyse` call: the `Signal` itself, plus the
/// strategy-specific sizing/stop overrides that ride alongside it.
/// `position_size_fraction` scales the quote amount the loop would
/// otherwise spend (1.0 = use the full amount). The distance overrides
/// are absolute currency offsets from whatever entry price the fill
/// actually lands at — `stop_loss_price = entry - distance`,
/// `take_profit_price = entry + distance` — so they apply whether the
/// strategy evaluated against the last close before a BUY or the live
/// position afterwards. `None` leaves the percentage-based defaults
/// from the risk crate in force.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub signal: Signal,
    pub position_size_fraction: Decimal,
    pub stop_loss_distance_override: Option<Decimal>,
    pub take_profit_distance_override: Option<Decimal>,
}

impl StrategyOutcome {
    pub fn plain(signal: Signal) -> Self {
        Self {
            signal,
            position_size_fraction: Decimal::ONE,
            stop_loss_distance_override: None,
            take_profit_distance_override: None,
        }
    }
}

/// The trait every strategy variant implements. `analyse` is async
/// because the news-backed variants consult the shared `NewsService`
/// cache, which may make an outbound LLM call on a cache miss.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn symbol_mode(&self) -> SymbolMode;

    async fn analyse(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, StrategyError>;
}
