use crate::{AutonomousStrategy, Strategy, TechnicalStrategy, TickerNewsStrategy};
use core_types::StrategyKind;
use exchange_client::ExchangeClient;
use news::NewsService;
use std::sync::Arc;

/// Builds the strategy instance for a bot's configured `StrategyKind`.
/// `news` and `exchange` are shared, long-lived handles injected by the
/// supervisor rather than owned by the strategy.
pub fn create_strategy(
    kind: StrategyKind,
    news: Arc<NewsService>,
    exchange: Arc<dyn ExchangeClient>,
) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Technical => Box::new(TechnicalStrategy::new()),
        StrategyKind::TickerNews => Box::new(TickerNewsStrategy::new(news)),
        StrategyKind::Autonomous => Box::new(AutonomousStrategy::new(news, exchange)),
    }
}
