use crate::context::{StrategyContext, SymbolMode};
use crate::error::StrategyError;
use crate::{Strategy, StrategyOutcome};
use async_trait::async_trait;
use core_types::SignalAction;
use exchange_client::ExchangeClient;
use news::NewsService;
use std::sync::Arc;
use tracing::warn;

/// Scans the entire cached news set (not filtered to any one symbol)
/// and lets the LLM nominate a `recommended_symbol`. Advisory: the
/// bot's configured symbol is only a starting point, overridden for
/// the next action when the analyser picks a different one. Before
/// acting, the loop (via this strategy) confirms the nominated symbol
/// is actually tradeable; an unlisted or filter-rejected symbol
/// downgrades the signal to HOLD rather than failing the cycle.
pub struct AutonomousStrategy {
    news: Arc<NewsService>,
    exchange: Arc<dyn ExchangeClient>,
}

impl AutonomousStrategy {
    pub fn new(news: Arc<NewsService>, exchange: Arc<dyn ExchangeClient>) -> Self {
        Self { news, exchange }
    }
}

#[async_trait]
impl Strategy for AutonomousStrategy {
    fn symbol_mode(&self) -> SymbolMode {
        SymbolMode::Advisory
    }

    async fn analyse(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, StrategyError> {
        let mut signal = self.news.analyse_batch(ctx.news, Some("any")).await;

        if signal.action != SignalAction::Hold {
            let candidate = signal.symbol_hint.clone().unwrap_or_else(|| ctx.symbol.to_string());
            match self.exchange.get_symbol_filters(&candidate).await {
                Ok(_) => {}
                Err(e) => {
                    warn!(symbol = %candidate, error = %e, "autonomous strategy nominated an untradeable symbol, downgrading to HOLD");
                    signal.action = SignalAction::Hold;
                    signal.confidence = rust_decimal::Decimal::ZERO;
                }
            }
        }

        Ok(StrategyOutcome::plain(signal))
    }
}
