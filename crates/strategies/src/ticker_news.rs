use crate::context::{StrategyContext, SymbolMode};
use crate::error::StrategyError;
use crate::technical::TechnicalStrategy;
use crate::{Strategy, StrategyOutcome};
use async_trait::async_trait;
use news::NewsService;
use std::sync::Arc;

/// Entry decisions come from a batch analysis of cached news filtered
/// to the bot's symbol; once a position is open, exits are gated by
/// the technical-only strategy rather than by news (spec §4.4).
pub struct TickerNewsStrategy {
    news: Arc<NewsService>,
    technical: TechnicalStrategy,
}

impl TickerNewsStrategy {
    pub fn new(news: Arc<NewsService>) -> Self {
        Self {
            news,
            technical: TechnicalStrategy::new(),
        }
    }
}

#[async_trait]
impl Strategy for TickerNewsStrategy {
    fn symbol_mode(&self) -> SymbolMode {
        SymbolMode::Fixed
    }

    async fn analyse(&self, ctx: &StrategyContext<'_>) -> Result<StrategyOutcome, StrategyError> {
        if ctx.position.is_some() {
            return self.technical.analyse(ctx).await;
        }

        let relevant = NewsService::filter_for_symbol(ctx.news, ctx.symbol);
        let owned: Vec<_> = relevant.into_iter().cloned().collect();
        let signal = self.news.analyse_batch(&owned, Some(ctx.symbol)).await;
        Ok(StrategyOutcome::plain(signal))
    }
}
