//! The shared news-cache and AI-analyser layer (spec C3). One
//! `NewsService` is shared across all bots, since articles and
//! LLM verdicts are independent of which bot is asking.

pub mod analyser;
pub mod cache;
pub mod error;
pub mod provider;

use analyser::{degraded_signal, HttpLlmAnalyser, LlmAnalyser};
use cache::{ArticleCache, BatchAnalysisCache};
use configuration::{LlmConfig, NewsConfig};
use core_types::{NewsArticle, Signal};
use provider::{HttpNewsProvider, NewsProvider};
use tracing::warn;

pub struct NewsService {
    provider: Option<HttpNewsProvider>,
    analyser: Option<HttpLlmAnalyser>,
    articles: ArticleCache,
    batches: BatchAnalysisCache,
}

impl NewsService {
    pub fn new(news_config: &NewsConfig, llm_config: &LlmConfig) -> Self {
        Self {
            provider: HttpNewsProvider::new(news_config),
            analyser: HttpLlmAnalyser::new(llm_config),
            articles: ArticleCache::new(),
            batches: BatchAnalysisCache::new(),
        }
    }

    /// Returns the cached article list, refreshing it if the TTL has
    /// elapsed. Tolerates provider absence/failure by serving the last
    /// good cache, or an empty list if none exists (never an error).
    pub async fn articles(&self) -> Vec<NewsArticle> {
        let Some(provider) = &self.provider else {
            return Vec::new();
        };

        if let Some(fresh) = self.articles.get_fresh(provider.name()).await {
            return fresh;
        }

        match provider.fetch().await {
            Ok(fetched) => {
                self.articles.replace(provider.name(), fetched.clone()).await;
                fetched
            }
            Err(e) => {
                warn!(error = %e, "news provider fetch failed, falling back to stale cache");
                self.articles.get_stale(provider.name()).await.unwrap_or_default()
            }
        }
    }

    /// Filters the cached article set to headlines mentioning `symbol`
    /// (case-insensitive substring match against the base asset).
    pub fn filter_for_symbol<'a>(articles: &'a [NewsArticle], symbol: &str) -> Vec<&'a NewsArticle> {
        let needle = symbol.to_uppercase();
        articles
            .iter()
            .filter(|a| a.headline.to_uppercase().contains(&needle))
            .collect()
    }

    /// Runs (or serves from cache) a batch analysis over `articles` for
    /// the given `symbol_hint`. On analyser failure or missing
    /// configuration, returns a degraded HOLD/0 signal without caching
    /// it, so the next cycle retries.
    pub async fn analyse_batch(&self, articles: &[NewsArticle], symbol_hint: Option<&str>) -> Signal {
        if articles.is_empty() {
            return degraded_signal(symbol_hint);
        }

        let key = BatchAnalysisCache::key_for(articles, symbol_hint);
        if let Some(cached) = self.batches.get(&key).await {
            return cached;
        }

        let Some(analyser) = &self.analyser else {
            return degraded_signal(symbol_hint);
        };

        match analyser.analyse(articles, symbol_hint).await {
            Ok(signal) => {
                self.batches.insert(key, signal.clone()).await;
                signal
            }
            Err(e) => {
                warn!(error = %e, "news analyser failed, returning degraded signal");
                degraded_signal(symbol_hint)
            }
        }
    }
}
