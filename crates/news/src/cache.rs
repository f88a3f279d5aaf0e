use chrono::{DateTime, Utc};
use core_types::{NewsArticle, Signal};
use std::collections::HashMap;
use tokio::sync::Mutex;

const ARTICLE_CACHE_TTL_SECS: i64 = 3600;
const BATCH_CACHE_TTL_SECS: i64 = 3600;
const FINGERPRINT_HEADLINE_COUNT: usize = 5;
const FINGERPRINT_HEADLINE_TRUNCATE: usize = 30;

struct ArticleCacheEntry {
    articles: Vec<NewsArticle>,
    fetched_at: DateTime<Utc>,
}

/// Article cache keyed by provider name. TTL 3600s (spec §4.3): a read
/// within TTL returns the cached list verbatim; a stale or failed fetch
/// serves the last good cache rather than erroring, so a flaky provider
/// never stalls a trading cycle.
pub struct ArticleCache {
    entries: Mutex<HashMap<String, ArticleCacheEntry>>,
}

impl ArticleCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_fresh(&self, provider: &str) -> Option<Vec<NewsArticle>> {
        let entries = self.entries.lock().await;
        entries.get(provider).and_then(|entry| {
            let age = Utc::now().signed_duration_since(entry.fetched_at);
            if age.num_seconds() < ARTICLE_CACHE_TTL_SECS {
                Some(entry.articles.clone())
            } else {
                None
            }
        })
    }

    pub async fn get_stale(&self, provider: &str) -> Option<Vec<NewsArticle>> {
        let entries = self.entries.lock().await;
        entries.get(provider).map(|entry| entry.articles.clone())
    }

    pub async fn replace(&self, provider: &str, articles: Vec<NewsArticle>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            provider.to_string(),
            ArticleCacheEntry {
                articles,
                fetched_at: Utc::now(),
            },
        );
    }
}

impl Default for ArticleCache {
    fn default() -> Self {
        Self::new()
    }
}

struct BatchCacheEntry {
    signal: Signal,
    analysed_at: DateTime<Utc>,
}

/// Batch-analysis cache. Key = symbol hint plus a deterministic fingerprint
/// of the first `N <= 5` article headlines (truncated to 30 chars each,
/// joined). An identical batch for the same symbol hint must not
/// re-invoke the LLM within TTL.
pub struct BatchAnalysisCache {
    entries: Mutex<HashMap<String, BatchCacheEntry>>,
}

impl BatchAnalysisCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the cache key from the batch headlines and the symbol hint
    /// this analysis run was scoped to (or "any" for autonomous scans).
    pub fn key_for(articles: &[NewsArticle], symbol_hint: Option<&str>) -> String {
        let fingerprint = articles
            .iter()
            .take(FINGERPRINT_HEADLINE_COUNT)
            .map(|a| {
                let headline = &a.headline;
                let cut = headline
                    .char_indices()
                    .nth(FINGERPRINT_HEADLINE_TRUNCATE)
                    .map(|(i, _)| i)
                    .unwrap_or(headline.len());
                &headline[..cut]
            })
            .collect::<Vec<_>>()
            .join("|");
        format!("{}:{}", symbol_hint.unwrap_or("any"), fingerprint)
    }

    pub async fn get(&self, key: &str) -> Option<Signal> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|entry| {
            let age = Utc::now().signed_duration_since(entry.analysed_at);
            if age.num_seconds() < BATCH_CACHE_TTL_SECS {
                Some(entry.signal.clone())
            } else {
                None
            }
        })
    }

    pub async fn insert(&self, key: String, signal: Signal) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key,
            BatchCacheEntry {
                signal,
                analysed_at: Utc::now(),
            },
        );
    }
}

impl Default for BatchAnalysisCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ArticleSentiment;

    fn article(headline: &str) -> NewsArticle {
        NewsArticle {
            id: headline.to_string(),
            headline: headline.to_string(),
            body: String::new(),
            source: "test".to_string(),
            published_at: Utc::now(),
            url: String::new(),
            sentiment: ArticleSentiment::Neutral,
            tickers: Vec::new(),
            impact: None,
            urgency: None,
            risk_level: None,
        }
    }

    fn signal(hint: Option<&str>) -> Signal {
        Signal {
            signal_id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            action: core_types::SignalAction::Buy,
            confidence: rust_decimal_macros::dec!(0.8),
            sentiment: core_types::Sentiment::Bullish,
            urgency: core_types::Urgency::Moderate,
            risk_level: core_types::RiskLevel::Medium,
            reasoning: "test".to_string(),
            symbol_hint: hint.map(str::to_string),
            source_article_ids: Vec::new(),
        }
    }

    #[test]
    fn key_includes_symbol_hint_so_different_symbols_never_collide() {
        let articles = vec![article("Exchange lists new pair")];
        let btc_key = BatchAnalysisCache::key_for(&articles, Some("BTCUSDT"));
        let eth_key = BatchAnalysisCache::key_for(&articles, Some("ETHUSDT"));
        let any_key = BatchAnalysisCache::key_for(&articles, None);
        assert_ne!(btc_key, eth_key);
        assert_ne!(btc_key, any_key);
        assert!(any_key.starts_with("any:"));
    }

    #[test]
    fn key_truncates_headlines_to_thirty_chars_and_caps_at_five() {
        let long_headline = "x".repeat(60);
        let articles: Vec<NewsArticle> = (0..8).map(|i| article(&format!("{long_headline}{i}"))).collect();
        let key = BatchAnalysisCache::key_for(&articles, Some("BTCUSDT"));
        let fingerprint = key.strip_prefix("BTCUSDT:").unwrap();
        assert_eq!(fingerprint.split('|').count(), 5);
        for part in fingerprint.split('|') {
            assert_eq!(part.chars().count(), 30);
        }
    }

    #[test]
    fn identical_batches_for_same_symbol_produce_identical_keys() {
        let articles = vec![article("Headline A"), article("Headline B")];
        let k1 = BatchAnalysisCache::key_for(&articles, Some("BTCUSDT"));
        let k2 = BatchAnalysisCache::key_for(&articles, Some("BTCUSDT"));
        assert_eq!(k1, k2);
    }

    #[tokio::test]
    async fn cache_hit_returns_prior_signal_verbatim() {
        let cache = BatchAnalysisCache::new();
        let articles = vec![article("Big rally incoming")];
        let key = BatchAnalysisCache::key_for(&articles, Some("BTCUSDT"));
        assert!(cache.get(&key).await.is_none());

        let original = signal(Some("BTCUSDT"));
        cache.insert(key.clone(), original.clone()).await;

        let cached = cache.get(&key).await.unwrap();
        assert_eq!(cached.signal_id, original.signal_id);
        assert_eq!(cached.action, original.action);
    }

    #[tokio::test]
    async fn article_cache_serves_stale_when_provider_fails() {
        let cache = ArticleCache::new();
        assert!(cache.get_stale("newsapi").await.is_none());
        cache.replace("newsapi", vec![article("Old news")]).await;
        assert!(cache.get_fresh("newsapi").await.is_some());
        let stale = cache.get_stale("newsapi").await.unwrap();
        assert_eq!(stale.len(), 1);
    }
}
