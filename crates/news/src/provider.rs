use crate::error::NewsError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::NewsConfig;
use core_types::NewsArticle;
use serde::Deserialize;

/// A source of news articles. Implementations must normalise
/// `published_at` to UTC on ingest (spec §4.3).
#[async_trait]
pub trait NewsProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<Vec<NewsArticle>, NewsError>;
}

/// An HTTP client for a NewsAPI-shaped `/v2/everything` endpoint.
pub struct HttpNewsProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpNewsProvider {
    pub fn new(config: &NewsConfig) -> Option<Self> {
        if config.api_key.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            endpoint: "https://newsapi.org/v2/everything".to_string(),
        })
    }
}

#[derive(Deserialize)]
struct NewsApiResponse {
    articles: Vec<NewsApiArticle>,
}

#[derive(Deserialize)]
struct NewsApiArticle {
    title: String,
    #[serde(default)]
    description: Option<String>,
    source: NewsApiSource,
    #[serde(rename = "publishedAt")]
    published_at: DateTime<Utc>,
    url: String,
}

#[derive(Deserialize)]
struct NewsApiSource {
    name: String,
}

/// Crude ticker extraction: scans the headline for known crypto base
/// assets. The provider itself never returns structured tickers, so the
/// rest of the pipeline (symbol filtering, autonomous scanning) needs
/// something to match against.
const KNOWN_TICKERS: &[&str] = &[
    "BTC", "ETH", "SOL", "BNB", "XRP", "ADA", "DOGE", "AVAX", "DOT", "LINK", "MATIC", "LTC",
];

fn extract_tickers(headline: &str) -> Vec<String> {
    let upper = headline.to_uppercase();
    KNOWN_TICKERS
        .iter()
        .filter(|t| upper.contains(*t))
        .map(|t| t.to_string())
        .collect()
}

#[async_trait]
impl NewsProvider for HttpNewsProvider {
    fn name(&self) -> &str {
        "newsapi"
    }

    async fn fetch(&self) -> Result<Vec<NewsArticle>, NewsError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", "crypto OR cryptocurrency"), ("language", "en"), ("sortBy", "publishedAt")])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NewsError::Deserialization(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: NewsApiResponse = response
            .json()
            .await
            .map_err(|e| NewsError::Deserialization(e.to_string()))?;

        Ok(parsed
            .articles
            .into_iter()
            .map(|a| {
                let tickers = extract_tickers(&a.title);
                NewsArticle {
                    id: a.url.clone(),
                    headline: a.title,
                    body: a.description.unwrap_or_default(),
                    source: a.source.name,
                    // Normalised to UTC on ingest (spec §4.3); NewsAPI already
                    // returns RFC3339 timestamps, `with_timezone` is the
                    // canonicalization step regardless of the source offset.
                    published_at: a.published_at.with_timezone(&Utc),
                    url: a.url,
                    sentiment: core_types::ArticleSentiment::Neutral,
                    tickers,
                    impact: None,
                    urgency: None,
                    risk_level: None,
                }
            })
            .collect())
    }
}
