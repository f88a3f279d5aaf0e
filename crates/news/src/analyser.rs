use crate::error::NewsError;
use async_trait::async_trait;
use chrono::Utc;
use configuration::LlmConfig;
use core_types::{NewsArticle, RiskLevel, Sentiment, Signal, SignalAction, Urgency};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Produces a trading `Signal` from a batch of news articles plus a
/// symbol hint ("any" for an autonomous, unscoped scan).
#[async_trait]
pub trait LlmAnalyser: Send + Sync {
    async fn analyse(
        &self,
        articles: &[NewsArticle],
        symbol_hint: Option<&str>,
    ) -> Result<Signal, NewsError>;
}

/// The neutral result returned when the analyser fails to parse or the
/// upstream call errors (spec §4.3) — never cached, so the next cycle
/// retries rather than being stuck on a bad verdict.
pub fn degraded_signal(symbol_hint: Option<&str>) -> Signal {
    Signal {
        signal_id: Uuid::new_v4(),
        timestamp: Utc::now(),
        action: SignalAction::Hold,
        confidence: Decimal::ZERO,
        sentiment: Sentiment::Neutral,
        urgency: Urgency::Moderate,
        risk_level: RiskLevel::Medium,
        reasoning: "analyser degraded: no verdict available this cycle".to_string(),
        symbol_hint: symbol_hint.map(str::to_string),
        source_article_ids: Vec::new(),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// The JSON shape the LLM is asked to return inside `message.content`.
#[derive(Deserialize)]
struct AnalyserVerdict {
    action: SignalAction,
    confidence: Decimal,
    sentiment: Sentiment,
    urgency: Urgency,
    risk_level: RiskLevel,
    reasoning: String,
    #[serde(default)]
    recommended_symbol: Option<String>,
}

/// An HTTP client for a chat-completions-shaped LLM endpoint.
pub struct HttpLlmAnalyser {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl HttpLlmAnalyser {
    pub fn new(config: &LlmConfig) -> Option<Self> {
        if config.api_key.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string()),
        })
    }

    fn build_prompt(articles: &[NewsArticle], symbol_hint: Option<&str>) -> String {
        let headlines = articles
            .iter()
            .map(|a| format!("- [{}] {}", a.source, a.headline))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "You are a crypto market sentiment analyst. Symbol hint: {}.\n\
             Given these recent headlines:\n{}\n\n\
             Return strict JSON with fields: action (buy|sell|hold), confidence (0-1), \
             sentiment (very_bearish|bearish|neutral|bullish|very_bullish), \
             urgency (moderate|high|immediate), risk_level (low|medium|high), \
             reasoning (string), and recommended_symbol (string or null, only if \
             symbol hint is \"any\").",
            symbol_hint.unwrap_or("any"),
            headlines
        )
    }
}

#[async_trait]
impl LlmAnalyser for HttpLlmAnalyser {
    async fn analyse(
        &self,
        articles: &[NewsArticle],
        symbol_hint: Option<&str>,
    ) -> Result<Signal, NewsError> {
        let prompt = Self::build_prompt(articles, symbol_hint);
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NewsError::Deserialization(format!(
                "LLM endpoint returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| NewsError::Deserialization(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NewsError::AnalyserParse("empty choices array".to_string()))?
            .message
            .content;

        let verdict: AnalyserVerdict =
            serde_json::from_str(&content).map_err(|e| NewsError::AnalyserParse(e.to_string()))?;

        let resolved_hint = verdict.recommended_symbol.or_else(|| symbol_hint.map(str::to_string));

        Ok(Signal {
            signal_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: verdict.action,
            confidence: verdict.confidence.clamp(dec!(0), dec!(1)),
            sentiment: verdict.sentiment,
            urgency: verdict.urgency,
            risk_level: verdict.risk_level,
            reasoning: verdict.reasoning,
            symbol_hint: resolved_hint,
            source_article_ids: articles.iter().map(|a| a.id.clone()).collect(),
        })
    }
}
