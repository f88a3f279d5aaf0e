use serde::{Deserialize, Serialize};

/// Which signal source a bot is configured to use (spec C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Technical,
    TickerNews,
    Autonomous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl serde::Serialize for OrderSide {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            OrderSide::Buy => serializer.serialize_str("BUY"),
            OrderSide::Sell => serializer.serialize_str("SELL"),
        }
    }
}

impl<'de> serde::Deserialize<'de> for OrderSide {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            _ => Err(serde::de::Error::custom(format!(
                "unknown variant `{}`, expected `Buy` or `Sell`",
                s
            ))),
        }
    }
}

impl OrderSide {
    /// Returns the opposite side of the order.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// The action a strategy wants taken this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// The article-level sentiment classification cached from a news provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleSentiment {
    Positive,
    Negative,
    Neutral,
}

/// The signal-level sentiment scale. Carries intensity (`Very*`) because
/// the dynamic risk adjustment table (spec §4.4) gates on "very bullish"
/// and "very bearish" specifically, not merely directional sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    VeryBearish,
    Bearish,
    Neutral,
    Bullish,
    VeryBullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Moderate,
    High,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// The position state machine's states (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    Flat,
    Long,
    Cooldown,
    Halted,
}

/// The supervisor-level lifecycle of a bot's registry entry (spec §3),
/// distinct from `BotState`: a bot can be `Stopped` while flat or while
/// holding a position recorded in its last snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotRunState {
    Stopped,
    Starting,
    Running,
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxHoldExpired,
    StrategySell,
    ManualStop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_side_serializes_as_uppercase_strings() {
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&OrderSide::Sell).unwrap(), "\"SELL\"");
    }

    #[test]
    fn order_side_deserializes_case_insensitively() {
        assert_eq!(serde_json::from_str::<OrderSide>("\"buy\"").unwrap(), OrderSide::Buy);
        assert_eq!(serde_json::from_str::<OrderSide>("\"SELL\"").unwrap(), OrderSide::Sell);
        assert!(serde_json::from_str::<OrderSide>("\"hold\"").is_err());
    }

    #[test]
    fn order_side_opposite_is_involutive() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite().opposite(), OrderSide::Sell);
    }

    #[test]
    fn sentiment_and_urgency_order_from_weakest_to_strongest() {
        assert!(Sentiment::VeryBearish < Sentiment::Bearish);
        assert!(Sentiment::Bullish < Sentiment::VeryBullish);
        assert!(Urgency::Moderate < Urgency::High);
        assert!(Urgency::High < Urgency::Immediate);
        assert!(RiskLevel::Low < RiskLevel::High);
    }
}
