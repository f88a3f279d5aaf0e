pub mod enums;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{
    ArticleSentiment, BotRunState, BotState, ExitReason, OrderSide, OrderType, RiskLevel,
    Sentiment, SignalAction, StrategyKind, Urgency,
};
pub use structs::{
    AccountSnapshot, BotConfig, CapitalAddition, Execution, Kline, NewsArticle, OrderRequest,
    PositionSnapshot, Signal, TradeLogEntry,
};