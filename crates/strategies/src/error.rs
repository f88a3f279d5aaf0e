use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("not enough kline history to evaluate: {0}")]
    InsufficientData(String),
}
