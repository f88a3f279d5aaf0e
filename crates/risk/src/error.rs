use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("the provided entry price ({0}) is zero or negative")]
    InvalidEntryPrice(Decimal),
}
