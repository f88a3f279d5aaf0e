use thiserror::Error;

/// Categorised exchange errors (spec §7) — callers dispatch on kind,
/// not on HTTP status code.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("transient exchange error: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unknown or delisted symbol: {0}")]
    BadSymbol(String),

    #[error("order rejected by local symbol filters: {0}")]
    FilterReject(String),

    #[error("insufficient balance for order: {0}")]
    InsufficientBalance(String),

    #[error("request build or transport error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to deserialize exchange response: {0}")]
    Deserialization(String),
}

impl ExchangeError {
    /// Only `Transient` reads are retried with backoff (spec §4.1).
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}
