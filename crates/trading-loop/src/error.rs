use exchange_client::error::ExchangeError;
use executor::ExecutorError;
use position_store::PositionStoreError;
use risk::RiskError;
use strategies::StrategyError;
use thiserror::Error;

/// Errors a bot's cycle can raise. `is_halting` decides whether the
/// loop enters `HALTED` (spec §7: auth failure, delisted symbol,
/// corrupt snapshot are unrecoverable) or simply logs and continues
/// to the next cycle.
#[derive(Error, Debug)]
pub enum TradingLoopError {
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] PositionStoreError),

    #[error("position snapshot for this bot is corrupt and has been quarantined: {0}")]
    CorruptSnapshot(String),

    #[error("operator requested halt: {0}")]
    OperatorHalt(String),
}

impl TradingLoopError {
    /// Spec §7: `Auth` and `BadSymbol` halt the bot; `Corrupt` halts
    /// after quarantining the snapshot. Everything else (transient
    /// network blips, filter rejects, insufficient balance, strategy
    /// data shortfalls) is recovered from locally.
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            TradingLoopError::Exchange(ExchangeError::Auth(_))
                | TradingLoopError::Exchange(ExchangeError::BadSymbol(_))
                | TradingLoopError::CorruptSnapshot(_)
                | TradingLoopError::OperatorHalt(_)
        )
    }
}
