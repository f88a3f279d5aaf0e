use thiserror::Error;
use uuid::Uuid;

/// The supervisor's own error kinds (spec C7). Lower-level errors from
/// the registry backend, the allocation accountant, the exchange, and
/// the trading loop are all folded in here, since the dashboard only
/// needs one error surface to translate into an HTTP response.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("bot {0} not found in registry")]
    NotFound(Uuid),

    #[error("bot {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("bot {0} is not running")]
    NotRunning(Uuid),

    #[error("cannot edit `{field}` on bot {bot_id} while it is running; stop it first")]
    EditWhileRunning { bot_id: Uuid, field: &'static str },

    #[error("cannot delete bot {0}: must be stopped and flat first")]
    NotStoppedAndFlat(Uuid),

    #[error(transparent)]
    OverAllocation(#[from] accounting::AccountingError),

    #[error("registry error: {0}")]
    Registry(String),

    #[error(transparent)]
    PositionStore(#[from] position_store::PositionStoreError),

    #[error(transparent)]
    Exchange(#[from] exchange_client::error::ExchangeError),

    #[error("failed to build trading loop for bot {bot_id}: {source}")]
    TradingLoop { bot_id: Uuid, source: String },

    #[error("invalid risk parameters: {0}")]
    InvalidRiskParams(String),

    #[error(transparent)]
    Risk(#[from] risk::RiskError),
}

impl From<database::DbError> for SupervisorError {
    fn from(e: database::DbError) -> Self {
        match e {
            database::DbError::NotFound => {
                // The caller supplies the bot_id context; this conversion
                // only fires from registry calls that already know it,
                // so a generic message with no id is acceptable here —
                // call sites surface `SupervisorError::NotFound` directly
                // instead of relying on this arm wherever the id is known.
                SupervisorError::Registry("not found".to_string())
            }
            other => SupervisorError::Registry(other.to_string()),
        }
    }
}
